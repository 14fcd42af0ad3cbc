//! Portal layer: authenticated session contract, bulletin discovery, biddings
//! API fetcher, and detail-page enrichment.

mod config;
mod discovery;
mod enrich;
mod error;
mod fetch;
mod session;

#[cfg(feature = "http")]
pub mod http;

pub use config::PortalConfig;
pub use discovery::{BulletinDiscovery, CalendarDiscovery, parse_bulletin_ids};
pub use enrich::{
    DetailEnricher, DetailRoute, EnrichOutcome, PageEnricher, SkipEnrichment, find_record_link,
    parse_detail,
};
pub use error::{AuthError, FetchError, PageError};
pub use fetch::{ApiFetcher, BiddingFetcher, FetchedBulletin, parse_biddings};
pub use session::{HttpReply, PortalSession, SessionProvider, bounded};

#[cfg(feature = "http")]
pub use http::{HttpSession, HttpSessionProvider};
