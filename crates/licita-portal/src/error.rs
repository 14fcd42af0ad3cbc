use std::time::Duration;

use licita_core::BulletinId;
use thiserror::Error;

/// Failure to establish an authenticated session. Fatal for a run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login form not available at {url}: {reason}")]
    FormUnavailable { url: String, reason: String },

    #[error("login submit did not complete: {0}")]
    SubmitFailed(String),

    /// Non-2xx answer, or the portal served the login form again.
    #[error("login rejected by portal (HTTP {status})")]
    Rejected { status: u16 },

    #[error("login timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure while loading or navigating a portal page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to fetch one bulletin's biddings. Recoverable: the bulletin is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("biddings API returned HTTP {status} for bulletin {bulletin}")]
    Status { bulletin: BulletinId, status: u16 },

    #[error("biddings response for bulletin {bulletin} is not valid JSON: {source}")]
    Parse {
        bulletin: BulletinId,
        #[source]
        source: serde_json::Error,
    },

    #[error("biddings request for bulletin {bulletin} failed: {source}")]
    Page {
        bulletin: BulletinId,
        #[source]
        source: PageError,
    },
}
