//! Bulletin discovery from the portal calendar page.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use licita_core::{BulletinId, Markup};
use regex::Regex;
use tracing::info;

use crate::error::PageError;
use crate::session::{PortalSession, bounded};

/// Bulletin ids are runs of at least 8 digits inside link targets.
static BULLETIN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{8,}\b").expect("valid bulletin id regex"));

#[async_trait]
pub trait BulletinDiscovery: Send + Sync {
    /// Distinct bulletin ids currently published, ascending. Empty means no work.
    async fn list_available(
        &self,
        session: &dyn PortalSession,
    ) -> Result<Vec<BulletinId>, PageError>;
}

/// Scrapes the calendar page once. No retries.
pub struct CalendarDiscovery {
    calendar_url: String,
    timeout: Duration,
}

impl CalendarDiscovery {
    pub fn new(calendar_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            calendar_url: calendar_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl BulletinDiscovery for CalendarDiscovery {
    async fn list_available(
        &self,
        session: &dyn PortalSession,
    ) -> Result<Vec<BulletinId>, PageError> {
        let page = bounded(self.timeout, session.render(&self.calendar_url)).await?;
        let ids = parse_bulletin_ids(&page);
        info!(url = %self.calendar_url, count = ids.len(), "discovered bulletins");
        Ok(ids)
    }
}

/// Extract distinct bulletin ids from anchor targets, sorted ascending.
pub fn parse_bulletin_ids(page: &Markup) -> Vec<BulletinId> {
    let ids: BTreeSet<BulletinId> = page
        .hrefs()
        .filter_map(|href| BULLETIN_ID.find(href))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .map(BulletinId)
        .collect();
    ids.into_iter().collect()
}
