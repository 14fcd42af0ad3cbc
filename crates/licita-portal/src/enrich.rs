//! Detail-page enrichment of matched records.
//!
//! Only records the classifier marked relevant reach this stage, since detail
//! pages are the most expensive requests of a run. For each record:
//!
//! 1. Load the bulletin detail page.
//! 2. Look for a link to the record (never an attachment link).
//! 3. If a link exists, click it under the click timeout.
//! 4. With no link, or when the click times out, load the record's canonical
//!    detail URL instead. This fallback is the only retry.
//! 5. Read the urgency marker and the `Prazo:` deadline from the result.
//!
//! Every step runs under a deadline. Any failure degrades the record to
//! [`Situation::QueryError`] with no deadline; enrichment never fails a run.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use licita_core::{BulletinId, ClassifiedRecord, Enrichment, Markup, Situation};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::PageError;
use crate::session::{PortalSession, bounded};

static URGENCY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*urgente[^"']*["'][^>]*>(.*?)</span>"#)
        .expect("valid urgency regex")
});

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>").expect("valid script regex")
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:div|p|br|li|ul|ol|tr|td|th|table|tbody|thead|section|article|header|footer|h[1-6])\b[^>]*>")
        .expect("valid block tag regex")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

const DEADLINE_LABEL: &str = "Prazo:";
const ATTACHMENT_MARKER: &str = "arquivos";
const URGENT_TOKEN: &str = "URGENTE";
const RECORD_ROUTES: [&str; 2] = ["biddings", "licitacoes"];

/// How the detail page was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRoute {
    /// Enrichment disabled.
    NotAttempted,
    /// Failed before a detail page was reached.
    Unreached,
    /// Clicked the record link on the bulletin page.
    Link,
    /// No record link on the bulletin page; loaded the canonical URL.
    DirectNoLink,
    /// Link click timed out; loaded the canonical URL.
    DirectAfterClickTimeout,
}

#[derive(Debug)]
pub struct EnrichOutcome {
    pub enrichment: Enrichment,
    pub route: DetailRoute,
    /// Cause of a [`Situation::QueryError`], for the run log.
    pub failure: Option<PageError>,
}

#[async_trait]
pub trait DetailEnricher: Send + Sync {
    /// Never fails: problems are folded into the outcome.
    async fn enrich(&self, session: &dyn PortalSession, record: &ClassifiedRecord)
    -> EnrichOutcome;
}

/// Enricher used when detail lookups are switched off.
pub struct SkipEnrichment;

#[async_trait]
impl DetailEnricher for SkipEnrichment {
    async fn enrich(
        &self,
        _session: &dyn PortalSession,
        _record: &ClassifiedRecord,
    ) -> EnrichOutcome {
        EnrichOutcome {
            enrichment: Enrichment::not_enriched(),
            route: DetailRoute::NotAttempted,
            failure: None,
        }
    }
}

/// Enricher that navigates the portal's detail pages.
pub struct PageEnricher {
    bulletin_detail: String,
    record_detail: String,
    navigation_timeout: Duration,
    click_timeout: Duration,
}

impl PageEnricher {
    /// Templates contain `{id}`: the bulletin id for `bulletin_detail`, the
    /// record id for `record_detail`.
    pub fn new(
        bulletin_detail: impl Into<String>,
        record_detail: impl Into<String>,
        navigation_timeout: Duration,
        click_timeout: Duration,
    ) -> Self {
        Self {
            bulletin_detail: bulletin_detail.into(),
            record_detail: record_detail.into(),
            navigation_timeout,
            click_timeout,
        }
    }

    fn bulletin_url(&self, bulletin: BulletinId) -> String {
        self.bulletin_detail.replace("{id}", &bulletin.to_string())
    }

    fn record_url(&self, record_id: u64) -> String {
        self.record_detail.replace("{id}", &record_id.to_string())
    }

    async fn direct(&self, session: &dyn PortalSession, record_id: u64) -> Result<Markup, PageError> {
        bounded(self.navigation_timeout, session.render(&self.record_url(record_id))).await
    }

    async fn detail_page(
        &self,
        session: &dyn PortalSession,
        record: &ClassifiedRecord,
    ) -> Result<(Markup, DetailRoute), PageError> {
        let bulletin = record.raw.bulletin_id;
        let record_id = record.raw.record_id;

        let listing = bounded(self.navigation_timeout, session.render(&self.bulletin_url(bulletin))).await?;

        let Some(href) = find_record_link(&listing, record_id) else {
            debug!(%bulletin, record_id, "no record link, loading detail URL");
            let page = self.direct(session, record_id).await?;
            return Ok((page, DetailRoute::DirectNoLink));
        };

        match bounded(self.click_timeout, session.click(&listing, href)).await {
            Ok(page) => Ok((page, DetailRoute::Link)),
            Err(PageError::Timeout(limit)) => {
                warn!(%bulletin, record_id, ?limit, "click timed out, loading detail URL");
                let page = self.direct(session, record_id).await?;
                Ok((page, DetailRoute::DirectAfterClickTimeout))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DetailEnricher for PageEnricher {
    async fn enrich(
        &self,
        session: &dyn PortalSession,
        record: &ClassifiedRecord,
    ) -> EnrichOutcome {
        match self.detail_page(session, record).await {
            Ok((page, route)) => EnrichOutcome {
                enrichment: parse_detail(&page),
                route,
                failure: None,
            },
            Err(e) => {
                warn!(
                    bulletin = %record.raw.bulletin_id,
                    record_id = record.raw.record_id,
                    error = %e,
                    "detail lookup failed"
                );
                EnrichOutcome {
                    enrichment: Enrichment::query_error(),
                    route: DetailRoute::Unreached,
                    failure: Some(e),
                }
            }
        }
    }
}

/// First link on `page` pointing at `record_id`, skipping attachment links.
///
/// Only record routes count: the path must hold `/biddings/{id}` or
/// `/licitacoes/{id}` with the id as the whole segment after the route.
pub fn find_record_link(page: &Markup, record_id: u64) -> Option<&str> {
    let id = record_id.to_string();
    page.hrefs()
        .find(|href| !href.contains(ATTACHMENT_MARKER) && is_record_route(href, &id))
}

fn is_record_route(href: &str, id: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .windows(2)
        .any(|w| RECORD_ROUTES.contains(&w[0]) && w[1] == id)
}

/// Read situation and deadline from a detail page.
///
/// An urgency tag, when present, decides by its own text; otherwise the
/// literal token anywhere in the page marks the record urgent.
pub fn parse_detail(page: &Markup) -> Enrichment {
    let body = page.body();

    let urgent = match URGENCY_TAG.captures(body) {
        Some(tag) => tag[1].to_uppercase().contains(URGENT_TOKEN),
        None => body.to_uppercase().contains(URGENT_TOKEN),
    };
    let situation = if urgent {
        Situation::Urgent
    } else {
        Situation::Normal
    };

    Enrichment {
        situation,
        deadline: deadline(body),
    }
}

/// Text following the last `Prazo:` label, on the same line, or on the next
/// non-empty line when the label stands alone.
fn deadline(body: &str) -> Option<String> {
    let text = visible_text(body);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let idx = lines.iter().rposition(|l| l.contains(DEADLINE_LABEL))?;
    let (_, after) = lines[idx].rsplit_once(DEADLINE_LABEL)?;
    let value = match collapse_ws(after) {
        v if !v.is_empty() => v,
        _ => lines[idx + 1..]
            .iter()
            .map(|l| collapse_ws(l))
            .find(|l| !l.is_empty())?,
    };
    Some(value)
}

fn visible_text(body: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(body, " ");
    let with_breaks = BLOCK_TAG.replace_all(&without_code, "\n");
    ANY_TAG
        .replace_all(&with_breaks, "")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
