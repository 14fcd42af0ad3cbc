//! Biddings API client: one authenticated JSON request per bulletin.

use std::time::Duration;

use async_trait::async_trait;
use licita_core::{BulletinId, RawRecord};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::session::{PortalSession, bounded};

/// Records of one bulletin, plus how many items had to be dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedBulletin {
    pub records: Vec<RawRecord>,
    /// Items without a usable record id (no natural key, cannot be stored).
    pub dropped: usize,
}

#[async_trait]
pub trait BiddingFetcher: Send + Sync {
    async fn fetch(
        &self,
        session: &dyn PortalSession,
        bulletin: BulletinId,
    ) -> Result<FetchedBulletin, FetchError>;
}

/// Fetches `GET {biddings_api}?page=1&per_page={page_size}`.
pub struct ApiFetcher {
    url_template: String,
    page_size: u32,
    timeout: Duration,
}

impl ApiFetcher {
    /// `url_template` contains `{id}` where the bulletin id goes.
    pub fn new(url_template: impl Into<String>, page_size: u32, timeout: Duration) -> Self {
        Self {
            url_template: url_template.into(),
            page_size,
            timeout,
        }
    }

    fn url(&self, bulletin: BulletinId) -> String {
        self.url_template.replace("{id}", &bulletin.to_string())
    }
}

#[async_trait]
impl BiddingFetcher for ApiFetcher {
    async fn fetch(
        &self,
        session: &dyn PortalSession,
        bulletin: BulletinId,
    ) -> Result<FetchedBulletin, FetchError> {
        let url = self.url(bulletin);
        let query = [("page", "1".to_string()), ("per_page", self.page_size.to_string())];
        let reply = bounded(self.timeout, session.get(&url, &query))
            .await
            .map_err(|source| FetchError::Page { bulletin, source })?;

        if !reply.is_success() {
            return Err(FetchError::Status {
                bulletin,
                status: reply.status,
            });
        }

        let fetched = parse_biddings(bulletin, &reply.body)?;
        info!(%bulletin, records = fetched.records.len(), dropped = fetched.dropped, "fetched biddings");
        Ok(fetched)
    }
}

#[derive(Deserialize)]
struct BiddingsResponse {
    #[serde(default)]
    biddings: Vec<ApiBidding>,
}

/// Wire shape of one bidding. Fields are loosely typed on the portal side
/// (ids and amounts arrive as numbers or strings), so they are taken as raw
/// JSON values and coerced below.
#[derive(Deserialize)]
struct ApiBidding {
    #[serde(default)]
    bidding_id: Value,
    #[serde(default)]
    objeto: Value,
    #[serde(default)]
    itens: Value,
    #[serde(default)]
    data_abertura: Value,
    #[serde(default)]
    valor_estimado: Value,
    #[serde(default)]
    valor: Value,
    #[serde(default)]
    orgao_cidade: Value,
    #[serde(default)]
    orgao_estado: Value,
    #[serde(default)]
    edital: Value,
}

/// Parse a biddings API body into raw records for `bulletin`.
pub fn parse_biddings(bulletin: BulletinId, body: &str) -> Result<FetchedBulletin, FetchError> {
    let response: BiddingsResponse =
        serde_json::from_str(body).map_err(|source| FetchError::Parse { bulletin, source })?;

    let mut fetched = FetchedBulletin::default();
    for item in response.biddings {
        let Some(record_id) = record_id(&item.bidding_id) else {
            warn!(%bulletin, "bidding without id dropped");
            fetched.dropped += 1;
            continue;
        };
        fetched.records.push(RawRecord {
            bulletin_id: bulletin,
            record_id,
            object: text(&item.objeto),
            items: text(&item.itens),
            opening_date: text(&item.data_abertura),
            estimated_value: estimated_value(bulletin, record_id, &item),
            city: text(&item.orgao_cidade),
            state: text(&item.orgao_estado),
            edital: text(&item.edital),
        });
    }
    Ok(fetched)
}

fn record_id(v: &Value) -> Option<u64> {
    let id = match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.filter(|id| *id != 0)
}

/// `valor_estimado`, falling back to `valor`. Text that is not a number in
/// either plain or pt-BR notation is logged, never silently emptied.
fn estimated_value(bulletin: BulletinId, record_id: u64, item: &ApiBidding) -> Option<f64> {
    let mut unparsed = Vec::new();
    for (field, v) in [("valor_estimado", &item.valor_estimado), ("valor", &item.valor)] {
        match amount(v) {
            Ok(Some(n)) => return Some(n),
            Ok(None) => {}
            Err(raw) => unparsed.push((field, raw)),
        }
    }
    for (field, raw) in unparsed {
        warn!(%bulletin, record_id, field, value = %raw, "unparseable amount");
    }
    None
}

/// Nonzero amount from a number or numeric text. `Err` carries text that
/// could not be read as an amount.
fn amount(v: &Value) -> Result<Option<f64>, String> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(parse_amount(s).ok_or_else(|| s.clone())?),
        _ => None,
    };
    Ok(n.filter(|n| n.is_finite() && *n != 0.0))
}

/// Plain (`980.5`) or pt-BR (`R$ 1.234.567,89`, `1.234.567`) amount text.
/// A leading `R$` always means pt-BR notation.
fn parse_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let currency = trimmed.starts_with("R$");
    let cleaned: String = trimmed
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if currency || cleaned.contains(',') {
        return cleaned.replace('.', "").replace(',', ".").parse().ok();
    }
    if let Ok(n) = cleaned.parse() {
        return Some(n);
    }
    let grouped = cleaned
        .trim_start_matches('-')
        .split('.')
        .enumerate()
        .all(|(i, g)| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()) && (i == 0 || g.len() == 3));
    if grouped {
        cleaned.replace('.', "").parse().ok()
    } else {
        None
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
