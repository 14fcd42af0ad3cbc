//! Bidding records as they move through a harvest run.
//!
//! A [`RawRecord`] is fetched once and never modified. Classification wraps it
//! in a [`ClassifiedRecord`]; enrichment wraps that in an [`EnrichedRecord`],
//! which is the unit handed to persistence.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a published bulletin.
///
/// Issued monotonically by the portal and never reused, so the natural order
/// of ids is the processing order and the basis of the checkpoint watermark.
/// `BulletinId(0)` means "nothing processed yet".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BulletinId(pub u64);

impl BulletinId {
    /// Watermark value before any successful run.
    pub const NONE: BulletinId = BulletinId(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for BulletinId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for BulletinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One bidding as returned by the portal's data endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub bulletin_id: BulletinId,
    pub record_id: u64,
    /// Object / description text.
    pub object: String,
    /// Free-text item list.
    pub items: String,
    /// Opening date exactly as published (parsed only at the write boundary).
    pub opening_date: String,
    pub estimated_value: Option<f64>,
    pub city: String,
    pub state: String,
    pub edital: String,
}

impl RawRecord {
    /// Natural key used for idempotent persistence.
    pub fn key(&self) -> (BulletinId, u64) {
        (self.bulletin_id, self.record_id)
    }

    /// Object and item list joined into a single line of searchable text.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.object, self.items).replace(['\r', '\n'], " ")
    }
}

/// A raw record together with its classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub raw: RawRecord,
    /// The concatenated text the classifier was run against.
    pub text: String,
    pub matched: bool,
}

/// Detail-page situation of a bidding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Situation {
    Normal,
    Urgent,
    /// The detail page could not be read; the record is kept with partial data.
    QueryError,
}

impl Situation {
    /// Text stored in the output column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Urgent => "URGENTE",
            Self::QueryError => "Erro na consulta",
        }
    }
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of looking up a record's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub situation: Situation,
    pub deadline: Option<String>,
}

impl Enrichment {
    /// Enrichment disabled or not attempted.
    pub fn not_enriched() -> Self {
        Self {
            situation: Situation::Normal,
            deadline: None,
        }
    }

    /// Degraded result after any failure while reading the detail page.
    pub fn query_error() -> Self {
        Self {
            situation: Situation::QueryError,
            deadline: None,
        }
    }
}

/// A classified record with detail metadata, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub record: ClassifiedRecord,
    pub situation: Situation,
    pub deadline: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl EnrichedRecord {
    pub fn new(record: ClassifiedRecord, enrichment: Enrichment, collected_at: DateTime<Utc>) -> Self {
        Self {
            record,
            situation: enrichment.situation,
            deadline: enrichment.deadline,
            collected_at,
        }
    }

    pub fn raw(&self) -> &RawRecord {
        &self.record.raw
    }

    pub fn key(&self) -> (BulletinId, u64) {
        self.record.raw.key()
    }
}
