//! Storage layer: idempotent sinks for enriched biddings.
//!
//! Both sinks key rows on (bulletin id, record id) and apply every write as
//! one unit: a failed batch leaves previously committed rows untouched.

mod csv;
mod error;
mod format;

pub use csv::{CSV_HEADER, CsvSink};
pub use error::StoreError;
pub use format::{format_brl, format_collected_at, parse_opening_date};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckSink;

use licita_core::EnrichedRecord;

/// Counts for one batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub received: usize,
    pub inserted: usize,
    /// Rows already stored, or repeated within the batch.
    pub skipped_duplicates: usize,
}

/// Durable, insert-if-absent storage for one run's batch.
pub trait RecordSink: Send {
    fn write(&mut self, batch: &[EnrichedRecord]) -> Result<WriteSummary, StoreError>;

    /// Where the rows end up, for the run log.
    fn describe(&self) -> String;
}
