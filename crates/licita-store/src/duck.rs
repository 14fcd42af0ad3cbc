//! DuckDB sink for enriched biddings.

use std::path::Path;

use duckdb::{Connection, params};
use licita_core::EnrichedRecord;
use tracing::{debug, info};

use crate::format::parse_opening_date;
use crate::{RecordSink, StoreError, WriteSummary};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS biddings (
    boletim_id     BIGINT NOT NULL,
    bidding_id     BIGINT NOT NULL,
    edital         VARCHAR,
    data_abertura  DATE,
    valor_estimado DOUBLE,
    cidade         VARCHAR,
    estado         VARCHAR,
    descricao      VARCHAR,
    situacao       VARCHAR NOT NULL,
    prazo          VARCHAR,
    data_coleta    TIMESTAMP NOT NULL,
    PRIMARY KEY (boletim_id, bidding_id)
)";

/// DuckDB store holding one `biddings` table keyed on (boletim_id, bidding_id).
///
/// Use [`open`](Self::open) for an ephemeral in-memory table and
/// [`open_persistent`](Self::open_persistent) for a file that survives across
/// runs. Values are stored raw (numeric estimate, typed dates); currency text
/// is a presentation concern of the CSV sink.
pub struct DuckSink {
    conn: Connection,
    label: String,
}

impl DuckSink {
    /// Open an in-memory database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:".into())
    }

    /// Open or create a database file at `path`.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Self::init(Connection::open(path)?, path.display().to_string())
    }

    fn init(conn: Connection, label: String) -> Result<Self, StoreError> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self { conn, label })
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*)::BIGINT FROM biddings", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Access the underlying connection for ad-hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordSink for DuckSink {
    fn write(&mut self, batch: &[EnrichedRecord]) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary {
            received: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        let tx = self.conn.transaction()?;
        {
            let mut exists = tx.prepare(
                "SELECT count(*)::BIGINT FROM biddings WHERE boletim_id = ? AND bidding_id = ?",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO biddings VALUES
                 (?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            )?;

            for record in batch {
                let raw = record.raw();
                let bulletin = to_i64(raw.bulletin_id.get())?;
                let record_id = to_i64(raw.record_id)?;

                let found: i64 = exists.query_row(params![bulletin, record_id], |row| row.get(0))?;
                if found > 0 {
                    debug!(bulletin, record_id, "row already stored");
                    summary.skipped_duplicates += 1;
                    continue;
                }

                let opening = parse_opening_date(&raw.opening_date)
                    .map(|d| d.format("%Y-%m-%d").to_string());
                let collected = record
                    .collected_at
                    .naive_utc()
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string();

                insert.execute(params![
                    bulletin,
                    record_id,
                    raw.edital,
                    opening,
                    raw.estimated_value,
                    raw.city,
                    raw.state,
                    record.record.text,
                    record.situation.label(),
                    record.deadline,
                    collected,
                ])?;
                summary.inserted += 1;
            }
        }
        tx.commit()?;

        info!(
            db = %self.label,
            inserted = summary.inserted,
            skipped = summary.skipped_duplicates,
            "wrote DuckDB rows"
        );
        Ok(summary)
    }

    fn describe(&self) -> String {
        format!("{} (biddings)", self.label)
    }
}

fn to_i64(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Other(format!("id {id} exceeds BIGINT range")))
}
