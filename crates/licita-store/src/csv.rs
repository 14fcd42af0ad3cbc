//! Append-only CSV sink.
//!
//! The file is rewritten through a temporary sibling and an atomic rename, so
//! a crash mid-write leaves the previous file intact. Existing keys are read
//! back before each write to keep inserts idempotent across runs.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::mem::take;
use std::path::{Path, PathBuf};

use chrono::Local;
use licita_core::EnrichedRecord;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::format::{format_brl, format_collected_at, parse_opening_date};
use crate::{RecordSink, StoreError, WriteSummary};

pub const CSV_HEADER: [&str; 11] = [
    "boletim_id",
    "bidding_id",
    "edital",
    "data_abertura",
    "valor_estimado",
    "cidade",
    "estado",
    "descricao",
    "situacao",
    "prazo",
    "data_coleta",
];

const SEP: char = ',';

pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file content and the keys it already holds.
    fn existing(&self) -> Result<(String, HashSet<(u64, u64)>), StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((String::new(), HashSet::new())),
            Err(e) => return Err(e.into()),
        };

        let mut keys = HashSet::new();
        for (n, row) in parse_rows(&text, SEP).into_iter().enumerate() {
            if n == 0 && row.first().is_some_and(|c| c == CSV_HEADER[0]) {
                continue;
            }
            let key = match (row.first(), row.get(1)) {
                (Some(b), Some(r)) => b.trim().parse::<u64>().ok().zip(r.trim().parse::<u64>().ok()),
                _ => None,
            };
            match key {
                Some(key) => {
                    keys.insert(key);
                }
                None => {
                    return Err(StoreError::Malformed {
                        path: self.path.clone(),
                        reason: format!("row {} has no numeric key", n + 1),
                    });
                }
            }
        }
        Ok((text, keys))
    }
}

impl RecordSink for CsvSink {
    fn write(&mut self, batch: &[EnrichedRecord]) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary {
            received: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        let (existing, mut keys) = self.existing()?;

        let mut fresh = Vec::new();
        for record in batch {
            let (bulletin, record_id) = record.key();
            if keys.insert((bulletin.get(), record_id)) {
                write_row(&mut fresh, &to_row(record), SEP)?;
                summary.inserted += 1;
            } else {
                debug!(%bulletin, record_id, "row already stored");
                summary.skipped_duplicates += 1;
            }
        }
        if summary.inserted == 0 {
            return Ok(summary);
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        if existing.is_empty() {
            let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
            write_row(&mut tmp, &header, SEP)?;
        } else {
            tmp.write_all(existing.as_bytes())?;
            if !existing.ends_with('\n') {
                writeln!(tmp)?;
            }
        }
        tmp.write_all(&fresh)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            path = %self.path.display(),
            inserted = summary.inserted,
            skipped = summary.skipped_duplicates,
            "wrote CSV rows"
        );
        Ok(summary)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn to_row(record: &EnrichedRecord) -> Vec<String> {
    let raw = record.raw();
    let opening = match parse_opening_date(&raw.opening_date) {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => raw.opening_date.clone(),
    };
    vec![
        raw.bulletin_id.to_string(),
        raw.record_id.to_string(),
        raw.edital.clone(),
        opening,
        raw.estimated_value.map(format_brl).unwrap_or_default(),
        raw.city.clone(),
        raw.state.clone(),
        record.record.text.clone(),
        record.situation.label().to_string(),
        record.deadline.clone().unwrap_or_default(),
        format_collected_at(&record.collected_at.with_timezone(&Local)),
    ]
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[String], sep: char) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{sep}")?;
        }
        first = false;
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// Quote-aware row parser (doubled quotes, CRLF).
fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
