//! Run states and the end-of-run report.

use std::fmt;

use licita_core::BulletinId;
use licita_store::WriteSummary;

use crate::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Discovered,
    Filtered,
    Collecting,
    Persisting,
    Checkpointed,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Discovered => "DISCOVERED",
            Self::Filtered => "FILTERED",
            Self::Collecting => "COLLECTING",
            Self::Persisting => "PERSISTING",
            Self::Checkpointed => "CHECKPOINTED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing new on the portal; checkpoint untouched.
    NoWork,
    /// At least one new bulletin was attempted and the batch persisted.
    Harvested,
    Failed,
}

#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub outcome: Outcome,
    pub discovered: usize,
    /// New bulletins, ascending.
    pub filtered: Vec<BulletinId>,
    pub fetched: usize,
    pub failed_fetches: Vec<BulletinId>,
    pub records: usize,
    pub matched: usize,
    pub query_errors: usize,
    pub persisted: WriteSummary,
    pub checkpoint_before: BulletinId,
    pub checkpoint_after: BulletinId,
    /// Set when the watermark could not be written; persisted rows stay.
    pub checkpoint_warning: Option<String>,
    pub error: Option<HarvestError>,
}

impl RunReport {
    pub(crate) fn new(checkpoint: BulletinId) -> Self {
        Self {
            state: RunState::Init,
            outcome: Outcome::NoWork,
            discovered: 0,
            filtered: Vec::new(),
            fetched: 0,
            failed_fetches: Vec::new(),
            records: 0,
            matched: 0,
            query_errors: 0,
            persisted: WriteSummary::default(),
            checkpoint_before: checkpoint,
            checkpoint_after: checkpoint,
            checkpoint_warning: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    pub(crate) fn enter(&mut self, state: RunState) {
        tracing::debug!(from = %self.state, to = %state, "run state");
        self.state = state;
    }

    pub(crate) fn fail(mut self, error: HarvestError) -> Self {
        self.enter(RunState::Failed);
        self.outcome = Outcome::Failed;
        self.error = Some(error);
        self
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "state:        {}", self.state)?;
        writeln!(
            f,
            "bulletins:    {} discovered, {} new, {} fetched, {} failed",
            self.discovered,
            self.filtered.len(),
            self.fetched,
            self.failed_fetches.len()
        )?;
        writeln!(
            f,
            "records:      {} seen, {} matched, {} query errors",
            self.records, self.matched, self.query_errors
        )?;
        writeln!(
            f,
            "persisted:    {} inserted, {} duplicates",
            self.persisted.inserted, self.persisted.skipped_duplicates
        )?;
        write!(
            f,
            "checkpoint:   {} -> {}",
            self.checkpoint_before, self.checkpoint_after
        )?;
        if let Some(warning) = &self.checkpoint_warning {
            write!(f, "\nwarning:      {warning}")?;
        }
        if let Some(error) = &self.error {
            write!(f, "\nerror:        {error}")?;
        }
        Ok(())
    }
}
