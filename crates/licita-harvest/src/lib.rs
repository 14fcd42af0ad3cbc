//! Harvest orchestrator: one run from checkpoint to checkpoint.
//!
//! [`HarvestService`] composes the portal collaborators, the classifier, a
//! [`RecordSink`](licita_store::RecordSink) and a
//! [`CheckpointStore`](licita_core::CheckpointStore) behind trait objects, so
//! the binary picks implementations from configuration and tests swap in
//! in-memory stubs.

mod config;
mod error;
mod report;
mod service;

pub use config::HarvestConfig;
pub use error::HarvestError;
pub use report::{Outcome, RunReport, RunState};
pub use service::{HarvestService, checkpoint_target};
