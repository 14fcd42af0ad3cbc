use licita_portal::AuthError;
use licita_store::StoreError;
use thiserror::Error;

/// Errors that end a run in the FAILED state.
///
/// Per-bulletin fetch errors and per-record enrichment errors never surface
/// here; they are logged and degraded inside the run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("could not establish portal session: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to persist batch: {0}")]
    Persistence(#[from] StoreError),
}
