use std::time::Duration;

/// Run policy.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Look up detail pages for matched records. When off, matched records
    /// are persisted as `NORMAL` with no deadline.
    pub enrich: bool,
    /// Advance the checkpoint to the highest filtered bulletin even when some
    /// fetches failed. When off, the checkpoint stops before the first failed
    /// bulletin so it is retried next run.
    pub advance_past_failed_fetches: bool,
    /// Upper bound on releasing the session at the end of a run.
    pub close_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            advance_past_failed_fetches: true,
            close_timeout: Duration::from_secs(10),
        }
    }
}
