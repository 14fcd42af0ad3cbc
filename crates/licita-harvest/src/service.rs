//! Harvest service: the run state machine.
//!
//! ```text
//! INIT -> DISCOVERED -> FILTERED -> COLLECTING -> PERSISTING -> CHECKPOINTED -> DONE
//!   \__________\___________\____________\_____________\__________> FAILED
//! ```
//!
//! Only two failures end a run early: the session cannot be established, or
//! the batch cannot be persisted. Everything else is logged and degraded.
//! Bulletins are processed in ascending order so a saved checkpoint never
//! skips an earlier, unprocessed bulletin.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use licita_classify::TextClassifier;
use licita_core::{
    BulletinId, CheckpointStore, Credentials, EnrichedRecord, LogLevel, RunLog, Situation,
};
use licita_portal::{
    BiddingFetcher, BulletinDiscovery, DetailEnricher, DetailRoute, PortalSession,
    SessionProvider, SkipEnrichment,
};
use licita_store::RecordSink;
use serde_json::json;
use tracing::warn;

use crate::{HarvestConfig, HarvestError, Outcome, RunReport, RunState};

/// One harvest pipeline, wired from trait objects.
pub struct HarvestService {
    provider: Box<dyn SessionProvider>,
    discovery: Box<dyn BulletinDiscovery>,
    fetcher: Box<dyn BiddingFetcher>,
    classifier: TextClassifier,
    enricher: Box<dyn DetailEnricher>,
    sink: Box<dyn RecordSink>,
    checkpoints: Box<dyn CheckpointStore>,
    config: HarvestConfig,
}

/// Where collection ended for one bulletin.
struct Attempt {
    bulletin: BulletinId,
    fetched: bool,
}

impl HarvestService {
    /// Service with the default taxonomy and no detail enrichment.
    pub fn new(
        provider: Box<dyn SessionProvider>,
        discovery: Box<dyn BulletinDiscovery>,
        fetcher: Box<dyn BiddingFetcher>,
        sink: Box<dyn RecordSink>,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Self {
        Self {
            provider,
            discovery,
            fetcher,
            classifier: TextClassifier::default(),
            enricher: Box::new(SkipEnrichment),
            sink,
            checkpoints,
            config: HarvestConfig::default(),
        }
    }

    pub fn with_enricher(mut self, enricher: Box<dyn DetailEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_classifier(mut self, classifier: TextClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_config(mut self, config: HarvestConfig) -> Self {
        self.config = config;
        self
    }

    /// Run once. The report's state is DONE or FAILED; the log is flushed
    /// before returning.
    pub async fn run(&mut self, credentials: &Credentials, log: &mut RunLog) -> RunReport {
        let report = self.run_inner(credentials, log).await;

        match &report.error {
            Some(e) => log.critical(format!("run failed: {e}")),
            None => log.record(
                LogLevel::Info,
                "run finished",
                [
                    ("records", json!(report.records)),
                    ("matched", json!(report.matched)),
                    ("persisted", json!(report.persisted.inserted)),
                    ("checkpoint", json!(report.checkpoint_after.get())),
                ],
            ),
        }
        if let Err(e) = log.flush() {
            warn!(error = %e, "could not write run log");
        }
        report
    }

    async fn run_inner(&mut self, credentials: &Credentials, log: &mut RunLog) -> RunReport {
        let checkpoint = self.checkpoints.load();
        let mut report = RunReport::new(checkpoint);
        log.record(
            LogLevel::Info,
            "run started",
            [("checkpoint", json!(checkpoint.get()))],
        );

        let session = match self.provider.authenticate(credentials).await {
            Ok(session) => OpenSession::new(session, self.config.close_timeout),
            Err(e) => return report.fail(HarvestError::Auth(e)),
        };
        log.info("portal session established");

        let batch = self.collect(session.get(), &mut report, log).await;
        session.close(log).await;

        let Some((batch, attempts)) = batch else {
            report.enter(RunState::Done);
            return report;
        };

        report.enter(RunState::Persisting);
        match self.sink.write(&batch) {
            Ok(summary) => {
                report.persisted = summary;
                log.record(
                    LogLevel::Info,
                    format!("{} records saved to {}", summary.inserted, self.sink.describe()),
                    [
                        ("received", json!(summary.received)),
                        ("duplicates", json!(summary.skipped_duplicates)),
                    ],
                );
            }
            Err(e) => return report.fail(HarvestError::Persistence(e)),
        }

        self.advance_checkpoint(&attempts, &mut report, log);
        report.outcome = Outcome::Harvested;
        report.enter(RunState::Done);
        report
    }

    /// Discover, filter and collect. `None` when there is nothing to do.
    async fn collect(
        &self,
        session: &dyn PortalSession,
        report: &mut RunReport,
        log: &mut RunLog,
    ) -> Option<(Vec<EnrichedRecord>, Vec<Attempt>)> {
        let available = match self.discovery.list_available(session).await {
            Ok(ids) => ids,
            Err(e) => {
                log.record(
                    LogLevel::Error,
                    "bulletin discovery failed",
                    [("error", json!(e.to_string()))],
                );
                Vec::new()
            }
        };
        report.discovered = available.len();
        report.enter(RunState::Discovered);
        if available.is_empty() {
            log.info("no bulletins available");
            return None;
        }

        report.filtered = filter_new(&available, report.checkpoint_before);
        report.enter(RunState::Filtered);
        if report.filtered.is_empty() {
            log.record(
                LogLevel::Info,
                "no new bulletins",
                [("checkpoint", json!(report.checkpoint_before.get()))],
            );
            return None;
        }
        log.record(
            LogLevel::Info,
            format!("{} new bulletins", report.filtered.len()),
            [("bulletins", json!(report.filtered))],
        );

        report.enter(RunState::Collecting);
        let enricher: &dyn DetailEnricher = if self.config.enrich {
            self.enricher.as_ref()
        } else {
            &SkipEnrichment
        };

        let filtered = report.filtered.clone();
        let total = filtered.len();
        let mut batch = Vec::new();
        let mut attempts = Vec::with_capacity(total);

        for (i, &bulletin) in filtered.iter().enumerate() {
            log.record(
                LogLevel::Info,
                format!("processing bulletin {}/{total}", i + 1),
                [("bulletin", json!(bulletin.get()))],
            );

            let fetched = match self.fetcher.fetch(session, bulletin).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    log.record(
                        LogLevel::Warning,
                        "fetch failed, skipping bulletin",
                        [
                            ("bulletin", json!(bulletin.get())),
                            ("error", json!(e.to_string())),
                        ],
                    );
                    report.failed_fetches.push(bulletin);
                    attempts.push(Attempt {
                        bulletin,
                        fetched: false,
                    });
                    continue;
                }
            };
            report.fetched += 1;
            attempts.push(Attempt {
                bulletin,
                fetched: true,
            });
            if fetched.dropped > 0 {
                log.record(
                    LogLevel::Warning,
                    "records without id dropped",
                    [
                        ("bulletin", json!(bulletin.get())),
                        ("dropped", json!(fetched.dropped)),
                    ],
                );
            }

            let (classified, summary) = self.classifier.classify_batch(fetched.records);
            report.records += summary.total;
            report.matched += summary.matched;
            log.record(
                LogLevel::Info,
                format!("{} records, {} matched", summary.total, summary.matched),
                [("bulletin", json!(bulletin.get()))],
            );

            for record in classified.into_iter().filter(|r| r.matched) {
                let outcome = enricher.enrich(session, &record).await;
                let fields = [
                    ("bulletin", json!(bulletin.get())),
                    ("record", json!(record.raw.record_id)),
                    ("situation", json!(outcome.enrichment.situation.label())),
                ];
                match (&outcome.failure, outcome.route) {
                    (Some(e), _) => log.record(
                        LogLevel::Warning,
                        format!("detail lookup failed: {e}"),
                        fields,
                    ),
                    (None, DetailRoute::NotAttempted) => {}
                    (None, route) => log.record(
                        LogLevel::Info,
                        format!("detail collected ({route:?})"),
                        fields,
                    ),
                }
                if outcome.enrichment.situation == Situation::QueryError {
                    report.query_errors += 1;
                }
                batch.push(EnrichedRecord::new(record, outcome.enrichment, Utc::now()));
            }
        }

        Some((batch, attempts))
    }

    fn advance_checkpoint(&mut self, attempts: &[Attempt], report: &mut RunReport, log: &mut RunLog) {
        let before = report.checkpoint_before;
        let target = checkpoint_target(
            before,
            attempts.iter().map(|a| (a.bulletin, a.fetched)),
            self.config.advance_past_failed_fetches,
        );
        if target == before {
            log.record(
                LogLevel::Warning,
                "checkpoint not advanced",
                [("checkpoint", json!(before.get()))],
            );
            return;
        }

        match self.checkpoints.save(target, Utc::now()) {
            Ok(()) => {
                report.checkpoint_after = target;
                report.enter(RunState::Checkpointed);
                log.record(
                    LogLevel::Info,
                    "checkpoint updated",
                    [("from", json!(before.get())), ("to", json!(target.get()))],
                );
            }
            Err(e) => {
                let warning = format!("checkpoint not saved, watermark may be stale: {e}");
                log.record(
                    LogLevel::Warning,
                    warning.clone(),
                    [("target", json!(target.get()))],
                );
                report.checkpoint_warning = Some(warning);
            }
        }
    }
}

/// The run's portal session. Closed explicitly after collection; a guard
/// dropped while still open (a panic or a cancelled run) hands the close to
/// the runtime instead.
struct OpenSession {
    session: Arc<dyn PortalSession>,
    limit: Duration,
    closed: bool,
}

impl OpenSession {
    fn new(session: Box<dyn PortalSession>, limit: Duration) -> Self {
        Self {
            session: Arc::from(session),
            limit,
            closed: false,
        }
    }

    fn get(&self) -> &dyn PortalSession {
        self.session.as_ref()
    }

    async fn close(mut self, log: &mut RunLog) {
        self.closed = true;
        if tokio::time::timeout(self.limit, self.session.close()).await.is_err() {
            log.record(
                LogLevel::Warning,
                "session close timed out",
                [("timeout_ms", json!(self.limit.as_millis() as u64))],
            );
        }
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let session = Arc::clone(&self.session);
        let limit = self.limit;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("run aborted with the session open, closing it");
                handle.spawn(async move {
                    if tokio::time::timeout(limit, session.close()).await.is_err() {
                        warn!("session close timed out");
                    }
                });
            }
            Err(_) => warn!("no runtime left to close the portal session"),
        }
    }
}

/// Ids strictly greater than the checkpoint, ascending, without repeats.
fn filter_new(available: &[BulletinId], checkpoint: BulletinId) -> Vec<BulletinId> {
    let mut ids: Vec<BulletinId> = available.iter().copied().filter(|id| *id > checkpoint).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// New watermark after attempting `attempts` (ascending `(id, fetched)` pairs).
///
/// With `advance_past_failures` the highest attempted id wins; otherwise the
/// watermark stops at the last id of the leading run of successful fetches.
/// Never moves backwards, and holds when no fetch succeeded at all: a run
/// whose every fetch failed (expired session, portal outage) skips nothing.
pub fn checkpoint_target<I>(current: BulletinId, attempts: I, advance_past_failures: bool) -> BulletinId
where
    I: IntoIterator<Item = (BulletinId, bool)>,
{
    let attempts: Vec<_> = attempts.into_iter().collect();
    if !attempts.iter().any(|&(_, fetched)| fetched) {
        return current;
    }
    let reached = if advance_past_failures {
        attempts.into_iter().map(|(id, _)| id).max()
    } else {
        attempts
            .into_iter()
            .take_while(|&(_, fetched)| fetched)
            .map(|(id, _)| id)
            .last()
    };
    reached.map_or(current, |id| id.max(current))
}
