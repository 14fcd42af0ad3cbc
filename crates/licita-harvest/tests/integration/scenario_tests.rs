//! Harvest run scenarios.

use licita_core::{
    BulletinId, CheckpointStore, FileCheckpointStore, LogEntry, LogLevel, RunLog, Situation,
};
use licita_harvest::{HarvestConfig, HarvestError, HarvestService, Outcome, RunState};
use licita_portal::{
    ApiFetcher, BiddingFetcher, CalendarDiscovery, FetchError, FetchedBulletin, PageEnricher,
    PortalSession,
};
use licita_store::CsvSink;

use crate::integration::common::{
    ListedDiscovery, MemoryCheckpoint, MemorySink, MockPortal, Reply, biddings_json,
    credentials, portal_config, service,
};

const NURSING: &str = "Contratação de equipe de enfermagem para UBS";
const OFFICE: &str = "Aquisição de material de escritório";

const DETAIL_PAGE: &str = r#"
    <div class="card">
      <span class="badge bidding-situation-urgente">Urgente</span>
      <div class="col-md-4 d-flex text-secondary"><strong>Prazo:</strong> 20/03/2025 às 09:00</div>
    </div>
"#;

fn bulletin_with_link(record: u64) -> Reply {
    Reply::Body(format!(
        r#"<a href="/boletim_web/public/biddings/{record}/arquivos/edital.pdf">edital</a>
           <a href="/boletim_web/public/biddings/{record}">detalhes</a>"#
    ))
}

fn entries_at(log: &RunLog, level: LogLevel) -> Vec<&LogEntry> {
    log.entries().iter().filter(|e| e.level == level).collect()
}

/// Discovered {100,101,105,110} with checkpoint 101: only 105 and 110 are
/// fetched, in ascending order.
#[tokio::test]
async fn test_filters_bulletins_at_or_below_checkpoint() {
    let portal = MockPortal::new()
        .discovers(&[110, 100, 105, 101])
        .biddings(105, biddings_json(&[(1, OFFICE)]))
        .biddings(110, biddings_json(&[(2, OFFICE)]));
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(101);
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(report.filtered, vec![BulletinId(105), BulletinId(110)]);
    let cfg = portal_config();
    assert_eq!(
        portal.api_calls(),
        vec![
            format!("GET {}", cfg.biddings_url(BulletinId(105))),
            format!("GET {}", cfg.biddings_url(BulletinId(110))),
        ]
    );
    assert_eq!(checkpoint.get(), BulletinId(110));
    assert_eq!(report.state, RunState::Done);
}

/// One matching record whose detail lookup times out is still persisted,
/// as a query error, and the checkpoint advances.
#[tokio::test]
async fn test_end_to_end_with_enrichment_timeout() {
    let portal = MockPortal::new()
        .discovers(&[2001])
        .biddings(2001, biddings_json(&[(77, NURSING)]))
        .bulletin_page(2001, Reply::Hang);
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(0);
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let mut log = RunLog::in_memory();

    let report = svc.run(&credentials(), &mut log).await;

    let rows = sink.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].record.matched);
    assert_eq!(rows[0].situation, Situation::QueryError);
    assert_eq!(rows[0].situation.label(), "Erro na consulta");
    assert_eq!(rows[0].deadline, None);
    assert_eq!(checkpoint.get(), BulletinId(2001));
    assert_eq!(report.query_errors, 1);
    assert_eq!(report.outcome, Outcome::Harvested);
    assert_eq!(portal.closes(), 1, "session released exactly once");

    let warnings = entries_at(&log, LogLevel::Warning);
    assert!(
        warnings
            .iter()
            .any(|e| e.fields.get("record") == Some(&serde_json::json!(77))),
        "degraded record is logged with its id"
    );
}

/// Bulletins with no matching records still count as processed.
#[tokio::test]
async fn test_no_match_still_advances_checkpoint() {
    let portal = MockPortal::new()
        .discovers(&[3001])
        .biddings(3001, biddings_json(&[(1, OFFICE), (2, "Reforma de praça")]));
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(0);
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert!(sink.rows().is_empty());
    assert_eq!(report.records, 2);
    assert_eq!(report.matched, 0);
    assert_eq!(checkpoint.get(), BulletinId(3001));
    assert!(
        !portal.calls().iter().any(|c| c.starts_with("RENDER")),
        "no detail pages for unmatched records"
    );
}

/// A second run over the same portal state finds nothing new and writes
/// nothing.
#[tokio::test]
async fn test_duplicate_run_is_a_no_op() {
    let portal = MockPortal::new()
        .discovers(&[4001])
        .biddings(4001, biddings_json(&[(41, NURSING)]))
        .bulletin_page(4001, bulletin_with_link(41))
        .click("/boletim_web/public/biddings/41", Reply::Body(DETAIL_PAGE.into()));
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(0);

    let mut first = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let report = first.run(&credentials(), &mut RunLog::in_memory()).await;
    assert_eq!(report.persisted.inserted, 1);
    assert_eq!(checkpoint.get(), BulletinId(4001));
    let api_calls = portal.api_calls().len();

    let mut second = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let report = second.run(&credentials(), &mut RunLog::in_memory()).await;

    assert!(report.filtered.is_empty());
    assert_eq!(report.outcome, Outcome::NoWork);
    assert_eq!(report.state, RunState::Done);
    assert_eq!(sink.writes(), 1, "second run performs no write");
    assert_eq!(sink.rows().len(), 1);
    assert_eq!(portal.api_calls().len(), api_calls);
    assert_eq!(checkpoint.get(), BulletinId(4001));
    assert_eq!(portal.closes(), 2);
}

/// The clicked record link reaches the detail page; the attachment link
/// is never followed.
#[tokio::test]
async fn test_enrichment_follows_record_link() {
    let portal = MockPortal::new()
        .discovers(&[4002])
        .biddings(4002, biddings_json(&[(42, NURSING)]))
        .bulletin_page(4002, bulletin_with_link(42))
        .click("/boletim_web/public/biddings/42", Reply::Body(DETAIL_PAGE.into()));
    let sink = MemorySink::default();
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(MemoryCheckpoint::at(0)),
        HarvestConfig::default(),
    );

    svc.run(&credentials(), &mut RunLog::in_memory()).await;

    let rows = sink.rows();
    assert_eq!(rows[0].situation, Situation::Urgent);
    assert_eq!(rows[0].deadline.as_deref(), Some("20/03/2025 às 09:00"));
    assert!(!portal.calls().iter().any(|c| c.contains("arquivos")));
}

/// A click timeout falls back to the canonical detail URL.
#[tokio::test]
async fn test_click_timeout_falls_back_to_detail_url() {
    let portal = MockPortal::new()
        .discovers(&[4003])
        .biddings(4003, biddings_json(&[(43, NURSING)]))
        .bulletin_page(4003, bulletin_with_link(43))
        .click("/boletim_web/public/biddings/43", Reply::Hang)
        .record_page(43, Reply::Body(DETAIL_PAGE.into()));
    let sink = MemorySink::default();
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(MemoryCheckpoint::at(0)),
        HarvestConfig::default(),
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    let rows = sink.rows();
    assert_eq!(rows[0].situation, Situation::Urgent);
    assert_eq!(rows[0].deadline.as_deref(), Some("20/03/2025 às 09:00"));
    assert_eq!(report.query_errors, 0);
    let detail = format!("RENDER {}", portal_config().record_url(43));
    assert!(portal.calls().contains(&detail));
}

/// A failed fetch skips that bulletin; later bulletins are still collected.
#[tokio::test]
async fn test_fetch_failure_skips_bulletin() {
    let portal = MockPortal::new()
        .discovers(&[5001, 5002])
        .biddings(5001, Reply::Status(500))
        .biddings(5002, biddings_json(&[(52, "Serviços médicos de plantão")]))
        .bulletin_page(5002, Reply::Status(503));
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(0);
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let mut log = RunLog::in_memory();

    let report = svc.run(&credentials(), &mut log).await;

    assert_eq!(report.failed_fetches, vec![BulletinId(5001)]);
    assert_eq!(report.fetched, 1);
    assert_eq!(sink.rows().len(), 1);
    assert_eq!(sink.rows()[0].situation, Situation::QueryError);
    assert_eq!(checkpoint.get(), BulletinId(5002));
    assert!(
        entries_at(&log, LogLevel::Warning)
            .iter()
            .any(|e| e.fields.get("bulletin") == Some(&serde_json::json!(5001)))
    );
}

/// An expired session answers every biddings request with the login page:
/// nothing was collected, so the checkpoint must stay where it was.
#[tokio::test]
async fn test_all_fetches_failing_keeps_checkpoint() {
    let login_page = || Reply::Body(r#"<form><input name="password"></form>"#.into());
    let portal = MockPortal::new()
        .discovers(&[100, 101, 102])
        .biddings(100, login_page())
        .biddings(101, Reply::Status(500))
        .biddings(102, login_page());
    let checkpoint = MemoryCheckpoint::at(99);
    let mut svc = service(
        &portal,
        Box::new(MemorySink::default()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let mut log = RunLog::in_memory();

    let report = svc.run(&credentials(), &mut log).await;

    assert_eq!(report.fetched, 0);
    assert_eq!(
        report.failed_fetches,
        vec![BulletinId(100), BulletinId(101), BulletinId(102)]
    );
    assert_eq!(checkpoint.get(), BulletinId(99));
    assert_eq!(report.checkpoint_after, BulletinId(99));
    assert!(
        entries_at(&log, LogLevel::Warning)
            .iter()
            .any(|e| e.message == "checkpoint not advanced")
    );
}

/// With advancing past failures disabled, the checkpoint stops before the
/// first failed bulletin.
#[tokio::test]
async fn test_conservative_checkpoint_stops_before_failure() {
    let portal = MockPortal::new()
        .discovers(&[6001, 6002, 6003])
        .biddings(6001, biddings_json(&[(1, OFFICE)]))
        .biddings(6002, Reply::Hang)
        .biddings(6003, biddings_json(&[(3, OFFICE)]));
    let checkpoint = MemoryCheckpoint::at(6000);
    let config = HarvestConfig {
        advance_past_failed_fetches: false,
        ..HarvestConfig::default()
    };
    let mut svc = service(
        &portal,
        Box::new(MemorySink::default()),
        Box::new(checkpoint.clone()),
        config,
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(report.failed_fetches, vec![BulletinId(6002)]);
    assert_eq!(report.fetched, 2);
    assert_eq!(checkpoint.get(), BulletinId(6001));
    assert_eq!(report.checkpoint_after, BulletinId(6001));
}

/// The checkpoint never decreases, even when the portal lists only older
/// bulletins.
#[tokio::test]
async fn test_checkpoint_is_monotonic() {
    let portal = MockPortal::new().discovers(&[400, 450]);
    let checkpoint = MemoryCheckpoint::at(500);
    let mut svc = service(
        &portal,
        Box::new(MemorySink::default()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert!(report.filtered.is_empty());
    assert!(report.checkpoint_after >= report.checkpoint_before);
    assert_eq!(checkpoint.get(), BulletinId(500));
}

#[tokio::test]
async fn test_empty_discovery_ends_without_work() {
    let portal = MockPortal::new();
    let sink = MemorySink::default();
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(MemoryCheckpoint::at(10)),
        HarvestConfig::default(),
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(report.outcome, Outcome::NoWork);
    assert_eq!(report.state, RunState::Done);
    assert_eq!(sink.writes(), 0);
    assert_eq!(portal.closes(), 1);
}

/// Login failure is fatal: nothing is fetched or written, and a critical
/// entry explains why.
#[tokio::test]
async fn test_auth_failure_fails_run() {
    let portal = MockPortal::new().discovers(&[7001]).reject_login();
    let sink = MemorySink::default();
    let checkpoint = MemoryCheckpoint::at(7000);
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(checkpoint.clone()),
        HarvestConfig::default(),
    );
    let mut log = RunLog::in_memory();

    let report = svc.run(&credentials(), &mut log).await;

    assert!(report.is_failed());
    assert_eq!(report.outcome, Outcome::Failed);
    assert!(matches!(report.error, Some(HarvestError::Auth(_))));
    assert_eq!(sink.writes(), 0);
    assert!(portal.calls().is_empty());
    assert_eq!(checkpoint.get(), BulletinId(7000));
    assert_eq!(entries_at(&log, LogLevel::Critical).len(), 1);
    assert!(
        !log.entries().iter().any(|e| e.message.contains("secret")),
        "password never reaches the log"
    );
}

/// A persistence failure fails the run and leaves the checkpoint alone so
/// the same range is retried.
#[tokio::test]
async fn test_persistence_failure_keeps_checkpoint() {
    let portal = MockPortal::new()
        .discovers(&[8001])
        .biddings(8001, biddings_json(&[(81, NURSING)]));
    let checkpoint = MemoryCheckpoint::at(8000);
    let config = HarvestConfig {
        enrich: false,
        ..HarvestConfig::default()
    };
    let mut svc = service(
        &portal,
        Box::new(MemorySink::failing()),
        Box::new(checkpoint.clone()),
        config,
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(report.error, Some(HarvestError::Persistence(_))));
    assert_eq!(checkpoint.get(), BulletinId(8000));
    assert_eq!(portal.closes(), 1);
}

/// A checkpoint write failure is a warning; persisted rows stay.
#[tokio::test]
async fn test_checkpoint_write_failure_is_reported() {
    let portal = MockPortal::new()
        .discovers(&[9001])
        .biddings(9001, biddings_json(&[(91, NURSING)]));
    let sink = MemorySink::default();
    let config = HarvestConfig {
        enrich: false,
        ..HarvestConfig::default()
    };
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(MemoryCheckpoint::at(9000).failing_writes()),
        config,
    );

    let report = svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(report.state, RunState::Done);
    assert!(!report.is_failed());
    assert!(report.checkpoint_warning.is_some());
    assert_eq!(report.checkpoint_after, BulletinId(9000));
    assert_eq!(sink.rows().len(), 1);
}

/// Without enrichment, matched records are stored as NORMAL and no detail
/// page is requested.
#[tokio::test]
async fn test_enrichment_disabled() {
    let portal = MockPortal::new()
        .discovers(&[9101])
        .biddings(9101, biddings_json(&[(1, NURSING)]))
        .bulletin_page(9101, bulletin_with_link(1));
    let sink = MemorySink::default();
    let config = HarvestConfig {
        enrich: false,
        ..HarvestConfig::default()
    };
    let mut svc = service(
        &portal,
        Box::new(sink.clone()),
        Box::new(MemoryCheckpoint::at(0)),
        config,
    );

    svc.run(&credentials(), &mut RunLog::in_memory()).await;

    assert_eq!(sink.rows()[0].situation, Situation::Normal);
    assert!(!portal.calls().iter().any(|c| c.starts_with("RENDER")));
}

/// Full wiring against the filesystem: calendar scraping, CSV output,
/// checkpoint file and run log file.
#[tokio::test]
async fn test_calendar_run_writes_files() {
    let tmp = tempfile::TempDir::new().unwrap();
    let csv_path = tmp.path().join("licitacoes_filtradas.csv");
    let checkpoint_path = tmp.path().join("ultimo_boletim.json");
    let log_path = tmp.path().join("coleta_log.json");

    let portal = MockPortal::new()
        .calendar(&[20250314001, 20250313001])
        .biddings(20250313001, biddings_json(&[(11, OFFICE)]))
        .biddings(20250314001, biddings_json(&[(12, "Contratação de médicos plantonistas")]))
        .bulletin_page(20250314001, Reply::Body("<p>sem links</p>".into()))
        .record_page(12, Reply::Body("<div>Prazo: 25/03/2025</div>".into()));

    let cfg = portal_config();
    let mut svc = HarvestService::new(
        Box::new(portal.clone()),
        Box::new(CalendarDiscovery::new(cfg.calendar_url.clone(), cfg.navigation_timeout)),
        Box::new(ApiFetcher::new(cfg.biddings_api.clone(), cfg.page_size, cfg.api_timeout)),
        Box::new(CsvSink::new(&csv_path)),
        Box::new(FileCheckpointStore::new(&checkpoint_path)),
    )
    .with_enricher(Box::new(PageEnricher::new(
        cfg.bulletin_detail.clone(),
        cfg.record_detail.clone(),
        cfg.navigation_timeout,
        cfg.click_timeout,
    )));

    let mut log = RunLog::to_file(&log_path);
    let report = svc.run(&credentials(), &mut log).await;

    assert_eq!(report.discovered, 2);
    assert_eq!(report.persisted.inserted, 1);

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("boletim_id,bidding_id,edital"));
    assert!(lines[1].starts_with("20250314001,12,"));
    assert!(lines[1].contains(",NORMAL,25/03/2025,"));

    let stored = FileCheckpointStore::new(&checkpoint_path).load();
    assert_eq!(stored, BulletinId(20250314001));

    let written: Vec<LogEntry> =
        serde_json::from_str(&std::fs::read_to_string(&log_path).unwrap()).unwrap();
    assert_eq!(written.len(), log.entries().len());
}

struct PanickingFetcher;

#[async_trait::async_trait]
impl BiddingFetcher for PanickingFetcher {
    async fn fetch(
        &self,
        _session: &dyn PortalSession,
        bulletin: BulletinId,
    ) -> Result<FetchedBulletin, FetchError> {
        panic!("fetcher bug on bulletin {bulletin}");
    }
}

/// A panic during collection still releases the portal session, and the
/// checkpoint is left untouched.
#[tokio::test]
async fn test_session_closed_when_collection_panics() {
    let portal = MockPortal::new();
    let checkpoint = MemoryCheckpoint::at(10);
    let mut svc = HarvestService::new(
        Box::new(portal.clone()),
        Box::new(ListedDiscovery(vec![11, 12])),
        Box::new(PanickingFetcher),
        Box::new(MemorySink::default()),
        Box::new(checkpoint.clone()),
    );

    let local = tokio::task::LocalSet::new();
    let joined = local
        .run_until(async move {
            tokio::task::spawn_local(async move {
                svc.run(&credentials(), &mut RunLog::in_memory()).await
            })
            .await
        })
        .await;
    assert!(joined.unwrap_err().is_panic());

    for _ in 0..100 {
        if portal.closes() > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    assert_eq!(portal.closes(), 1);
    assert_eq!(checkpoint.get(), BulletinId(10));
}
