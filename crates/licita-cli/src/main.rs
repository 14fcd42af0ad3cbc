mod config;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use licita_classify::{TextClassifier, normalize};
use licita_core::{CheckpointStore, Credentials, FileCheckpointStore, RunLog};
use licita_harvest::{HarvestConfig, HarvestService};
use licita_portal::{ApiFetcher, CalendarDiscovery, HttpSessionProvider, PageEnricher, PortalConfig};
use licita_store::{CsvSink, DuckSink, RecordSink};

use crate::config::{Command, Config, DEFAULT_CREDENTIALS, HarvestArgs, SinkKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("licita v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::parse();
    match config.command {
        Command::Harvest(args) => harvest(args).await,
        Command::Classify { text } => {
            classify(&text);
            Ok(())
        }
        Command::Checkpoint { path } => checkpoint(&path),
    }
}

async fn harvest(args: HarvestArgs) -> anyhow::Result<()> {
    let mut log = RunLog::to_file(&args.log);
    let (credentials, mut service) = match prepare(&args) {
        Ok(ready) => ready,
        Err(e) => {
            log.critical(format!("run failed: {e:#}"));
            if let Err(write) = log.flush() {
                tracing::error!(error = %write, "failed to write run log");
            }
            return Err(e);
        }
    };

    let report = service.run(&credentials, &mut log).await;
    println!("{report}");

    if report.is_failed() {
        anyhow::bail!("harvest failed, see {}", args.log.display());
    }
    Ok(())
}

/// Resolve credentials and wire the service. Fails before any portal traffic.
fn prepare(args: &HarvestArgs) -> anyhow::Result<(Credentials, HarvestService)> {
    let default_file = Path::new(DEFAULT_CREDENTIALS);
    let file = args
        .credentials
        .as_deref()
        .or_else(|| default_file.exists().then_some(default_file));
    let credentials = Credentials::resolve(args.email.clone(), args.password.clone(), file)
        .context("no portal credentials")?;

    let mut portal = PortalConfig::default();
    if let Some(base) = &args.base_url {
        portal = portal.with_base_url(base);
    }
    if let Some(login) = &args.login_url {
        portal.login_url = login.clone();
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.sink.default_output());
    let sink: Box<dyn RecordSink> = match args.sink {
        SinkKind::Csv => Box::new(CsvSink::new(&output)),
        SinkKind::Duckdb => Box::new(
            DuckSink::open_persistent(&output)
                .with_context(|| format!("opening {}", output.display()))?,
        ),
    };

    let harvest_config = HarvestConfig {
        enrich: !args.no_enrich,
        advance_past_failed_fetches: !args.stop_at_failed_fetch,
        ..HarvestConfig::default()
    };

    let service = HarvestService::new(
        Box::new(HttpSessionProvider::new(portal.clone())),
        Box::new(CalendarDiscovery::new(
            portal.calendar_url.clone(),
            portal.navigation_timeout,
        )),
        Box::new(ApiFetcher::new(
            portal.biddings_api.clone(),
            portal.page_size,
            portal.api_timeout,
        )),
        sink,
        Box::new(FileCheckpointStore::new(&args.checkpoint)),
    )
    .with_enricher(Box::new(PageEnricher::new(
        portal.bulletin_detail.clone(),
        portal.record_detail.clone(),
        portal.navigation_timeout,
        portal.click_timeout,
    )))
    .with_config(harvest_config);

    Ok((credentials, service))
}

fn classify(text: &str) {
    let classifier = TextClassifier::default();
    let normalized = normalize(text);
    println!("normalized: {normalized}");
    match classifier.matching_pattern(&normalized) {
        Some(pattern) => println!("match:      yes ({pattern})"),
        None => println!("match:      no"),
    }
}

fn checkpoint(path: &Path) -> anyhow::Result<()> {
    let store = FileCheckpointStore::new(path);
    match store
        .read()
        .with_context(|| format!("reading {}", path.display()))?
    {
        Some(cp) => println!("last bulletin: {} (processed {})", cp.last_id, cp.processed_at),
        None => println!("no checkpoint at {}", path.display()),
    }
    Ok(())
}
