//! lrvsp-daemon: drain the FilePaths queue into DocObjs/LinkObjs.
//!
//! Each cycle fetches a batch of queued files, extracts a title, metadata
//! and reference links from each one, commits them in one transaction per
//! item, then asks Drupal (via drush) to pick up the new rows.

mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lrvsp_db::PgQueueStore;
use lrvsp_jobs::{
    CommandNotifier, CycleScheduler, DownstreamNotifier, ItemProcessor, NoOpNotifier, QueueStore,
};

use crate::config::DaemonConfig;

const DEFAULT_LOG_FILTER: &str = "lrvsp_daemon=info,lrvsp_jobs=info,lrvsp_db=info,lrvsp_inference=info";

#[derive(Parser, Debug)]
#[command(name = "lrvsp-daemon", version, about = "LRVSP document extraction daemon")]
struct Cli {
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Apply pending schema migrations before starting
    #[arg(long)]
    migrate: bool,

    /// Check the database, extractors and NER backend, then exit
    #[arg(long, conflicts_with = "once")]
    check: bool,

    /// Skip the downstream trigger after each cycle
    #[arg(long)]
    no_notify: bool,
}

/// Set up the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok().filter(|v| !v.is_empty());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = match log_file.as_deref().map(Path::new) {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("lrvsp-daemon.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));

            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(log_ansi.unwrap_or(false));
                registry.with(layer).init();
            }
            Some(guard)
        }
        None => {
            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            } else {
                let mut layer = tracing_subscriber::fmt::layer();
                if let Some(ansi) = log_ansi {
                    layer = layer.with_ansi(ansi);
                }
                registry.with(layer).init();
            }
            None
        }
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// A second Ctrl+C or SIGTERM while draining exits without waiting.
async fn force_exit_on_second_signal() {
    shutdown_signal().await;
    warn!("Second shutdown signal, exiting immediately");
    std::process::exit(130);
}

async fn apply_migrations(config: &DaemonConfig) -> anyhow::Result<()> {
    let mut conn = lrvsp_db::connect(&config.database)
        .await
        .context("Failed to connect for migrations")?;
    lrvsp_db::migrate(&mut conn)
        .await
        .context("Failed to apply migrations")?;
    lrvsp_db::close(conn).await?;
    info!(subsystem = "database", op = "migrate", "Migrations applied");
    Ok(())
}

/// Check every external dependency. Returns false if any check fails.
async fn run_checks(
    config: &DaemonConfig,
    store: &dyn QueueStore,
    processor: &ItemProcessor,
    notifier: &CommandNotifier,
    notify: bool,
) -> bool {
    let mut healthy = true;

    match store.open_session().await {
        Ok(mut session) => {
            let remaining = session.remaining_count(config.scheduler.remaining_scope).await;
            let closed = session.close().await;
            match (remaining, closed) {
                (Ok(remaining), Ok(())) => {
                    info!(component = "check", remaining, "Database reachable")
                }
                (Err(e), _) | (_, Err(e)) => {
                    healthy = false;
                    error!(component = "check", error = %e, "Database query failed");
                }
            }
        }
        Err(e) => {
            healthy = false;
            error!(component = "check", error = %e, "Database unreachable");
        }
    }

    for (file_type, ok) in processor.registry().health_check_all().await {
        if ok {
            info!(component = "check", file_type = %file_type, "Extractor available");
        } else {
            healthy = false;
            error!(component = "check", file_type = %file_type, "Extractor unavailable");
        }
    }

    match processor.ner() {
        Some(ner) => match ner.health_check().await {
            Ok(true) => info!(component = "check", model = ner.model_name(), "NER backend healthy"),
            Ok(false) | Err(_) => {
                healthy = false;
                error!(component = "check", model = ner.model_name(), "NER backend unhealthy");
            }
        },
        None => {
            if let Err(e) = config.validate() {
                healthy = false;
                error!(component = "check", error = %e, "No NER backend for raw-text extractors");
            } else {
                info!(component = "check", "No NER backend needed");
            }
        }
    }

    if notify {
        let program = notifier.program();
        if program.is_absolute() && !program.is_file() {
            healthy = false;
            error!(
                component = "check",
                program = %program.display(),
                "Downstream trigger not found"
            );
        } else {
            info!(component = "check", program = %program.display(), "Downstream trigger configured");
        }
    }

    healthy
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    if !cli.check {
        config.validate().context("Invalid configuration")?;
    }

    if cli.migrate {
        apply_migrations(&config).await?;
    }

    let registry = config.build_registry();
    info!(
        file_types = ?registry.file_types(),
        ner = config.gliner_base_url.as_deref().unwrap_or("(disabled)"),
        "Extractors registered"
    );

    let mut processor = ItemProcessor::new(registry).with_config(config.processor.clone());
    if let Some(ner) = config.ner_backend() {
        processor = processor.with_ner(ner);
    }

    let store: Arc<dyn QueueStore> = Arc::new(PgQueueStore::new(config.database.clone()));
    let notify = !cli.no_notify;

    if cli.check {
        if run_checks(&config, store.as_ref(), &processor, &config.notifier, notify).await {
            info!("All checks passed");
            return Ok(());
        }
        anyhow::bail!("One or more checks failed");
    }

    let notifier: Arc<dyn DownstreamNotifier> = if notify {
        Arc::new(config.notifier.clone())
    } else {
        info!("Downstream trigger disabled");
        Arc::new(NoOpNotifier)
    };

    let scheduler =
        CycleScheduler::new(store, processor, notifier).with_config(config.scheduler.clone());

    if cli.once {
        let shutdown = scheduler.shutdown_token();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Stopping the cycle after the current item");
            shutdown.cancel();
            force_exit_on_second_signal().await;
        });

        let report = scheduler.run_cycle().await.context("Cycle failed")?;
        info!(
            fetched = report.fetched,
            committed = report.committed,
            failed = report.failed,
            interrupted = report.interrupted,
            remaining = report.remaining,
            "Single cycle complete"
        );
        return Ok(());
    }

    let handle = scheduler.start();
    shutdown_signal().await;

    info!("Shutting down after the current item");
    handle.shutdown();
    tokio::spawn(force_exit_on_second_signal());
    handle.join().await?;
    info!("Daemon stopped");
    Ok(())
}
