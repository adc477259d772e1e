//! docflow-worker - document pipeline worker
//!
//! Opens the task database, recovers tasks orphaned by a previous run and
//! dispatches queued tasks until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use docflow_common::config::{default_database_path, LoggingConfig, TomlConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docflow_worker::ai::{AiClientConfig, HttpAiProvider};
use docflow_worker::analyzer::OfflineAnalyzer;
use docflow_worker::db::init_database_pool;
use docflow_worker::handlers::{
    EnrichImageHandler, EnrichTextHandler, ProcessDocumentHandler, TaskRouter,
};
use docflow_worker::metrics::{MetricsSink, TracingMetrics};
use docflow_worker::queue::{Broker, SqliteBroker, TaskClient};
use docflow_worker::store::{AnalysisStore, SqliteAnalysisStore};
use docflow_worker::worker::{Dispatcher, WorkerConfig};

const DEFAULT_FILTER: &str = "docflow_worker=info,docflow_common=info";

/// Command-line arguments for docflow-worker
#[derive(Parser, Debug)]
#[command(name = "docflow-worker")]
#[command(about = "Quality-gated document processing and enrichment worker")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database holding tasks and analyses
    #[arg(short, long, env = "DOCFLOW_DATABASE")]
    database: Option<PathBuf>,

    /// Maximum simultaneous task executions
    #[arg(long, env = "DOCFLOW_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Base URL of the AI enrichment service
    #[arg(long, env = "DOCFLOW_AI_BASE_URL")]
    ai_base_url: Option<String>,

    /// Bearer token for the AI enrichment service
    #[arg(long, env = "DOCFLOW_AI_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting docflow-worker {}", env!("CARGO_PKG_VERSION"));

    // Priority: CLI/env > TOML > default
    let db_path = args
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(default_database_path);

    let mut worker_config = WorkerConfig::from_section(&config.worker);
    if let Some(concurrency) = args.concurrency {
        worker_config.concurrency = concurrency.max(1);
    }

    info!("Database: {}", db_path.display());
    let max_connections = (worker_config.concurrency as u32).saturating_add(2);
    let pool = init_database_pool(&db_path, max_connections)
        .await
        .context("Failed to open database")?;

    let broker: Arc<dyn Broker> = Arc::new(SqliteBroker::new(pool.clone()));
    let store: Arc<dyn AnalysisStore> = Arc::new(SqliteAnalysisStore::new(pool));
    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetrics);

    let recovered = broker
        .recover_orphans()
        .await
        .context("Failed to recover orphaned tasks")?;
    if recovered > 0 {
        info!(recovered, "Returned orphaned tasks to their queues");
    }

    for stats in broker.queue_stats().await.context("Failed to read queue stats")? {
        info!(
            queue = %stats.queue,
            pending = stats.pending,
            retry = stats.retry,
            archived = stats.archived,
            "Queue status"
        );
    }

    let ai = Arc::new(
        HttpAiProvider::new(ai_client_config(&args, &config))
            .context("Failed to build AI provider client")?,
    );

    let router = TaskRouter {
        process_document: ProcessDocumentHandler::new(
            Arc::new(OfflineAnalyzer),
            Arc::clone(&store),
            TaskClient::new(Arc::clone(&broker)),
            Arc::clone(&metrics),
        ),
        enrich_text: EnrichTextHandler::new(Arc::clone(&store), ai, Arc::clone(&metrics)),
        enrich_image: EnrichImageHandler::new(Arc::clone(&store), Arc::clone(&metrics)),
    };

    let dispatcher = Dispatcher::new(broker, router, metrics, worker_config);
    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    dispatcher.run().await.context("Dispatcher error")?;

    info!("Worker shutdown complete");
    Ok(())
}

fn ai_client_config(args: &Args, config: &TomlConfig) -> AiClientConfig {
    let defaults = AiClientConfig::default();
    AiClientConfig {
        base_url: args
            .ai_base_url
            .clone()
            .or_else(|| config.ai.base_url.clone())
            .unwrap_or(defaults.base_url),
        api_key: args.ai_api_key.clone().or_else(|| config.ai.api_key.clone()),
        requests_per_second: config
            .ai
            .requests_per_second
            .unwrap_or(defaults.requests_per_second),
        request_timeout: config
            .ai
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
        connect_timeout: defaults.connect_timeout,
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. A bare level applies to the
/// docflow crates only.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let configured = if logging.level.contains('=') || logging.level.contains(',') {
        logging.level.clone()
    } else {
        format!(
            "docflow_worker={level},docflow_common={level}",
            level = logging.level
        )
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&configured))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
