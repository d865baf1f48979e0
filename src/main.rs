//! Agora Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! agora
//!
//! # Start with custom config
//! agora --config /path/to/config.toml
//!
//! # Custom port and storage directory
//! agora --http-port 8090 --storage-dir /data/agora
//!
//! # Record scheduled posts without firing them
//! agora --scheduler manual
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use agora::scheduler::{ProfileCreationWorker, PublishWorker};
use agora::services::spawn_logging_listener;
use agora::{Config, Db, HttpServer, ManualScheduler, SchedulerBackend, Services, TaskScheduler, TokioScheduler};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(about = "Social graph backend with scheduled posts")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "AGORA_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "AGORA_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "AGORA_HTTP_PORT")]
    http_port: Option<u16>,

    /// Maximum pooled SQLite connections
    #[arg(long, env = "AGORA_POOL_SIZE")]
    pool_size: Option<u32>,

    /// Minimum seconds between two comments by one author
    #[arg(long, env = "AGORA_COMMENT_INTERVAL")]
    comment_interval: Option<u64>,

    /// Scheduler backend: tokio or manual
    #[arg(long, env = "AGORA_SCHEDULER")]
    scheduler: Option<SchedulerBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("agora=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match args.config {
        Some(ref path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(size) = args.pool_size {
        config.pool_size = size;
    }
    if let Some(secs) = args.comment_interval {
        config.comment_min_interval_secs = secs;
    }
    if let Some(backend) = args.scheduler {
        config.scheduler_backend = backend;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        scheduler = ?config.scheduler_backend,
        "Starting agora"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(Db::open(&config)?);

    // Scheduler backend; the tokio backend hands due tasks to the publish worker
    let (scheduler, due_rx) = match config.scheduler_backend {
        SchedulerBackend::Tokio => {
            let (scheduler, rx) = TokioScheduler::new();
            let scheduler: Arc<dyn TaskScheduler> = Arc::new(scheduler);
            (scheduler, Some(rx))
        }
        SchedulerBackend::Manual => {
            warn!("Manual scheduler selected; scheduled posts will not publish on their own");
            let scheduler: Arc<dyn TaskScheduler> = Arc::new(ManualScheduler::new());
            (scheduler, None)
        }
    };

    let (profile_tx, profile_rx) = tokio::sync::mpsc::unbounded_channel();
    let services = Arc::new(Services::with_profile_queue(db, scheduler, &config, profile_tx));

    let _event_logger = spawn_logging_listener(services.events.clone());
    let _profile_worker =
        ProfileCreationWorker::new(services.profiles.clone(), config.retry_policy()).spawn(profile_rx);
    let _publish_worker = due_rx.map(|rx| PublishWorker::new(services.posts.clone(), config.retry_policy()).spawn(rx));

    // Re-register publish tasks for posts scheduled before the last shutdown
    let posts = services.posts.clone();
    match tokio::task::spawn_blocking(move || posts.recover_schedules()).await? {
        Ok(count) => info!(count, "Recovered scheduled posts"),
        Err(e) => error!(error = %e, "Failed to recover scheduled posts"),
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let http_server = Arc::new(HttpServer::new(services, addr, &config));

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    Ok(())
}
