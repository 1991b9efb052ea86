//! nextupd - The nextup background service
//!
//! This is the main entry point for the nextupd service.
//! It wires together all the components:
//! - Configuration loading
//! - Timetable cache initialization
//! - Host adapters (Linux)
//! - Scheduler and refresh coordinator
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use nextup_config::load_config_or_default;
use nextup_host_api::AtomicPreferences;
use nextup_host_linux::{FileCredentials, HttpFetcher, NotifySendSink, TokioTimer};
use nextup_ipc::IpcServer;
use nextup_store::{SqliteCache, TimetableCache};
use nextup_util::{database_path, default_config_path, is_mock_time_active, Clock, SystemClock};
use nextupd::{Service, ServiceParts};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// nextupd - Timetable cache and next-event notification service
#[derive(Parser, Debug)]
#[command(name = "nextupd")]
#[command(about = "Timetable cache and next-event notification service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/nextup/config.toml)
    #[arg(short, long, env = "NEXTUP_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set NEXTUP_SOCKET env var)
    #[arg(short, long, env = "NEXTUP_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set NEXTUP_DATA_DIR env var)
    #[arg(short, long, env = "NEXTUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

async fn run(args: Args) -> Result<()> {
    let settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        feed_configured = settings.feed.url.is_some(),
        "Configuration loaded"
    );

    let socket_path = args
        .socket
        .unwrap_or_else(|| settings.service.socket_path.clone());
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| settings.service.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = database_path(&data_dir);
    let cache = SqliteCache::open(&db_path)
        .with_context(|| format!("Failed to open timetable cache {:?}", db_path))?;
    if !cache.is_healthy() {
        warn!(db_path = %db_path.display(), "Timetable cache failed its health check");
    }
    info!(db_path = %db_path.display(), "Timetable cache opened");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = HttpFetcher::new(
        settings.feed.url.clone(),
        settings.feed.days_ahead,
        settings.feed.fetch_timeout,
        clock.clone(),
    )
    .context("Failed to build feed client")?;

    if !NotifySendSink::is_available() {
        warn!("notify-send not found, notifications will fail");
    }

    if is_mock_time_active() {
        warn!("NEXTUP_MOCK_TIME is set, the service clock is not the wall clock");
    }

    let preferences = Arc::new(AtomicPreferences::new(
        settings.preferences.show_cancelled,
        settings.preferences.notifications_enabled,
    ));

    let (service, channels) = Service::new(ServiceParts {
        cache: Arc::new(cache),
        fetcher: Arc::new(fetcher),
        credentials: Arc::new(FileCredentials::new(settings.service.credentials_path.clone())),
        sink: Arc::new(NotifySendSink::new()),
        timer: Arc::new(TokioTimer::new()),
        preferences,
        clock,
        scheduler: settings.scheduler,
        fetch_timeout: settings.feed.fetch_timeout,
    });

    let mut ipc = IpcServer::new(&socket_path);
    ipc.start().await.context("Failed to start IPC server")?;
    let ipc = Arc::new(ipc);

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
        }
    };

    service.run(ipc, channels, shutdown).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "nextupd starting");

    run(args).await
}
