//! hostwatchd — the hostwatch daemon.
//!
//! Single binary that assembles:
//! - Host store + durable event log (redb)
//! - Reconciler loop
//! - Workload discovery (optional)
//! - On-demand query API
//!
//! # Usage
//!
//! ```text
//! hostwatchd run --port 8080 --data-dir /var/lib/hostwatch \
//!     --workload-events /run/hostwatch/workloads.jsonl
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hostwatch_monitor::{
    DEFAULT_LABEL_SELECTOR, DiscoveryConfig, DiscoverySource, JsonLinesWatcher, LabelSelector,
    QueryService, Reconciler, RetryPolicy,
};
use hostwatch_probe::{DEFAULT_CERT_DIR, HttpStage, ProbeConfig, Prober};
use hostwatch_state::{ChannelSink, EventLog, HostStore};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "hostwatchd", about = "Hostwatch daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the query API and run the monitoring loops.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Data directory for the event log.
    #[arg(long, default_value = "/var/lib/hostwatch")]
    data_dir: PathBuf,

    /// Directory of extra CA certificates (PEM).
    #[arg(long, default_value = DEFAULT_CERT_DIR)]
    cert_dir: PathBuf,

    /// DNS and TCP connect timeout in milliseconds.
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// TLS handshake and HTTP request timeout in milliseconds.
    #[arg(long, default_value = "5000")]
    request_timeout_ms: u64,

    /// When probes issue an HTTP request: `always` or `when-path-given`.
    #[arg(long, default_value = "always")]
    http_stage: HttpStage,

    /// Reconciler sweep interval in milliseconds.
    #[arg(long, default_value = "1000")]
    reconcile_interval_ms: u64,

    /// JSON-lines workload event stream. Discovery is off without it.
    #[arg(long)]
    workload_events: Option<PathBuf>,

    /// Namespace to discover workloads in.
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Label selector scoping discovered workloads.
    #[arg(long, default_value = DEFAULT_LABEL_SELECTOR)]
    label_selector: LabelSelector,

    /// Connectivity attempts before a discovered host is recorded down.
    #[arg(long, default_value = "3")]
    discovery_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hostwatchd=debug,hostwatch=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    info!("hostwatch daemon starting");

    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.data_dir.join("events.redb");

    // ── State ──────────────────────────────────────────────────

    let events = EventLog::open(&db_path)?;
    info!(path = ?db_path, "event log opened");

    let (sink, event_rx) = ChannelSink::new();
    let store = HostStore::new(Arc::new(sink));

    let prober = Prober::new(ProbeConfig {
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        http_stage: args.http_stage,
        cert_dir: args.cert_dir,
    })?;
    info!(http_stage = ?args.http_stage, "prober initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let writer_handle = {
        let events = events.clone();
        tokio::spawn(async move { events.drain(event_rx).await })
    };

    let reconciler = Reconciler::with_interval(
        store.clone(),
        Duration::from_millis(args.reconcile_interval_ms),
    );
    let reconciler_shutdown = shutdown_rx.clone();
    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(reconciler_shutdown).await;
    });

    let discovery_handle = args.workload_events.map(|path| {
        let config = DiscoveryConfig {
            namespace: args.namespace,
            label_selector: args.label_selector,
            retry: RetryPolicy {
                max_attempts: args.discovery_attempts,
                ..RetryPolicy::default()
            },
            ..DiscoveryConfig::default()
        };
        info!(path = ?path, namespace = %config.namespace, "workload discovery enabled");
        let source = DiscoverySource::new(
            JsonLinesWatcher::new(path),
            prober.clone(),
            store.clone(),
            config,
        );
        let discovery_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = source.run(discovery_shutdown).await {
                error!(error = %e, "workload discovery stopped");
            }
        })
    });

    // ── API server ─────────────────────────────────────────────

    let router = hostwatchd::build_router(QueryService::new(prober, store), events);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = reconciler_handle.await;
    if let Some(handle) = discovery_handle {
        let _ = handle.await;
    }
    // Every store handle is gone now, so the writer drains and exits.
    let _ = writer_handle.await;

    info!("hostwatch daemon stopped");
    Ok(())
}
