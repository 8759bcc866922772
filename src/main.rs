//! idle-logoutd - Systemd user daemon that warns on inactivity and forces logout.

use anyhow::{Context, Result};
use clap::Parser;
use idle_logoutd::activity::{ActivitySource, HyprlandSource, LineSource, supervise};
use idle_logoutd::channel::EventChannel;
use idle_logoutd::config::{ActivitySourceKind, Config};
use idle_logoutd::logout;
use idle_logoutd::monitor::InactivityMonitor;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Inactivity monitor with forced logout.
///
/// Warns before logging out an idle session and logs it out when the grace
/// period runs out.
#[derive(Parser, Debug)]
#[command(name = "idle-logoutd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log the logout instead of performing it).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print inactivity events to stdout as JSON lines.
    #[arg(long)]
    print_events: bool,

    /// Activity source, overriding the config file.
    #[arg(long, value_enum)]
    source: Option<ActivitySourceKind>,

    /// Seconds without activity before the warning, overriding the config file.
    #[arg(long)]
    idle_threshold: Option<u64>,

    /// Seconds between the warning and forced logout, overriding the config file.
    #[arg(long)]
    grace_period: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("idle-logoutd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(source) = args.source {
        config.activity_source = source;
    }
    if let Some(secs) = args.idle_threshold {
        config.idle_threshold_seconds = secs;
    }
    if let Some(secs) = args.grace_period {
        config.grace_period_seconds = secs;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Configuration loaded (source={:?}, logout={:?}, dry_run={})",
        config.activity_source, config.logout.method, config.dry_run
    );

    run_daemon(config, args.print_events).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("idle_logoutd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Open the configured activity source.
async fn open_source(kind: ActivitySourceKind) -> Result<Box<dyn ActivitySource>> {
    match kind {
        ActivitySourceKind::Stdin => Ok(Box::new(LineSource::stdin())),
        ActivitySourceKind::Hyprland => {
            for diag in HyprlandSource::get_diagnostics() {
                debug!("{}", diag);
            }
            let source = HyprlandSource::connect()
                .await
                .context("Hyprland environment not available")?;
            Ok(Box::new(source))
        }
    }
}

/// Run the monitor until a shutdown signal arrives.
async fn run_daemon(config: Config, print_events: bool) -> Result<()> {
    let channel = EventChannel::new();

    if print_events {
        channel
            .subscribe(|event| {
                println!("{}", serde_json::to_string(event)?);
                Ok(())
            })
            .detach();
    }

    let (monitor, handle) =
        InactivityMonitor::new(config.timeouts(), channel, logout::from_config(&config));

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

    let mut source = open_source(config.activity_source).await?;

    info!("Daemon started, waiting for activity...");

    let forwarded = supervise(&mut *source, &handle, &cancel).await;

    monitor_task.await.context("Monitor task failed")?;
    info!("idle-logoutd stopped");
    forwarded.context("Activity source failed")
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });

    Ok(())
}
