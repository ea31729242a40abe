//! radio-alarm - Main entry point
//!
//! Wires the config store, player controller, alarm scheduler and HTTP API
//! together and tears them down in order on Ctrl+C / SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_alarm::config::{Overrides, ServiceConfig};
use radio_alarm::scheduler::AlarmScheduler;
use radio_alarm::{build_router, AppState, ConfigStore, PlayerController};

/// Command-line arguments for radio-alarm
#[derive(Parser, Debug)]
#[command(name = "radio-alarm")]
#[command(about = "Internet radio and wake alarm control service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RADIO_ALARM_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RADIO_ALARM_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(long, env = "RADIO_ALARM_BIND")]
    bind: Option<String>,

    /// Persisted alarm/radio state file
    #[arg(short, long, env = "RADIO_ALARM_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "RADIO_ALARM_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is read before tracing is up so the log level applies;
    // errors here are reported by anyhow on exit.
    let config_source = ServiceConfig::source(args.config.as_deref());
    let config = ServiceConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(Overrides {
            port: args.port,
            bind_addr: args.bind,
            state_file: args.state_file,
            log_level: args.log_level,
        });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting radio-alarm v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }

    let store = Arc::new(
        ConfigStore::load(&config.state_file).context("Failed to initialize state file")?,
    );
    info!("State file: {}", store.path().display());

    let player = Arc::new(PlayerController::new(
        config.launcher(),
        config.grace_period(),
    ));
    info!(
        "Player: {} {} (grace period {:?})",
        config.player.program,
        config.player.args.join(" "),
        config.grace_period()
    );

    // Resume playback that was running before the last shutdown
    if store.get_bool("radio/playing")? {
        info!("Radio was playing before restart, resuming");
        player.start().await.context("Failed to resume playback")?;
    }

    let scheduler = AlarmScheduler::new(
        Arc::clone(&store),
        Arc::clone(&player),
        config.scheduler_settings(),
    )
    .spawn();

    let app = build_router(AppState::new(Arc::clone(&store), Arc::clone(&player)));

    let ip: IpAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_addr))?;
    let addr = SocketAddr::new(ip, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("radio-alarm listening on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Tear down even when serving failed
    scheduler.shutdown().await;
    if let Err(e) = player.shutdown().await {
        warn!("Failed to stop player on shutdown: {}", e);
    }

    served.context("Server error")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
