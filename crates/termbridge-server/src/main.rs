//! termbridge-server: terminal session bridge.
//!
//! Accepts WebSocket connections and pairs each with a shell running under
//! a pseudo-terminal, relaying input/output envelopes for as long as both
//! sides stay alive.

mod config;
mod server;
mod session;
mod shutdown;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::BridgeServer;
use std::path::PathBuf;
use tracing::{error, info};

/// termbridge-server — terminal session bridge
#[derive(Parser, Debug)]
#[command(name = "termbridge-server", version, about = "Terminal session bridge")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Shell executable (defaults to $SHELL, or the platform shell)
    #[arg(long)]
    shell: Option<String>,

    /// Working directory for spawned shells
    #[arg(long)]
    working_dir: Option<String>,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Config file path
    #[arg(long, default_value = "~/.termbridge/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.bind.as_deref(),
        cli.shell.as_deref(),
        cli.working_dir.as_deref(),
        cli.max_sessions,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        shell = %config.shell,
        "starting termbridge-server"
    );

    let server = BridgeServer::new(config);
    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("termbridge-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
