// Claude Code WebSocket bridge
//
// Configured through flags or their CLAUDE_BRIDGE_* environment variables;
// logging through RUST_LOG (default: info).

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kodegen_claude_bridge::{SessionRegistry, VERSION, server};
use tokio::net::TcpListener;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = Cli::parse().into_options();
    let addr = options.bind_addr;

    let registry = Arc::new(SessionRegistry::new(options));
    registry.start_idle_sweep();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Claude bridge {VERSION} listening on ws://{addr}/ws");

    server::serve(listener, Arc::clone(&registry), shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Shutting down...");
    registry.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {e}");
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
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
