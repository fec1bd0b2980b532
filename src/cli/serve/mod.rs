//! Serve command - runs the engine with background maintenance

use tokio::signal;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::infrastructure::observability::init_metrics;
use crate::RagEngine;

/// Run the engine until Ctrl+C or SIGTERM
pub async fn run(config: &AppConfig, engine: RagEngine) -> anyhow::Result<()> {
    init_metrics(&config.metrics)?;

    engine.start_maintenance().await;
    info!(
        cleanup_interval_secs = config.cache.cleanup_interval_secs,
        "RAG engine running"
    );

    shutdown_signal().await;

    engine.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
