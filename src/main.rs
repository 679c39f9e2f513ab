//! hostdir - rendezvous directory for game servers behind dynamic IPs
//!
//! Hosts register under a username; clients list them, check their status and
//! trade an optional password for the address to connect to.

use hostdir_server::{Config, DirectoryService};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if HOSTDIR_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("HOSTDIR_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting hostdir");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Workers: {}", config.pool.workers);
    tracing::info!(
        "  Probe timeouts: refresh={}ms, vetting={}ms, status TTL={}s",
        config.probe.refresh_timeout_ms,
        config.probe.vetting_timeout_ms,
        config.probe.status_ttl_secs
    );
    if config.sweep.enabled {
        tracing::info!(
            "  Sweep: every {}s after {}s",
            config.sweep.interval_secs,
            config.sweep.initial_delay_secs
        );
    } else {
        tracing::info!("  Sweep: disabled");
    }
    if config.metrics.enabled {
        tracing::info!("  Metrics: http://{}/metrics", config.metrics.bind_addr);
    }

    let service = DirectoryService::with_config(config);
    service.start_configured().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping service...");

    service.stop().await?;
    Ok(())
}
