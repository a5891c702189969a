//! Domain manager.
//!
//! Keeps DNS records, TLS certificates and the HAProxy configuration of a
//! load balancer replica in line with the applications running on the
//! network.
//!
//! # Architecture Overview
//!
//! ```text
//!   origin API ──▶ specs (feed loops, enterprise decryption)
//!                    │ snapshot
//!                    ▼
//!                 sharding ──▶ discovery ──▶ health probes
//!                                                │ healthy IPs
//!                                                ▼
//!                 domains ──▶ dns (records, certificates)
//!                    │
//!                    ▼
//!                 haproxy (synthesize ──▶ validate ──▶ reload)
//!
//!   context: published address, reference height (background refresh)
//!   lifecycle: startup, signals, shutdown
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use domain_manager::config::{load_config, ControlConfig};
use domain_manager::lifecycle::{self, signals, Shutdown};
use domain_manager::observability::{logging, metrics};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "domain-manager", version, about = "DNS, certificate and load balancer control plane")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "domain-manager.toml")]
    config: PathBuf,

    /// Run a single reconciliation cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        ControlConfig::default()
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "domain-manager starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                );
                return Err(e.into());
            }
        }
    }

    let shutdown = Shutdown::new();
    let running = lifecycle::start(&config, &shutdown)?;

    if cli.once {
        let mut events = running.cache.subscribe();
        tokio::select! {
            _ = events.recv() => {}
            _ = tokio::time::sleep(Duration::from_millis(config.feed.request_timeout_ms * 2)) => {
                tracing::warn!("No specification snapshot before deadline");
            }
        }
        let report = running.pipeline.run_cycle().await;
        tracing::info!(id = %report.id, succeeded = report.succeeded(), "Single cycle finished");
    } else {
        signals::wait_for_signal().await;
    }

    tracing::info!(tasks = running.tasks.len(), "Shutting down");
    shutdown.drain(running.tasks, SHUTDOWN_GRACE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
