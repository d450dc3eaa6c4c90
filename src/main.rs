//! Conveyor station - scan-to-conveyor controller for garment processing
//!
//! Reads scanner input line by line from stdin (HID scanners type the code
//! followed by Enter), drives the scan state machine and logs every state
//! change. Use `station-tui` for the operator display.
//!
//! Module structure:
//! - `domain/` - Codes, tickets, slots and the scan state machine
//! - `io/` - Command boundary client/server, simulator, Prometheus
//! - `services/` - Scan controller, connectivity monitor, input handling
//! - `infra/` - Configuration and metrics

use anyhow::Context;
use clap::Parser;
use conveyor_station::infra::Config;
use conveyor_station::services::{ScanSource, SubmitError};
use conveyor_station::station::{spawn_station, BackendMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Conveyor station - routes scanned garments to conveyor slots
#[derive(Parser, Debug)]
#[command(name = "conveyor-station", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/station.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run against the in-process simulator instead of the remote backend
    #[arg(long)]
    sim: bool,

    /// Slot count for the simulator
    #[arg(long, default_value = "20")]
    sim_slots: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "conveyor-station starting");

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        station_id = %config.station_id(),
        backend_url = %config.backend_url(),
        sim = %args.sim,
        min_code_len = %config.min_code_len(),
        queue_depth = %config.queue_depth(),
        link_poll_ms = %config.link_poll_interval().as_millis(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mode = if args.sim { BackendMode::Sim { slots: args.sim_slots } } else { BackendMode::Remote };
    let station =
        spawn_station(&config, mode, shutdown_rx.clone()).context("Failed to start station")?;

    // Log every published state change
    let mut state_rx = station.handle.subscribe();
    let mut state_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = state_rx.borrow_and_update().clone();
                    info!(
                        state = %session.state().as_str(),
                        title = %session.state().title(),
                        subtitle = %session.state().subtitle(),
                        scans = %session.scan_count(),
                        "station_state"
                    );
                }
                _ = state_shutdown.changed() => break,
            }
        }
    });

    // Scanner input
    let scan_handle = station.handle.clone();
    let mut stdin_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            info!("scanner_input_closed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "scanner_input_error");
                            break;
                        }
                    };
                    let code = line.trim();
                    if code.is_empty() {
                        continue;
                    }
                    match scan_handle.scan(code, ScanSource::Scanner) {
                        Ok(()) => {}
                        Err(SubmitError::Busy) => warn!(code = %code, "scan_dropped_busy"),
                        Err(SubmitError::Closed) => break,
                    }
                }
                _ = stdin_shutdown.changed() => break,
            }
        }
    });

    // Handle shutdown signal
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_listener_failed");
            return;
        }
        info!("shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    station.join().await;

    info!("conveyor-station shutdown complete");
    Ok(())
}
