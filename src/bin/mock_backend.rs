//! Mock station backend
//!
//! Serves an in-memory `SimBackend` over the HTTP command boundary so a
//! station (or the TUI) can run end to end without the real services.
//!
//! Demo tickets: 1001 (3 garments), 1002 (1), 1003 (2), 1004 (4). Garment
//! codes are `<ticket>-<n>`, e.g. `1003-1`.
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 7070 --slots 20

use clap::Parser;
use conveyor_station::io::command_server::start_command_server;
use conveyor_station::io::SimBackend;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock-backend")]
#[command(about = "Simulated ticket, slot and conveyor backend for local testing")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "7070")]
    port: u16,

    /// Number of conveyor slots
    #[arg(short, long, default_value = "20")]
    slots: u32,

    /// Start with the conveyor link reported as down
    #[arg(long)]
    link_down: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let sim = Arc::new(SimBackend::with_demo_data(args.slots));
    if args.link_down {
        sim.set_link_up(false);
    }
    info!(port = %args.port, slots = %args.slots, link_up = %!args.link_down, "mock_backend_starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl_c_listener_failed");
            return;
        }
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    start_command_server(args.port, sim, shutdown_rx).await?;

    info!("mock_backend stopped");
    Ok(())
}
