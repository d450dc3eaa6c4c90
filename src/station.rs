//! Station wiring shared by the binaries
//!
//! Builds the backend, then spawns the connectivity monitor, the scan
//! controller, the metrics reporter and (optionally) the Prometheus endpoint.

use crate::infra::{Config, Metrics};
use crate::io::remote::{Backends, LinkProbe};
use crate::io::{RemoteCommandClient, SimBackend};
use crate::services::{ConnectivityMonitor, ScanController, ScanHandle};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Where the station's collaborators live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// `RemoteCommandClient` against `backend.base_url`
    Remote,
    /// In-process `SimBackend` with demo data
    Sim { slots: u32 },
}

pub struct Station {
    pub handle: ScanHandle,
    pub metrics: Arc<Metrics>,
    /// Present in sim mode so callers can flip link/sensor flags
    pub sim: Option<Arc<SimBackend>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Station {
    /// Wait for the controller and monitor to stop
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "station_task_failed");
            }
        }
    }
}

/// Spawn all station tasks; they stop when `shutdown` flips to true
pub fn spawn_station(
    config: &Config,
    mode: BackendMode,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Station> {
    let metrics = Arc::new(Metrics::new());

    let (backends, probe, sim): (Backends, Arc<dyn LinkProbe>, Option<Arc<SimBackend>>) =
        match mode {
            BackendMode::Remote => {
                let client = Arc::new(
                    RemoteCommandClient::from_config(config)
                        .context("Failed to build backend client")?,
                );
                info!(base_url = %client.base_url(), "backend_remote");
                let probe: Arc<dyn LinkProbe> = client.clone();
                (Backends::from_shared(client), probe, None)
            }
            BackendMode::Sim { slots } => {
                let sim = Arc::new(SimBackend::with_demo_data(slots));
                info!(slots = %slots, "backend_sim");
                let probe: Arc<dyn LinkProbe> = sim.clone();
                (Backends::from_shared(sim.clone()), probe, Some(sim))
            }
        };

    let (monitor, link_rx) = ConnectivityMonitor::new(probe, config);
    let (controller, handle) = ScanController::new(backends, link_rx, config, metrics.clone());

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(monitor.run(shutdown.clone())));
    tasks.push(tokio::spawn(controller.run(shutdown.clone())));

    // Metrics reporter
    let reporter_metrics = metrics.clone();
    let mut reporter_shutdown = shutdown.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick is immediate
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => reporter_metrics.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let station_id = config.station_id().to_string();
        let prom_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                station_id,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    Ok(Station { handle, metrics, sim, tasks })
}
