//! Scan and slot-assignment controller
//!
//! One `ScanController` task owns the `ScanSession` for a scanning surface.
//! Surfaces talk to it through a cloneable `ScanHandle`:
//! - commands go in over a bounded queue and run one at a time
//! - the session is published over a `watch` channel after every change
//!
//! The pipeline itself lives in `pipeline.rs`.

mod pipeline;

use crate::domain::scan_state::{ScanSession, Transition};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::remote::Backends;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

/// Where a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Scanner,
    Keypad,
}

impl ScanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSource::Scanner => "scanner",
            ScanSource::Keypad => "keypad",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    Scan { code: String, source: ScanSource },
    /// Confirmed clear-conveyor gesture
    ClearConveyor,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("scan controller is busy")]
    Busy,
    #[error("scan controller has stopped")]
    Closed,
}

/// Cloneable front end to a running controller
#[derive(Clone)]
pub struct ScanHandle {
    command_tx: mpsc::Sender<ScanCommand>,
    session_rx: watch::Receiver<ScanSession>,
    metrics: Arc<Metrics>,
}

impl ScanHandle {
    /// Enqueue a command without waiting; a full queue is `Busy`
    pub fn submit(&self, command: ScanCommand) -> Result<(), SubmitError> {
        match self.command_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                self.metrics.record_rejected_busy();
                warn!(command = ?command, "scan_command_rejected_busy");
                Err(SubmitError::Busy)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    pub fn scan(&self, code: impl Into<String>, source: ScanSource) -> Result<(), SubmitError> {
        self.submit(ScanCommand::Scan { code: code.into(), source })
    }

    /// Latest published session
    pub fn snapshot(&self) -> ScanSession {
        self.session_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanSession> {
        self.session_rx.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.session_rx.borrow().busy()
    }
}

pub struct ScanController {
    backends: Backends,
    session: ScanSession,
    session_tx: watch::Sender<ScanSession>,
    command_rx: mpsc::Receiver<ScanCommand>,
    link_rx: watch::Receiver<bool>,
    /// False once the connectivity monitor is gone
    link_open: bool,
    metrics: Arc<Metrics>,
    station_id: String,
    min_code_len: usize,
    error_revert: Duration,
    sensor_timeout: Duration,
    /// Pending return to `Waiting` after a validation error
    revert_at: Option<Instant>,
}

impl ScanController {
    pub fn new(
        backends: Backends,
        link_rx: watch::Receiver<bool>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> (Self, ScanHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.queue_depth());
        let session = ScanSession::new();
        let (session_tx, session_rx) = watch::channel(session.clone());

        let controller = Self {
            backends,
            session,
            session_tx,
            command_rx,
            link_rx,
            link_open: true,
            metrics: metrics.clone(),
            station_id: config.station_id().to_string(),
            min_code_len: config.min_code_len(),
            error_revert: config.error_revert(),
            sensor_timeout: config.sensor_timeout(),
            revert_at: None,
        };
        let handle = ScanHandle { command_tx, session_rx, metrics };
        (controller, handle)
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(station = %self.station_id, "scan_controller_started");

        self.on_link_change();
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("scan_controller_stopped");
                return;
            }
            _ = self.refresh_stats() => {}
        }

        loop {
            let revert_at = self.revert_at;
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                changed = self.link_rx.changed(), if self.link_open => {
                    match changed {
                        Ok(()) => self.on_link_change(),
                        Err(_) => {
                            warn!("connectivity_monitor_closed");
                            self.link_open = false;
                        }
                    }
                }
                _ = sleep_or_pending(revert_at) => {
                    self.revert_at = None;
                    debug!("scan_error_reverted");
                    self.commit(Transition::Revert);
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    // Teardown mid-command drops the pipeline; nothing more is published
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown) => break,
                        _ = self.handle_command(command) => {}
                    }
                }
            }
        }

        info!(station = %self.station_id, "scan_controller_stopped");
    }

    async fn handle_command(&mut self, command: ScanCommand) {
        let started = Instant::now();
        self.session.begin_command();
        self.publish();

        match command {
            ScanCommand::Scan { code, source } => self.process_scan(&code, source).await,
            ScanCommand::ClearConveyor => self.clear_conveyor().await,
            ScanCommand::Reset => {
                self.commit(Transition::Reset);
                info!("scan_session_reset");
            }
        }

        self.session.finish_command();
        self.publish();
        self.metrics.record_pipeline_latency(started.elapsed().as_millis() as u64);
    }

    fn on_link_change(&mut self) {
        let connected = *self.link_rx.borrow_and_update();
        if connected == self.session.link_connected() {
            return;
        }

        self.metrics.set_link_connected(connected);
        if connected {
            info!("conveyor_link_restored");
            self.commit(Transition::LinkUp);
        } else {
            warn!("conveyor_link_down");
            self.commit(Transition::LinkDown);
        }
    }

    /// Apply a transition and publish; a state change cancels a pending revert
    fn commit(&mut self, transition: Transition) {
        let before = self.session.state().clone();
        self.session.apply(transition);
        if *self.session.state() != before {
            self.revert_at = None;
        }
        self.publish();
    }

    fn publish(&self) {
        self.session_tx.send_replace(self.session.clone());
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
