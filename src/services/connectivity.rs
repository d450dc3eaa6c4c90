//! Conveyor link monitor
//!
//! Polls the link probe on a fixed interval and publishes a debounced
//! connected/disconnected flag over a `watch` channel. The link starts out
//! connected, goes down after `failure_threshold` consecutive negative
//! samples and comes back on the first positive one.

use crate::infra::config::Config;
use crate::io::remote::LinkProbe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct ConnectivityMonitor {
    probe: Arc<dyn LinkProbe>,
    poll_interval: Duration,
    failure_threshold: u32,
    consecutive_failures: u32,
    connected: bool,
    status_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn LinkProbe>, config: &Config) -> (Self, watch::Receiver<bool>) {
        let (status_tx, status_rx) = watch::channel(true);
        let monitor = Self {
            probe,
            poll_interval: config.link_poll_interval(),
            failure_threshold: config.link_failure_threshold(),
            consecutive_failures: 0,
            connected: true,
            status_tx,
        };
        (monitor, status_rx)
    }

    /// Fold one sample into the debounced status; returns the new status on change
    pub fn observe(&mut self, sample: bool) -> Option<bool> {
        if sample {
            self.consecutive_failures = 0;
            if !self.connected {
                self.connected = true;
                return Some(true);
            }
            return None;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.connected && self.consecutive_failures >= self.failure_threshold {
            self.connected = false;
            return Some(false);
        }
        None
    }

    /// A probe error or a probe slower than the poll interval reads as down
    async fn sample(&self) -> bool {
        match timeout(self.poll_interval, self.probe.link_status()).await {
            Ok(Ok(up)) => up,
            Ok(Err(e)) => {
                debug!(error = %e, "link_probe_failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = %self.poll_interval.as_millis(), "link_probe_timeout");
                false
            }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = %self.poll_interval.as_millis(),
            failure_threshold = %self.failure_threshold,
            "connectivity_monitor_started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sample = self.sample().await;
                    if let Some(connected) = self.observe(sample) {
                        if connected {
                            info!("link_status_connected");
                        } else {
                            warn!(failures = %self.consecutive_failures, "link_status_disconnected");
                        }
                        self.status_tx.send_replace(connected);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("connectivity_monitor_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sim::SimBackend;

    fn monitor_with_threshold(threshold: u32) -> ConnectivityMonitor {
        let config = Config::default().with_link_failure_threshold(threshold);
        let (monitor, _rx) = ConnectivityMonitor::new(Arc::new(SimBackend::new(1)), &config);
        monitor
    }

    #[test]
    fn test_single_failure_is_debounced() {
        let mut monitor = monitor_with_threshold(2);
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(false), Some(false));
        assert_eq!(monitor.observe(false), None);
    }

    #[test]
    fn test_one_positive_sample_restores() {
        let mut monitor = monitor_with_threshold(3);
        monitor.observe(false);
        monitor.observe(false);
        assert_eq!(monitor.observe(false), Some(false));
        assert_eq!(monitor.observe(true), Some(true));
        assert_eq!(monitor.observe(true), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_link_changes() {
        let sim = Arc::new(SimBackend::new(1));
        sim.set_link_up(false);

        let config = Config::default();
        let (monitor, mut status_rx) = ConnectivityMonitor::new(sim.clone(), &config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(shutdown_rx));

        assert!(*status_rx.borrow());
        tokio::time::timeout(Duration::from_secs(30), status_rx.wait_for(|up| !*up))
            .await
            .unwrap()
            .unwrap();

        sim.set_link_up(true);
        tokio::time::timeout(Duration::from_secs(30), status_rx.wait_for(|up| *up))
            .await
            .unwrap()
            .unwrap();

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
