//! Scan pipeline steps
//!
//! Order for a scanned code:
//! 1. refuse while the conveyor link is down
//! 2. trim and length-check (auto-reverting error)
//! 3. ticket existence
//! 4. last garment of its family: present the family slot
//! 5. otherwise: reserve a slot, run the conveyor, read the hanger sensor
//!
//! Any collaborator failure ends the scan in `Error` and skips the
//! remaining steps.

use super::{ScanController, ScanSource};
use crate::domain::scan_state::{DisplayContext, ScanError, Transition};
use crate::domain::types::{ScanCode, SlotNumber};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

impl ScanController {
    pub(super) async fn process_scan(&mut self, raw: &str, source: ScanSource) {
        let scan_id = Uuid::now_v7();
        self.metrics.record_scan();

        if !self.session.link_connected() {
            self.metrics.record_rejected_disconnected();
            warn!(
                scan_id = %scan_id,
                code = %raw.trim(),
                source = %source.as_str(),
                "scan_rejected_disconnected"
            );
            self.commit(Transition::Fail(ScanError::Connectivity));
            return;
        }

        let code = match ScanCode::parse(raw, self.min_code_len) {
            Ok(code) => code,
            Err(short) => {
                self.fail(scan_id, short.into());
                return;
            }
        };

        debug!(scan_id = %scan_id, code = %code, source = %source.as_str(), "scan_received");
        self.commit(Transition::Begin(code.clone()));

        if let Err(err) = self.resolve(&code, scan_id).await {
            self.fail(scan_id, err);
        }
    }

    async fn resolve(&mut self, code: &ScanCode, scan_id: Uuid) -> Result<(), ScanError> {
        let exists = self
            .backends
            .tickets
            .ticket_exists(code)
            .await
            .map_err(|e| ScanError::backend("ticket_exists", e))?;
        if !exists {
            return Err(ScanError::NotFound(code.clone()));
        }

        let is_last = self
            .backends
            .tickets
            .is_last_garment(code)
            .await
            .map_err(|e| ScanError::backend("is_last_garment", e))?;

        if is_last {
            self.complete_ticket(code, scan_id).await
        } else {
            self.accept_garment(code, scan_id).await
        }
    }

    async fn complete_ticket(&mut self, code: &ScanCode, scan_id: Uuid) -> Result<(), ScanError> {
        let slot = self
            .backends
            .slots
            .slot_for_family(code)
            .await
            .map_err(|e| ScanError::backend("slot_for_family", e))?
            .ok_or_else(|| ScanError::backend("slot_for_family", "no slot for ticket family"))?;

        let customer = self
            .backends
            .tickets
            .customer_for(code)
            .await
            .map_err(|e| ScanError::backend("customer_for", e))?;

        let customer_name = customer.as_ref().map(|c| c.display_name()).unwrap_or_default();
        info!(
            scan_id = %scan_id,
            code = %code,
            slot = %slot,
            customer = %customer_name,
            "ticket_complete"
        );
        self.commit(Transition::Complete {
            code: code.clone(),
            slot,
            context: DisplayContext::customer_only(customer),
        });
        self.metrics.record_ticket_complete();

        self.run_to_slot(slot, scan_id).await?;
        self.refresh_stats().await;
        Ok(())
    }

    async fn accept_garment(&mut self, code: &ScanCode, scan_id: Uuid) -> Result<(), ScanError> {
        let customer = self
            .backends
            .tickets
            .customer_for(code)
            .await
            .map_err(|e| ScanError::backend("customer_for", e))?;
        let ticket = self
            .backends
            .tickets
            .ticket_for(code)
            .await
            .map_err(|e| ScanError::backend("ticket_for", e))?;
        let garments = self
            .backends
            .tickets
            .list_garments(&ticket.full_invoice_number)
            .await
            .map_err(|e| ScanError::backend("list_garments", e))?;

        let slot = self
            .backends
            .slots
            .reserve(code)
            .await
            .map_err(|e| ScanError::backend("reserve", e))?
            .ok_or_else(|| ScanError::backend("reserve", "no available slots"))?;

        info!(
            scan_id = %scan_id,
            code = %code,
            slot = %slot,
            ticket = %ticket.display_invoice_number,
            processed = %ticket.garments_processed,
            items = %ticket.number_of_items,
            "scan_accepted"
        );
        self.commit(Transition::Accept {
            code: code.clone(),
            slot,
            context: DisplayContext { customer, ticket: Some(ticket), garments },
        });
        self.metrics.record_accepted();

        self.run_to_slot(slot, scan_id).await?;
        self.refresh_stats().await;

        // Sensor timeout reads as "no garment"
        let present = match timeout(self.sensor_timeout, self.backends.conveyor.read_hanger_sensor())
            .await
        {
            Ok(Ok(present)) => present,
            Ok(Err(e)) => return Err(ScanError::backend("read_hanger_sensor", e)),
            Err(_) => {
                debug!(scan_id = %scan_id, "hanger_sensor_timeout");
                false
            }
        };

        if present {
            info!(scan_id = %scan_id, slot = %slot, "garment_on_conveyor");
            self.commit(Transition::GarmentDetected);
            self.metrics.record_garment_on_conveyor();
        }
        Ok(())
    }

    async fn run_to_slot(&mut self, slot: SlotNumber, scan_id: Uuid) -> Result<(), ScanError> {
        let started = Instant::now();
        self.backends
            .conveyor
            .run_to_slot(slot)
            .await
            .map_err(|e| ScanError::backend("run_to_slot", e))?;
        debug!(
            scan_id = %scan_id,
            slot = %slot,
            latency_ms = %started.elapsed().as_millis(),
            "conveyor_run_to_slot"
        );
        Ok(())
    }

    /// Re-read occupancy; failures keep the cached snapshot
    pub(super) async fn refresh_stats(&mut self) {
        match self.backends.slots.stats().await {
            Ok(stats) => {
                self.metrics.set_slot_occupancy(stats.total_slots, stats.slots_used);
                self.session.set_stats(stats);
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "slot_stats_refresh_failed");
            }
        }
    }

    pub(super) async fn clear_conveyor(&mut self) {
        if let Err(e) = self.backends.slots.clear_all().await {
            self.fail(Uuid::now_v7(), ScanError::backend("clear_all", e));
            return;
        }

        self.metrics.record_clear_conveyor();
        self.refresh_stats().await;
        self.commit(Transition::Reset);
        info!("conveyor_cleared");
    }

    fn fail(&mut self, scan_id: Uuid, error: ScanError) {
        self.metrics.record_error(error.kind());
        warn!(scan_id = %scan_id, kind = %error.kind().as_str(), error = %error, "scan_failed");

        let auto_reverts = error.auto_reverts();
        self.commit(Transition::Fail(error));
        if auto_reverts {
            self.revert_at = Some(Instant::now() + self.error_revert);
        }
    }
}
