//! In-memory station backend for demos and tests
//!
//! Holds tickets, customers and garments keyed by garment barcode, plus a
//! slot table. Slot selection picks the first empty slot after the last one
//! used, wrapping around; a ticket family keeps its slot until it completes.

use crate::domain::types::{
    Customer, Garment, ScanCode, SlotNumber, SlotStats, Ticket, TicketStatus,
};
use crate::io::remote::{ConveyorActuator, LinkProbe, RemoteError, SlotAllocator, TicketResolver};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    /// Holding garments of one ticket family
    Reserved(String),
    /// Out of service; never selected
    Blocked,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Reserved(_) => "reserved",
            SlotState::Blocked => "blocked",
        }
    }
}

struct SimTicket {
    ticket: Ticket,
    customer: Customer,
}

struct SimState {
    /// Keyed by full invoice number
    tickets: FxHashMap<String, SimTicket>,
    /// Keyed by item id (the garment barcode)
    garments: FxHashMap<String, Garment>,
    scanned: FxHashSet<String>,
    /// Index 0 is slot 1
    slots: Vec<SlotState>,
    last_used: u32,
}

impl SimState {
    fn garment(&self, code: &ScanCode) -> Result<&Garment, RemoteError> {
        self.garments
            .get(code.as_str())
            .ok_or_else(|| RemoteError::backend(format!("unknown garment {}", code)))
    }

    fn family_of(&self, code: &ScanCode) -> Result<String, RemoteError> {
        Ok(self.garment(code)?.full_invoice_number.clone())
    }

    fn family_slot(&self, invoice: &str) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| matches!(s, SlotState::Reserved(owner) if owner == invoice))
            .map(|idx| idx as u32 + 1)
    }

    /// First empty slot after `last`, wrapping to the lowest empty slot
    fn pick_after(&self, last: u32) -> Option<u32> {
        let mut empties = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SlotState::Empty)
            .map(|(idx, _)| idx as u32 + 1);

        let first = empties.clone().next()?;
        Some(empties.find(|&n| n > last).unwrap_or(first))
    }

    /// Count the garment against its ticket once
    fn mark_scanned(&mut self, code: &ScanCode, slot: u32) -> Result<(), RemoteError> {
        let invoice = self.family_of(code)?;
        if let Some(garment) = self.garments.get_mut(code.as_str()) {
            garment.slot_number = Some(SlotNumber(slot));
        }
        if self.scanned.insert(code.as_str().to_string()) {
            if let Some(entry) = self.tickets.get_mut(&invoice) {
                let ticket = &mut entry.ticket;
                ticket.garments_processed = (ticket.garments_processed + 1).min(ticket.number_of_items);
            }
        }
        Ok(())
    }
}

pub struct SimBackend {
    state: Mutex<SimState>,
    link_up: AtomicBool,
    hanger_present: AtomicBool,
    runs: Mutex<Vec<SlotNumber>>,
}

impl SimBackend {
    pub fn new(slot_count: u32) -> Self {
        Self {
            state: Mutex::new(SimState {
                tickets: FxHashMap::default(),
                garments: FxHashMap::default(),
                scanned: FxHashSet::default(),
                slots: vec![SlotState::Empty; slot_count as usize],
                last_used: 0,
            }),
            link_up: AtomicBool::new(true),
            hanger_present: AtomicBool::new(false),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// A small shop floor: three customers, four tickets
    pub fn with_demo_data(slot_count: u32) -> Self {
        let sim = Self::new(slot_count);
        sim.add_ticket(
            customer("C-1001", "Ada", "Moss", "555-0101"),
            "1001",
            &[("1001-1", "Wool coat"), ("1001-2", "Silk blouse"), ("1001-3", "Linen trousers")],
        );
        sim.add_ticket(
            customer("C-1002", "Bram", "Okafor", "555-0144"),
            "1002",
            &[("1002-1", "Two-piece suit")],
        );
        sim.add_ticket(
            customer("C-1002", "Bram", "Okafor", "555-0144"),
            "1003",
            &[("1003-1", "Dress shirt"), ("1003-2", "Dress shirt")],
        );
        sim.add_ticket(
            customer("C-1004", "Lena", "Varga", "555-0199"),
            "1004",
            &[("1004-1", "Evening gown"), ("1004-2", "Wrap"), ("1004-3", "Scarf"), ("1004-4", "Gloves")],
        );
        sim
    }

    /// Register a ticket family; `items` are `(item_id, description)` pairs
    pub fn add_ticket(&self, customer: Customer, display_number: &str, items: &[(&str, &str)]) {
        let now = Local::now().naive_local();
        let full_invoice_number = format!("INV-{}", display_number);
        let ticket = Ticket {
            full_invoice_number: full_invoice_number.clone(),
            display_invoice_number: display_number.to_string(),
            number_of_items: items.len() as u32,
            garments_processed: 0,
            invoice_dropoff_date: now,
            invoice_pickup_date: now + ChronoDuration::days(3),
            status: TicketStatus::Processing,
        };

        let mut state = self.state.lock();
        for (item_id, description) in items {
            state.garments.insert(
                item_id.to_string(),
                Garment {
                    full_invoice_number: full_invoice_number.clone(),
                    item_id: item_id.to_string(),
                    item_description: description.to_string(),
                    slot_number: None,
                    invoice_comments: String::new(),
                },
            );
        }
        state.tickets.insert(full_invoice_number, SimTicket { ticket, customer });
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Relaxed);
    }

    pub fn set_hanger_present(&self, present: bool) {
        self.hanger_present.store(present, Ordering::Relaxed);
    }

    /// Take a slot out of service
    pub fn block_slot(&self, slot: SlotNumber) {
        let mut state = self.state.lock();
        if let Some(entry) = state.slots.get_mut(slot.0.saturating_sub(1) as usize) {
            *entry = SlotState::Blocked;
        }
    }

    pub fn slot_state(&self, slot: SlotNumber) -> Option<SlotState> {
        self.state.lock().slots.get(slot.0.saturating_sub(1) as usize).cloned()
    }

    /// Slots the conveyor was asked to present, oldest first
    pub fn runs(&self) -> Vec<SlotNumber> {
        self.runs.lock().clone()
    }
}

fn customer(id: &str, first: &str, last: &str, phone: &str) -> Customer {
    Customer {
        customer_identifier: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        phone_number: phone.to_string(),
    }
}

#[async_trait]
impl TicketResolver for SimBackend {
    async fn ticket_exists(&self, code: &ScanCode) -> Result<bool, RemoteError> {
        Ok(self.state.lock().garments.contains_key(code.as_str()))
    }

    async fn customer_for(&self, code: &ScanCode) -> Result<Option<Customer>, RemoteError> {
        let state = self.state.lock();
        Ok(state
            .garments
            .get(code.as_str())
            .and_then(|g| state.tickets.get(&g.full_invoice_number))
            .map(|t| t.customer.clone()))
    }

    async fn is_last_garment(&self, code: &ScanCode) -> Result<bool, RemoteError> {
        let state = self.state.lock();
        let invoice = state.family_of(code)?;
        let remaining = state.tickets.get(&invoice).map(|t| t.ticket.remaining()).unwrap_or(0);
        let already_scanned = state.scanned.contains(code.as_str());
        Ok(!already_scanned && remaining <= 1)
    }

    async fn ticket_for(&self, code: &ScanCode) -> Result<Ticket, RemoteError> {
        let state = self.state.lock();
        let invoice = state.family_of(code)?;
        state
            .tickets
            .get(&invoice)
            .map(|t| t.ticket.clone())
            .ok_or_else(|| RemoteError::backend(format!("no ticket {}", invoice)))
    }

    async fn list_garments(&self, full_invoice_number: &str) -> Result<Vec<Garment>, RemoteError> {
        let state = self.state.lock();
        let mut garments: Vec<Garment> = state
            .garments
            .values()
            .filter(|g| g.full_invoice_number == full_invoice_number)
            .cloned()
            .collect();
        garments.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(garments)
    }
}

#[async_trait]
impl SlotAllocator for SimBackend {
    async fn reserve(&self, code: &ScanCode) -> Result<Option<SlotNumber>, RemoteError> {
        let mut state = self.state.lock();
        let invoice = state.family_of(code)?;
        let complete = state
            .tickets
            .get(&invoice)
            .is_some_and(|t| t.ticket.status == TicketStatus::Complete);
        if complete {
            return Err(RemoteError::backend(format!("ticket {} already complete", invoice)));
        }

        let slot = match state.family_slot(&invoice) {
            Some(existing) => existing,
            None => {
                let Some(chosen) = state.pick_after(state.last_used) else {
                    info!(code = %code, "sim_no_empty_slot");
                    return Ok(None);
                };
                state.slots[chosen as usize - 1] = SlotState::Reserved(invoice.clone());
                state.last_used = chosen;
                chosen
            }
        };

        state.mark_scanned(code, slot)?;
        debug!(code = %code, slot = %slot, invoice = %invoice, "sim_slot_reserved");
        Ok(Some(SlotNumber(slot)))
    }

    async fn slot_for_family(&self, code: &ScanCode) -> Result<Option<SlotNumber>, RemoteError> {
        let mut state = self.state.lock();
        let invoice = state.family_of(code)?;

        // Single-garment families never reserved a slot; present a free one
        let slot = match state.family_slot(&invoice) {
            Some(existing) => existing,
            None => match state.pick_after(state.last_used) {
                Some(chosen) => {
                    state.last_used = chosen;
                    chosen
                }
                None => return Ok(None),
            },
        };

        state.mark_scanned(code, slot)?;
        state.slots[slot as usize - 1] = SlotState::Empty;
        if let Some(entry) = state.tickets.get_mut(&invoice) {
            entry.ticket.status = TicketStatus::Complete;
        }
        info!(code = %code, slot = %slot, invoice = %invoice, "sim_family_complete");
        Ok(Some(SlotNumber(slot)))
    }

    async fn stats(&self) -> Result<SlotStats, RemoteError> {
        let state = self.state.lock();
        let used = state.slots.iter().filter(|s| **s != SlotState::Empty).count() as u32;
        Ok(SlotStats::from_counts(state.slots.len() as u32, used))
    }

    async fn clear_all(&self) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state
            .slots
            .iter_mut()
            .filter(|s| **s != SlotState::Blocked)
            .for_each(|s| *s = SlotState::Empty);
        state.last_used = 0;
        info!(slots = %state.slots.len(), "sim_slots_cleared");
        Ok(())
    }
}

#[async_trait]
impl ConveyorActuator for SimBackend {
    async fn run_to_slot(&self, slot: SlotNumber) -> Result<(), RemoteError> {
        let total = self.state.lock().slots.len() as u32;
        if slot.0 == 0 || slot.0 > total {
            return Err(RemoteError::backend(format!("slot {} out of range 1..={}", slot, total)));
        }
        self.runs.lock().push(slot);
        debug!(slot = %slot, "sim_conveyor_run");
        Ok(())
    }

    async fn read_hanger_sensor(&self) -> Result<bool, RemoteError> {
        Ok(self.hanger_present.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl LinkProbe for SimBackend {
    async fn link_status(&self) -> Result<bool, RemoteError> {
        Ok(self.link_up.load(Ordering::Relaxed))
    }
}
