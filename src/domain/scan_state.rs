//! Scan session state and its transition function
//!
//! `ScanState` is a tagged union: each variant carries exactly the data that
//! state displays. `ScanSession::apply` is the only way the controller moves
//! between states, so a session never shows fields from two different scans.

use crate::domain::types::{Customer, Garment, ScanCode, ShortCode, SlotNumber, SlotStats, Ticket};
use std::fmt::Display;

/// Coarse classification of scan failures (for metrics and rendering)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Connectivity,
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Backend => "backend",
        }
    }
}

/// Why a scan did not reach a success state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("barcode {code:?} is shorter than {min_len} characters")]
    Validation { code: String, min_len: usize },
    #[error("no ticket found for {0}")]
    NotFound(ScanCode),
    #[error("conveyor link is disconnected")]
    Connectivity,
    #[error("{operation} failed: {message}")]
    Backend { operation: &'static str, message: String },
}

impl ScanError {
    pub fn backend(operation: &'static str, err: impl Display) -> Self {
        ScanError::Backend { operation, message: err.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Validation { .. } => ErrorKind::Validation,
            ScanError::NotFound(_) => ErrorKind::NotFound,
            ScanError::Connectivity => ErrorKind::Connectivity,
            ScanError::Backend { .. } => ErrorKind::Backend,
        }
    }

    /// Only validation errors return to `Waiting` on their own
    pub fn auto_reverts(&self) -> bool {
        matches!(self, ScanError::Validation { .. })
    }
}

impl From<ShortCode> for ScanError {
    fn from(short: ShortCode) -> Self {
        ScanError::Validation { code: short.trimmed, min_len: short.min_len }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Waiting,
    Validating { code: ScanCode },
    Success { code: ScanCode, slot: SlotNumber },
    Error { error: ScanError },
    TicketComplete { code: ScanCode, slot: SlotNumber },
    GarmentOnConveyor { code: ScanCode, slot: SlotNumber },
    ConveyorDisconnected,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Waiting => "waiting",
            ScanState::Validating { .. } => "validating",
            ScanState::Success { .. } => "success",
            ScanState::Error { .. } => "error",
            ScanState::TicketComplete { .. } => "ticket_complete",
            ScanState::GarmentOnConveyor { .. } => "garment_on_conveyor",
            ScanState::ConveyorDisconnected => "conveyor_disconnected",
        }
    }

    /// Panel headline, sized for reading across the shop floor
    pub fn title(&self) -> &'static str {
        match self {
            ScanState::Waiting => "WAITING FOR SCAN",
            ScanState::Validating { .. } => "CHECKING BARCODE",
            ScanState::Success { .. } => "SCAN SUCCESS",
            ScanState::Error { .. } => "SCAN ERROR",
            ScanState::TicketComplete { .. } => "TICKET COMPLETE",
            ScanState::GarmentOnConveyor { .. } => "GARMENT ON CONVEYOR",
            ScanState::ConveyorDisconnected => "CONVEYOR DISCONNECTED",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            ScanState::Waiting => "Position barcode under scanner",
            ScanState::Validating { .. } => "Please wait",
            ScanState::Success { .. } => "Garment accepted and logged",
            ScanState::Error { .. } => "Invalid barcode - please try again",
            ScanState::TicketComplete { .. } => "REMOVE GARMENTS AND PROCEED",
            ScanState::GarmentOnConveyor { .. } => "Garment detected at load point",
            ScanState::ConveyorDisconnected => "CHECK CONVEYOR CONNECTION",
        }
    }

    /// States rendered as full-panel fault indicators
    pub fn is_fault(&self) -> bool {
        matches!(self, ScanState::Error { .. } | ScanState::ConveyorDisconnected)
    }

    pub fn slot(&self) -> Option<SlotNumber> {
        match self {
            ScanState::Success { slot, .. }
            | ScanState::TicketComplete { slot, .. }
            | ScanState::GarmentOnConveyor { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

/// Customer/ticket/garments shown for the most recent resolved scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayContext {
    pub customer: Option<Customer>,
    pub ticket: Option<Ticket>,
    pub garments: Vec<Garment>,
}

impl DisplayContext {
    pub fn customer_only(customer: Option<Customer>) -> Self {
        Self { customer, ticket: None, garments: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.customer.is_none() && self.ticket.is_none() && self.garments.is_empty()
    }
}

/// Inputs to the transition function
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A normalized code entered the pipeline
    Begin(ScanCode),
    Fail(ScanError),
    /// Last garment of a family: conveyor presents the family slot
    Complete { code: ScanCode, slot: SlotNumber, context: DisplayContext },
    /// Non-terminal garment accepted into a reserved slot
    Accept { code: ScanCode, slot: SlotNumber, context: DisplayContext },
    GarmentDetected,
    LinkDown,
    LinkUp,
    /// Auto-revert timer for validation errors
    Revert,
    Reset,
}

/// Everything a scanning surface renders, owned by one controller
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    state: ScanState,
    context: DisplayContext,
    last_scan: Option<ScanCode>,
    scan_count: u64,
    next_slot: Option<SlotNumber>,
    stats: Option<SlotStats>,
    link_connected: bool,
    busy: bool,
    commands_handled: u64,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            state: ScanState::Waiting,
            context: DisplayContext::default(),
            last_scan: None,
            scan_count: 0,
            next_slot: None,
            stats: None,
            link_connected: true,
            busy: false,
            commands_handled: 0,
        }
    }

    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Begin(code) => {
                self.state = ScanState::Validating { code };
                self.context = DisplayContext::default();
            }
            Transition::Fail(ScanError::Connectivity) => {
                self.state = ScanState::ConveyorDisconnected;
                self.context = DisplayContext::default();
            }
            Transition::Fail(error) => {
                self.state = ScanState::Error { error };
                self.context = DisplayContext::default();
            }
            Transition::Complete { code, slot, context } => {
                self.state = ScanState::TicketComplete { code, slot };
                self.context = context;
                self.next_slot = Some(slot);
            }
            Transition::Accept { code, slot, context } => {
                self.last_scan = Some(code.clone());
                self.scan_count += 1;
                self.next_slot = Some(slot);
                self.context = context;
                self.state = ScanState::Success { code, slot };
            }
            Transition::GarmentDetected => {
                if let ScanState::Success { code, slot } = &self.state {
                    self.state = ScanState::GarmentOnConveyor { code: code.clone(), slot: *slot };
                }
            }
            Transition::LinkDown => {
                self.link_connected = false;
                self.state = ScanState::ConveyorDisconnected;
                self.context = DisplayContext::default();
            }
            Transition::LinkUp => {
                self.link_connected = true;
                if self.state == ScanState::ConveyorDisconnected {
                    self.state = ScanState::Waiting;
                }
            }
            Transition::Revert => {
                if matches!(self.state, ScanState::Error { .. }) {
                    self.state = ScanState::Waiting;
                    self.context = DisplayContext::default();
                }
            }
            Transition::Reset => {
                self.context = DisplayContext::default();
                self.state = if self.link_connected {
                    ScanState::Waiting
                } else {
                    ScanState::ConveyorDisconnected
                };
            }
        }
    }

    /// Cache the latest occupancy snapshot (not part of the state machine)
    pub fn set_stats(&mut self, stats: SlotStats) {
        self.stats = Some(stats);
    }

    pub(crate) fn begin_command(&mut self) {
        self.busy = true;
    }

    pub(crate) fn finish_command(&mut self) {
        self.busy = false;
        self.commands_handled += 1;
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn context(&self) -> &DisplayContext {
        &self.context
    }

    pub fn last_scan(&self) -> Option<&ScanCode> {
        self.last_scan.as_ref()
    }

    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn next_slot(&self) -> Option<SlotNumber> {
        self.next_slot
    }

    pub fn stats(&self) -> Option<&SlotStats> {
        self.stats.as_ref()
    }

    pub fn link_connected(&self) -> bool {
        self.link_connected
    }

    /// A command is being processed by the controller
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Commands fully processed since start (monotonic)
    pub fn commands_handled(&self) -> u64 {
        self.commands_handled
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> ScanCode {
        ScanCode::parse(raw, 4).unwrap()
    }

    fn customer() -> Customer {
        Customer {
            customer_identifier: "C-17".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Moss".to_string(),
            phone_number: "555-0101".to_string(),
        }
    }

    #[test]
    fn test_new_session_waits() {
        let session = ScanSession::new();
        assert_eq!(session.state(), &ScanState::Waiting);
        assert!(session.context().is_empty());
        assert!(session.link_connected());
        assert_eq!(session.scan_count(), 0);
    }

    #[test]
    fn test_accept_increments_counter_and_replaces_context() {
        let mut session = ScanSession::new();
        session.apply(Transition::Begin(code("1001-2")));
        assert_eq!(session.state().as_str(), "validating");

        session.apply(Transition::Accept {
            code: code("1001-2"),
            slot: SlotNumber(3),
            context: DisplayContext::customer_only(Some(customer())),
        });

        assert_eq!(
            session.state(),
            &ScanState::Success { code: code("1001-2"), slot: SlotNumber(3) }
        );
        assert_eq!(session.scan_count(), 1);
        assert_eq!(session.next_slot(), Some(SlotNumber(3)));
        assert_eq!(session.last_scan(), Some(&code("1001-2")));
        assert_eq!(session.context().customer, Some(customer()));
    }

    #[test]
    fn test_complete_keeps_counter() {
        let mut session = ScanSession::new();
        session.apply(Transition::Complete {
            code: code("1001-3"),
            slot: SlotNumber(7),
            context: DisplayContext::customer_only(Some(customer())),
        });

        assert_eq!(session.state().as_str(), "ticket_complete");
        assert_eq!(session.scan_count(), 0);
        assert_eq!(session.next_slot(), Some(SlotNumber(7)));
        assert_eq!(session.last_scan(), None);
    }

    #[test]
    fn test_garment_detected_only_overrides_success() {
        let mut session = ScanSession::new();
        session.apply(Transition::GarmentDetected);
        assert_eq!(session.state(), &ScanState::Waiting);

        session.apply(Transition::Accept {
            code: code("1001-2"),
            slot: SlotNumber(3),
            context: DisplayContext::default(),
        });
        session.apply(Transition::GarmentDetected);
        assert_eq!(
            session.state(),
            &ScanState::GarmentOnConveyor { code: code("1001-2"), slot: SlotNumber(3) }
        );
    }

    #[test]
    fn test_fail_clears_context() {
        let mut session = ScanSession::new();
        session.apply(Transition::Accept {
            code: code("1001-2"),
            slot: SlotNumber(3),
            context: DisplayContext::customer_only(Some(customer())),
        });

        session.apply(Transition::Fail(ScanError::NotFound(code("9999"))));
        assert!(matches!(session.state(), ScanState::Error { .. }));
        assert!(session.context().is_empty());
        // Counter and last scan belong to the session, not the failed scan
        assert_eq!(session.scan_count(), 1);
    }

    #[test]
    fn test_revert_only_leaves_error() {
        let mut session = ScanSession::new();
        session.apply(Transition::Accept {
            code: code("1001-2"),
            slot: SlotNumber(3),
            context: DisplayContext::default(),
        });
        session.apply(Transition::Revert);
        assert_eq!(session.state().as_str(), "success");

        session.apply(Transition::Fail(ScanError::Validation { code: "AB".into(), min_len: 4 }));
        session.apply(Transition::Revert);
        assert_eq!(session.state(), &ScanState::Waiting);
    }

    #[test]
    fn test_link_down_and_up() {
        let mut session = ScanSession::new();
        session.apply(Transition::LinkDown);
        assert_eq!(session.state(), &ScanState::ConveyorDisconnected);
        assert!(!session.link_connected());

        // Reset while disconnected stays on the fault panel
        session.apply(Transition::Reset);
        assert_eq!(session.state(), &ScanState::ConveyorDisconnected);

        session.apply(Transition::LinkUp);
        assert_eq!(session.state(), &ScanState::Waiting);
        assert!(session.link_connected());
    }

    #[test]
    fn test_link_up_does_not_clobber_scan_result() {
        let mut session = ScanSession::new();
        session.apply(Transition::Complete {
            code: code("1001-3"),
            slot: SlotNumber(7),
            context: DisplayContext::default(),
        });
        session.apply(Transition::LinkUp);
        assert_eq!(session.state().as_str(), "ticket_complete");
    }

    #[test]
    fn test_connectivity_failure_shows_disconnected() {
        let mut session = ScanSession::new();
        session.apply(Transition::Fail(ScanError::Connectivity));
        assert_eq!(session.state(), &ScanState::ConveyorDisconnected);
    }

    #[test]
    fn test_command_bookkeeping() {
        let mut session = ScanSession::new();
        session.begin_command();
        assert!(session.busy());
        session.finish_command();
        assert!(!session.busy());
        assert_eq!(session.commands_handled(), 1);
    }

    #[test]
    fn test_error_kind_and_auto_revert() {
        let short: ScanError = ShortCode { trimmed: "AB".into(), min_len: 4 }.into();
        assert_eq!(short.kind(), ErrorKind::Validation);
        assert!(short.auto_reverts());

        let backend = ScanError::backend("reserve", "no available slots");
        assert_eq!(backend.kind().as_str(), "backend");
        assert!(!backend.auto_reverts());
        assert_eq!(backend.to_string(), "reserve failed: no available slots");
    }
}
