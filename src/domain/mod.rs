//! Domain models - station data types and the scan state machine
//!
//! - `types` - tickets, customers, garments, slot numbers and occupancy stats
//! - `scan_state` - `ScanState`, `ScanSession` and the transition function

pub mod scan_state;
pub mod types;

// Re-export commonly used types at module level
pub use scan_state::{DisplayContext, ErrorKind, ScanError, ScanSession, ScanState, Transition};
pub use types::{Customer, Garment, ScanCode, SlotNumber, SlotStats, Ticket, TicketStatus};
