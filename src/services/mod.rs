//! Services - station logic and state management
//!
//! - `scan_controller` - Scan state machine, command queue and pipeline
//! - `connectivity` - Debounced conveyor link monitor
//! - `manual_entry` - Keypad buffer for manual codes
//! - `clear_guard` - 1-2-3 confirmation gesture for clearing the conveyor
//! - `input` - Focus and key routing for a scanning surface

pub mod clear_guard;
pub mod connectivity;
pub mod input;
pub mod manual_entry;
pub mod scan_controller;

// Re-export commonly used types
pub use connectivity::ConnectivityMonitor;
pub use input::{Focus, InputRouter};
pub use scan_controller::{ScanCommand, ScanController, ScanHandle, ScanSource, SubmitError};
