//! Collaborator interfaces consumed by the scan controller
//!
//! Ticket lookup, slot allocation, conveyor actuation and link status live
//! behind these traits. Implementations: `RemoteCommandClient` (HTTP command
//! boundary) and `SimBackend` (in-memory).

use crate::domain::types::{Customer, Garment, ScanCode, SlotNumber, SlotStats, Ticket};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Failure talking to a collaborator
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{command} returned HTTP {status}: {body}")]
    Status { command: &'static str, status: u16, body: String },
    #[error("failed to encode {command} arguments: {source}")]
    Encode {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {command} response: {source}")]
    Decode {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Backend(String),
}

impl RemoteError {
    pub fn backend(message: impl Into<String>) -> Self {
        RemoteError::Backend(message.into())
    }
}

#[async_trait]
pub trait TicketResolver: Send + Sync {
    async fn ticket_exists(&self, code: &ScanCode) -> Result<bool, RemoteError>;

    async fn customer_for(&self, code: &ScanCode) -> Result<Option<Customer>, RemoteError>;

    /// True when `code` is the last unscanned garment of its family
    async fn is_last_garment(&self, code: &ScanCode) -> Result<bool, RemoteError>;

    async fn ticket_for(&self, code: &ScanCode) -> Result<Ticket, RemoteError>;

    async fn list_garments(&self, full_invoice_number: &str) -> Result<Vec<Garment>, RemoteError>;
}

#[async_trait]
pub trait SlotAllocator: Send + Sync {
    /// Reserve a slot for a scanned garment; `None` when nothing is free
    async fn reserve(&self, code: &ScanCode) -> Result<Option<SlotNumber>, RemoteError>;

    /// Slot holding the family of a completing ticket
    async fn slot_for_family(&self, code: &ScanCode) -> Result<Option<SlotNumber>, RemoteError>;

    async fn stats(&self) -> Result<SlotStats, RemoteError>;

    async fn clear_all(&self) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait ConveyorActuator: Send + Sync {
    async fn run_to_slot(&self, slot: SlotNumber) -> Result<(), RemoteError>;

    /// Whether a hanger is present at the load point. Callers bound the wait.
    async fn read_hanger_sensor(&self) -> Result<bool, RemoteError>;
}

#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn link_status(&self) -> Result<bool, RemoteError>;
}

/// Everything a station needs from one backend
pub trait StationBackend: TicketResolver + SlotAllocator + ConveyorActuator + LinkProbe {}

impl<T> StationBackend for T where T: TicketResolver + SlotAllocator + ConveyorActuator + LinkProbe {}

/// Collaborators handed to the scan controller
#[derive(Clone)]
pub struct Backends {
    pub tickets: Arc<dyn TicketResolver>,
    pub slots: Arc<dyn SlotAllocator>,
    pub conveyor: Arc<dyn ConveyorActuator>,
}

impl Backends {
    /// Use one backend for all three roles
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: TicketResolver + SlotAllocator + ConveyorActuator + 'static,
    {
        Self { tickets: backend.clone(), slots: backend.clone(), conveyor: backend }
    }
}

/// Commands exposed over the remote command boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TicketExists,
    CustomerFor,
    IsLastGarment,
    SlotForFamily,
    TicketFor,
    ListGarments,
    Reserve,
    RunToSlot,
    ReadHangerSensor,
    ClearAll,
    GetStats,
    LinkStatus,
}

impl Command {
    pub const ALL: [Command; 12] = [
        Command::TicketExists,
        Command::CustomerFor,
        Command::IsLastGarment,
        Command::SlotForFamily,
        Command::TicketFor,
        Command::ListGarments,
        Command::Reserve,
        Command::RunToSlot,
        Command::ReadHangerSensor,
        Command::ClearAll,
        Command::GetStats,
        Command::LinkStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::TicketExists => "ticket_exists",
            Command::CustomerFor => "customer_for",
            Command::IsLastGarment => "is_last_garment",
            Command::SlotForFamily => "slot_for_family",
            Command::TicketFor => "ticket_for",
            Command::ListGarments => "list_garments",
            Command::Reserve => "reserve",
            Command::RunToSlot => "run_to_slot",
            Command::ReadHangerSensor => "read_hanger_sensor",
            Command::ClearAll => "clear_all",
            Command::GetStats => "get_stats",
            Command::LinkStatus => "link_status",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// `{"code": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeArgs {
    pub code: String,
}

/// `{"full_invoice_number": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceArgs {
    pub full_invoice_number: String,
}

/// `{"slot": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotArgs {
    pub slot: SlotNumber,
}

/// `{}`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NoArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::parse(command.as_str()), Some(command));
        }
        assert_eq!(Command::parse("jog_forward"), None);
    }

    #[test]
    fn test_slot_args_wire_shape() {
        let json = serde_json::to_string(&SlotArgs { slot: SlotNumber(12) }).unwrap();
        assert_eq!(json, r#"{"slot":12}"#);
        assert_eq!(serde_json::to_string(&NoArgs {}).unwrap(), "{}");
    }
}
