//! I/O adapters - remote collaborators and HTTP endpoints
//!
//! - `remote` - Collaborator traits, wire argument types, `RemoteError`
//! - `http_client` - `RemoteCommandClient` over the HTTP command boundary
//! - `command_server` - Serves any backend over the same boundary
//! - `sim` - In-memory `SimBackend` with a slot table
//! - `prometheus` - Prometheus metrics endpoint

pub mod command_server;
pub mod http_client;
pub mod prometheus;
pub mod remote;
pub mod sim;

pub use http_client::RemoteCommandClient;
pub use remote::{
    Backends, ConveyorActuator, LinkProbe, RemoteError, SlotAllocator, StationBackend,
    TicketResolver,
};
pub use sim::SimBackend;
