//! windlinkd: telemetry receiver daemon.
//!
//! The binary in `main.rs` wires configuration to these pieces; the
//! integration tests drive them directly.

pub mod ingest;
pub mod socket;
pub mod status;

pub use ingest::{IngestLoop, IngestOptions, IngestStats, Outcome, StatsSnapshot, MAX_DATAGRAM};
pub use socket::bind_telemetry_socket;
