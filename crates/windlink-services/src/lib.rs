//! windlink-services: stateful pieces shared by the daemon and tests,
//! per-node sequence tracking and telemetry sinks.

pub mod influx;
pub mod sink;
pub mod tracker;

pub use influx::InfluxSink;
pub use sink::{LogSink, MemorySink, SinkError, TelemetryRecord, TelemetrySink};
pub use tracker::SequenceTracker;
