//! Sink trait for validated telemetry.
//!
//! The ingest loop hands every decoded frame to one sink. A failing sink
//! never blocks the acknowledgment: the node delivered its frame, and
//! whether storage kept it is our problem, not the node's.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use windlink_core::TelemetryFrame;

/// What a sink receives for each accepted frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    pub node_id: u8,
    pub sequence: u32,
    /// Seconds since the Unix epoch, as reported by the node.
    pub timestamp: u32,
    pub wind_avg_tenths: u16,
    pub wind_gust_tenths: u16,
    pub direction_degrees: u16,
    pub battery_millivolts: u16,
    pub msg_type: u8,
}

impl TelemetryRecord {
    pub fn wind_avg(&self) -> f64 {
        f64::from(self.wind_avg_tenths) / 10.0
    }

    pub fn wind_gust(&self) -> f64 {
        f64::from(self.wind_gust_tenths) / 10.0
    }

    pub fn timestamp_nanos(&self) -> u64 {
        u64::from(self.timestamp) * 1_000_000_000
    }
}

impl From<&TelemetryFrame> for TelemetryRecord {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            node_id: frame.node_id,
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            wind_avg_tenths: frame.wind_avg_tenths,
            wind_gust_tenths: frame.wind_gust_tenths,
            direction_degrees: frame.direction_degrees,
            battery_millivolts: frame.battery_millivolts,
            msg_type: frame.msg_type,
        }
    }
}

/// Why a sink write did not land.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("sink write timed out after {0:?}")]
    Timeout(Duration),
}

/// Destination for accepted telemetry.
///
/// Boxed futures keep the trait object-safe so the daemon can pick the
/// sink from configuration at startup.
pub trait TelemetrySink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Persist one record.
    fn write<'a>(&'a self, record: &'a TelemetryRecord) -> BoxFuture<'a, Result<(), SinkError>>;
}

// ── LogSink ───────────────────────────────────────────────────────────────────

/// Writes every record to the log. Used when no storage is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn write<'a>(&'a self, record: &'a TelemetryRecord) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            tracing::info!(
                node_id = record.node_id,
                seq = record.sequence,
                ts = record.timestamp,
                wind_avg = record.wind_avg(),
                gust = record.wind_gust(),
                dir = record.direction_degrees,
                battery_mv = record.battery_millivolts,
                msg_type = record.msg_type,
                "telemetry"
            );
            Ok(())
        })
    }
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Keeps records in memory. Can be told to fail or stall, for exercising
/// the ingest loop's error paths.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with `SinkError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make subsequent writes sleep before completing.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Records written so far.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write<'a>(&'a self, record: &'a TelemetryRecord) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("memory sink set to fail".to_string()));
            }
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(record.clone());
            Ok(())
        })
    }
}
