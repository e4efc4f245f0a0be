//! Telemetry ingest loop.
//!
//! Owns the UDP socket. For every datagram: decode, update the sequence
//! tracker, hand the record to the sink, and ack back to the sender.
//! Nothing a single datagram does can stop the loop; only the shutdown
//! channel ends it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use windlink_core::wire::{decode_with, encode_ack, DecodeError, LengthPolicy};
use windlink_services::{SequenceTracker, SinkError, TelemetryRecord, TelemetrySink};

/// Receive buffer size. Telemetry frames are 21 bytes; anything larger
/// than this is truncated by the kernel and then fails its checksum.
pub const MAX_DATAGRAM: usize = 512;

/// Knobs the loop takes from configuration.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub length_policy: LengthPolicy,
    /// Upper bound on one sink write. The ack is sent either way.
    pub sink_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            length_policy: LengthPolicy::Tolerant,
            sink_timeout: Duration::from_secs(2),
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Running counters, shared with the status reporter.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    accepted: AtomicU64,
    rejected_short: AtomicU64,
    rejected_oversized: AtomicU64,
    rejected_checksum: AtomicU64,
    sink_failures: AtomicU64,
    acks_sent: AtomicU64,
    ack_failures: AtomicU64,
}

/// Plain copy of `IngestStats` at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub rejected_short: u64,
    pub rejected_oversized: u64,
    pub rejected_checksum: u64,
    pub sink_failures: u64,
    pub acks_sent: u64,
    pub ack_failures: u64,
}

impl IngestStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_short: self.rejected_short.load(Ordering::Relaxed),
            rejected_oversized: self.rejected_oversized.load(Ordering::Relaxed),
            rejected_checksum: self.rejected_checksum.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejection(&self, err: &DecodeError) {
        match err {
            DecodeError::TooShort { .. } => Self::bump(&self.rejected_short),
            DecodeError::Oversized { .. } => Self::bump(&self.rejected_oversized),
            // UnexpectedMsgType only comes from ack decoding.
            DecodeError::ChecksumMismatch { .. } | DecodeError::UnexpectedMsgType(_) => {
                Self::bump(&self.rejected_checksum)
            }
        }
    }
}

// ── Loop ──────────────────────────────────────────────────────────────────────

/// What happened to one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped without reply.
    Discarded(DecodeError),
    /// Decoded and tracked. `stored` and `acked` report the two
    /// best-effort side effects.
    Accepted {
        node_id: u8,
        last_sequence: u32,
        stored: bool,
        acked: bool,
    },
}

pub struct IngestLoop {
    socket: Arc<UdpSocket>,
    tracker: SequenceTracker,
    sink: Arc<dyn TelemetrySink>,
    options: IngestOptions,
    stats: Arc<IngestStats>,
    shutdown: broadcast::Receiver<()>,
}

impl IngestLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        tracker: SequenceTracker,
        sink: Arc<dyn TelemetrySink>,
        options: IngestOptions,
        stats: Arc<IngestStats>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            tracker,
            sink,
            options,
            stats,
            shutdown,
        }
    }

    /// Process datagrams one at a time until shutdown.
    ///
    /// A slow sink delays the next receive by at most `sink_timeout`.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        tracing::info!(
            addr = ?self.socket.local_addr().ok(),
            sink = self.sink.name(),
            policy = ?self.options.length_policy,
            "ingest loop starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("ingest loop shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, from) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };
                    self.handle_datagram(&buf[..len], from).await;
                }
            }
        }
    }

    /// Run one datagram through decode → track → store → ack.
    pub async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Outcome {
        IngestStats::bump(&self.stats.received);

        let frame = match decode_with(data, self.options.length_policy) {
            Ok(f) => f,
            Err(e) => {
                tracing::trace!(
                    from = %from,
                    len = data.len(),
                    head = hex::encode(&data[..data.len().min(8)]),
                    error = %e,
                    "discarding datagram"
                );
                self.stats.record_rejection(&e);
                return Outcome::Discarded(e);
            }
        };
        IngestStats::bump(&self.stats.accepted);

        let last_sequence = self.tracker.observe(frame.node_id, frame.sequence);
        if last_sequence != frame.sequence {
            tracing::debug!(
                node_id = frame.node_id,
                seq = frame.sequence,
                last_sequence,
                "sequence behind stored maximum"
            );
        }

        let record = TelemetryRecord::from(&frame);
        let stored = match self.store(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    node_id = frame.node_id,
                    seq = frame.sequence,
                    sink = self.sink.name(),
                    error = %e,
                    "sink write failed"
                );
                IngestStats::bump(&self.stats.sink_failures);
                false
            }
        };

        let ack = encode_ack(frame.node_id, last_sequence);
        let acked = match self.socket.send_to(&ack, from).await {
            Ok(_) => {
                IngestStats::bump(&self.stats.acks_sent);
                true
            }
            Err(e) => {
                tracing::warn!(to = %from, error = %e, "ack send failed");
                IngestStats::bump(&self.stats.ack_failures);
                false
            }
        };

        tracing::debug!(
            node_id = frame.node_id,
            seq = frame.sequence,
            last_sequence,
            stored,
            acked,
            "frame processed"
        );

        Outcome::Accepted {
            node_id: frame.node_id,
            last_sequence,
            stored,
            acked,
        }
    }

    async fn store(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let timeout = self.options.sink_timeout;
        match tokio::time::timeout(timeout, self.sink.write(record)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(timeout)),
        }
    }
}
