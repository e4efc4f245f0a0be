//! Periodic status reporting.
//!
//! The daemon serves no HTTP. Instead the sequence table and ingest
//! counters are written to the log on an interval, one summary line plus
//! one debug line per node.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use windlink_services::SequenceTracker;

use crate::ingest::{IngestStats, StatsSnapshot};

/// Everything the status line reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub nodes: BTreeMap<u8, u32>,
    pub stats: StatsSnapshot,
}

impl StatusReport {
    pub fn collect(tracker: &SequenceTracker, stats: &IngestStats) -> Self {
        Self {
            nodes: tracker.snapshot(),
            stats: stats.snapshot(),
        }
    }
}

/// Log a status report every `interval` until shutdown.
pub async fn status_loop(
    tracker: SequenceTracker,
    stats: Arc<IngestStats>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; nothing to report yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => log_report(&StatusReport::collect(&tracker, &stats)),
        }
    }
}

fn log_report(report: &StatusReport) {
    let s = &report.stats;
    tracing::info!(
        nodes = report.nodes.len(),
        received = s.received,
        accepted = s.accepted,
        rejected = s.rejected_short + s.rejected_oversized + s.rejected_checksum,
        sink_failures = s.sink_failures,
        acks_sent = s.acks_sent,
        "status"
    );
    for (node_id, last_sequence) in &report.nodes {
        tracing::debug!(node_id, last_sequence, "  node");
    }
}
