//! Per-node sequence tracking.
//!
//! Remembers the highest sequence number accepted from each node so that
//! every ack reports the node's true progress, even when the frame being
//! acknowledged is a duplicate or arrived out of order.
//!
//! Sequence wraparound is NOT handled. Once a node's counter passes
//! `u32::MAX` and restarts near zero, its frames look like regressions and
//! the stored maximum stays put until the counter climbs past it again.
//! A windowed comparison would change what nodes see in their acks, so it
//! is left out until the firmware's wrap behaviour is pinned down.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Shared handle to the per-node sequence table.
///
/// Clones share the same table. Updates to one node hold only that node's
/// shard lock, so arrivals for different nodes rarely contend.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    table: Arc<DashMap<u8, u32>>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }

    /// Record `sequence` for `node_id` and return the node's highest known
    /// sequence afterwards.
    ///
    /// The stored value only moves when `sequence` is strictly greater.
    /// The read-compare-write runs under the entry's write lock, so
    /// concurrent observations of one node are linearizable.
    pub fn observe(&self, node_id: u8, sequence: u32) -> u32 {
        let mut last = self.table.entry(node_id).or_insert(0);
        if sequence > *last {
            *last = sequence;
        }
        *last
    }

    /// Highest sequence seen for a node, if it has ever sent a valid frame.
    pub fn last_sequence(&self, node_id: u8) -> Option<u32> {
        self.table.get(&node_id).map(|v| *v)
    }

    /// Point-in-time copy of the table, ordered by node id.
    ///
    /// Not atomic across nodes: each entry is read under its own shard lock.
    pub fn snapshot(&self) -> BTreeMap<u8, u32> {
        self.table.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// Number of nodes seen.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
