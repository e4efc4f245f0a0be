//! windlink integration test harness.
//!
//! Each test starts the ingest loop on an ephemeral loopback port with an
//! in-memory sink, then plays the part of one or more sensor nodes over
//! real UDP sockets. No root or network setup is needed:
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use windlink_core::wire::{decode_ack, AckFrame, LengthPolicy, TelemetryFrame};
use windlink_services::{MemorySink, SequenceTracker};
use windlinkd::{bind_telemetry_socket, IngestLoop, IngestOptions, IngestStats};

mod ingest;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a node waits for an ack before deciding none is coming.
pub const ACK_WAIT: Duration = Duration::from_secs(2);

/// How long a node waits when it expects silence.
pub const SILENCE_WAIT: Duration = Duration::from_millis(200);

/// A running receiver plus handles to everything it shares.
pub struct Receiver {
    pub addr: SocketAddr,
    pub tracker: SequenceTracker,
    pub sink: MemorySink,
    pub stats: Arc<IngestStats>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl Receiver {
    pub async fn start() -> Result<Self> {
        Self::start_with(IngestOptions::default()).await
    }

    pub async fn start_strict() -> Result<Self> {
        Self::start_with(IngestOptions {
            length_policy: LengthPolicy::Strict,
            ..IngestOptions::default()
        })
        .await
    }

    pub async fn start_with(options: IngestOptions) -> Result<Self> {
        let socket = Arc::new(bind_telemetry_socket("127.0.0.1:0", 0)?);
        let addr = socket.local_addr()?;
        let tracker = SequenceTracker::new();
        let sink = MemorySink::new();
        let stats = IngestStats::new();
        let (shutdown, rx) = broadcast::channel(1);

        let task = tokio::spawn(
            IngestLoop::new(
                socket,
                tracker.clone(),
                Arc::new(sink.clone()),
                options,
                stats.clone(),
                rx,
            )
            .run(),
        );

        Ok(Self {
            addr,
            tracker,
            sink,
            stats,
            shutdown,
            task,
        })
    }

    /// Signal shutdown and wait for the loop to exit cleanly.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.send(()).ok();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .context("ingest loop did not stop")??
    }
}

/// A simulated sensor node.
pub struct Node {
    pub id: u8,
    socket: UdpSocket,
    receiver: SocketAddr,
}

impl Node {
    pub async fn new(id: u8, receiver: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self {
            id,
            socket,
            receiver,
        })
    }

    /// A plausible sample frame from this node.
    pub fn sample(&self, sequence: u32) -> TelemetryFrame {
        TelemetryFrame {
            node_id: self.id,
            msg_type: 1,
            sequence,
            timestamp: 1_700_000_000u32.wrapping_add(sequence),
            wind_avg_tenths: 125,
            wind_gust_tenths: 210,
            direction_degrees: 180,
            battery_millivolts: 3700,
            flags: 0,
        }
    }

    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send_to(bytes, self.receiver).await?;
        Ok(())
    }

    /// Send a sample and wait for its ack.
    pub async fn report(&self, sequence: u32) -> Result<AckFrame> {
        self.send_raw(&self.sample(sequence).encode()).await?;
        self.expect_ack().await
    }

    pub async fn expect_ack(&self) -> Result<AckFrame> {
        Ok(decode_ack(&self.recv_raw().await?)?)
    }

    /// Next datagram from the receiver, undecoded.
    pub async fn recv_raw(&self) -> Result<Vec<u8>> {
        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(ACK_WAIT, self.socket.recv_from(&mut buf))
            .await
            .context("no ack within timeout")??;
        anyhow::ensure!(from == self.receiver, "ack from unexpected address {from}");
        Ok(buf[..len].to_vec())
    }

    /// True if nothing arrives within SILENCE_WAIT.
    pub async fn stays_silent(&self) -> bool {
        let mut buf = [0u8; 64];
        tokio::time::timeout(SILENCE_WAIT, self.socket.recv_from(&mut buf))
            .await
            .is_err()
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("condition not met within {timeout:?}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_receiver_starts_and_stops() -> Result<()> {
    let receiver = Receiver::start().await?;
    assert!(receiver.addr.ip().is_loopback());
    assert!(receiver.tracker.is_empty());
    receiver.stop().await
}
