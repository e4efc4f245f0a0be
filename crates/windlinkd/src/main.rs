//! windlinkd: weather telemetry receiver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use windlink_core::config::WindlinkConfig;
use windlink_core::wire::LengthPolicy;
use windlink_services::{InfluxSink, LogSink, SequenceTracker, TelemetrySink};

use windlinkd::status;
use windlinkd::{bind_telemetry_socket, IngestLoop, IngestOptions, IngestStats};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = WindlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = WindlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        WindlinkConfig::default()
    });

    // Bind telemetry socket. Failing here is the only fatal error.
    let listen_addr = config.listen_addr();
    let socket = Arc::new(
        bind_telemetry_socket(&listen_addr, config.network.recv_buffer_bytes)
            .context("failed to bind telemetry socket")?,
    );
    tracing::info!(addr = %socket.local_addr()?, "UDP listening");

    // Sink
    let sink_timeout = config.sink.timeout();
    let sink: Arc<dyn TelemetrySink> = if config.sink.influx_url.is_empty() {
        tracing::warn!("no influx_url configured, telemetry will only be logged");
        Arc::new(LogSink)
    } else {
        let influx = InfluxSink::new(&config.sink, sink_timeout)
            .context("failed to configure InfluxDB sink")?;
        tracing::info!(
            url = %influx.write_url(),
            measurement = %config.sink.measurement,
            "InfluxDB sink ready"
        );
        Arc::new(influx)
    };

    // Shared state
    let tracker = SequenceTracker::new();
    let stats = IngestStats::new();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let options = IngestOptions {
        length_policy: LengthPolicy::from_strict(config.protocol.strict_length),
        sink_timeout,
    };
    let ingest_task = tokio::spawn(
        IngestLoop::new(
            socket,
            tracker.clone(),
            sink,
            options,
            stats.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    if config.status.interval_secs > 0 {
        tokio::spawn(status::status_loop(
            tracker,
            stats,
            Duration::from_secs(config.status.interval_secs),
            shutdown_tx.subscribe(),
        ));
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = ingest_task        => tracing::error!("ingest loop exited: {:?}", r),
    }

    Ok(())
}
