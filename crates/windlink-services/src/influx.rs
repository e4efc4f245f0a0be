//! InfluxDB v2 sink.
//!
//! One point per record, written as line protocol to `/api/v2/write` with
//! nanosecond precision:
//!
//! ```text
//! wind_station,node_id=7 wind_avg_1m=12.5,gust_1m=21,dir_avg_1m=180i,battery_mv=3700i,seq=42i,msg_type=1i 1700000000000000000
//! ```

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use windlink_core::config::SinkConfig;

use crate::sink::{SinkError, TelemetryRecord, TelemetrySink};

/// Writes telemetry to an InfluxDB v2 bucket over HTTP.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    token: String,
    measurement: String,
}

impl InfluxSink {
    /// Build from the `[sink]` config section.
    ///
    /// `timeout` bounds each HTTP request; the ingest loop applies its own
    /// bound on top.
    pub fn new(config: &SinkConfig, timeout: Duration) -> anyhow::Result<Self> {
        let base = config.influx_url.trim_end_matches('/');
        let write_url = Url::parse_with_params(
            &format!("{base}/api/v2/write"),
            &[
                ("org", config.influx_org.as_str()),
                ("bucket", config.influx_bucket.as_str()),
                ("precision", "ns"),
            ],
        )?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            write_url,
            token: config.influx_token.clone(),
            measurement: config.measurement.clone(),
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

impl TelemetrySink for InfluxSink {
    fn name(&self) -> &'static str {
        "influx"
    }

    fn write<'a>(&'a self, record: &'a TelemetryRecord) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let line = line_protocol(&self.measurement, record);

            let resp = self
                .client
                .post(self.write_url.clone())
                .header("Authorization", format!("Token {}", self.token))
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(line)
                .send()
                .await
                .map_err(|e| SinkError::Unavailable(e.to_string()))?;

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }
            let body = resp.text().await.unwrap_or_default();
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        })
    }
}

/// Render one record as a line-protocol point.
pub fn line_protocol(measurement: &str, record: &TelemetryRecord) -> String {
    format!(
        "{},node_id={} wind_avg_1m={},gust_1m={},dir_avg_1m={}i,battery_mv={}i,seq={}i,msg_type={}i {}",
        escape_measurement(measurement),
        record.node_id,
        record.wind_avg(),
        record.wind_gust(),
        record.direction_degrees,
        record.battery_millivolts,
        record.sequence,
        record.msg_type,
        record.timestamp_nanos(),
    )
}

/// Measurement names escape commas and spaces.
fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}
