//! Configuration system for windlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WINDLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/windlink/config.toml
//!   3. ~/.config/windlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindlinkConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub sink: SinkConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the telemetry socket binds to.
    pub bind_addr: String,
    /// UDP port nodes send telemetry to.
    pub udp_port: u16,
    /// SO_RCVBUF size in bytes. 0 = OS default.
    pub recv_buffer_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Reject telemetry datagrams longer than 21 bytes instead of
    /// ignoring the trailing bytes.
    pub strict_length: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// InfluxDB base URL, e.g. http://localhost:8086. Empty = log records only.
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    /// Measurement name written for every record.
    pub measurement: String,
    /// Upper bound on a single sink write before the ack goes out anyway.
    /// 0 = default.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Seconds between status log lines. 0 = disabled.
    pub interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Port the reference deployment listens on.
pub const DEFAULT_UDP_PORT: u16 = 1700;

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            recv_buffer_bytes: 0,
        }
    }
}

/// Sink write bound used when `timeout_ms` is 0 or unset.
pub const DEFAULT_SINK_TIMEOUT_MS: u64 = 2000;

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            influx_url: String::new(),
            influx_token: String::new(),
            influx_org: String::new(),
            influx_bucket: String::new(),
            measurement: "wind_station".to_string(),
            timeout_ms: DEFAULT_SINK_TIMEOUT_MS,
        }
    }
}

impl SinkConfig {
    /// Effective write timeout. A zero bound would fail every write, so 0
    /// falls back to the default.
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(DEFAULT_SINK_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("windlink")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl WindlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            WindlinkConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without applying env overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WINDLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&WindlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply WINDLINK_* overrides. `lookup` is `std::env::var` in production;
    /// unparseable numeric values are ignored.
    ///
    /// The receiver's older deployments set `UDP_PORT` and `INFLUX_URL`,
    /// `INFLUX_TOKEN`, `INFLUX_ORG`, `INFLUX_BUCKET`. Those names are read
    /// when the matching WINDLINK_* variable is unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let either = |key: &str, legacy: &str| lookup(key).or_else(|| lookup(legacy));

        if let Some(v) = lookup("WINDLINK_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(p) = either("WINDLINK_NETWORK__UDP_PORT", "UDP_PORT").and_then(|v| v.parse().ok())
        {
            self.network.udp_port = p;
        }
        if let Some(n) = lookup("WINDLINK_NETWORK__RECV_BUFFER_BYTES").and_then(|v| v.parse().ok())
        {
            self.network.recv_buffer_bytes = n;
        }
        if let Some(v) = lookup("WINDLINK_PROTOCOL__STRICT_LENGTH") {
            self.protocol.strict_length = v == "true" || v == "1";
        }
        if let Some(v) = either("WINDLINK_SINK__INFLUX_URL", "INFLUX_URL") {
            self.sink.influx_url = v;
        }
        if let Some(v) = either("WINDLINK_SINK__INFLUX_TOKEN", "INFLUX_TOKEN") {
            self.sink.influx_token = v;
        }
        if let Some(v) = either("WINDLINK_SINK__INFLUX_ORG", "INFLUX_ORG") {
            self.sink.influx_org = v;
        }
        if let Some(v) = either("WINDLINK_SINK__INFLUX_BUCKET", "INFLUX_BUCKET") {
            self.sink.influx_bucket = v;
        }
        if let Some(ms) = lookup("WINDLINK_SINK__TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.sink.timeout_ms = ms;
        }
        if let Some(s) = lookup("WINDLINK_STATUS__INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.status.interval_secs = s;
        }
    }

    /// Socket address string for the telemetry listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind_addr, self.network.udp_port)
    }
}
