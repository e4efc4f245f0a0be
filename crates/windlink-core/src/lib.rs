//! windlink-core: wire format, checksum, and configuration.
//! All other windlink crates depend on this one.

pub mod config;
pub mod crc;
pub mod wire;

pub use wire::{
    decode, decode_ack, decode_with, encode_ack, AckFrame, DecodeError, LengthPolicy,
    TelemetryFrame,
};
