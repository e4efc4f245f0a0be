//! Windlink wire format: the telemetry frame sent by sensor nodes and the
//! acknowledgment sent back by the receiver.
//!
//! These layouts are fixed by the node firmware. Every field is big-endian
//! and every frame ends with a big-endian CRC16-CCITT of the bytes before it.
//!
//! The on-wire bodies are #[repr(C)] zerocopy structs built from
//! byte-order-aware integers, so they have no padding and no alignment
//! requirement. There is no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::crc::crc16_ccitt;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Trailing checksum size, shared by both frame kinds.
pub const CHECKSUM_LEN: usize = 2;

/// Telemetry body size (everything before the checksum).
pub const TELEMETRY_BODY_LEN: usize = 19;

/// Full telemetry frame size. Anything shorter is rejected before parsing.
pub const TELEMETRY_FRAME_LEN: usize = TELEMETRY_BODY_LEN + CHECKSUM_LEN;

/// Ack body size.
pub const ACK_BODY_LEN: usize = 6;

/// Full ack frame size.
pub const ACK_FRAME_LEN: usize = ACK_BODY_LEN + CHECKSUM_LEN;

/// Message type carried by every acknowledgment.
pub const ACK_MSG_TYPE: u8 = 100;

// ── Telemetry ─────────────────────────────────────────────────────────────────

/// Telemetry body exactly as it appears on the wire.
///
/// Wire size: 19 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct TelemetryBody {
    pub node_id: u8,
    pub msg_type: u8,
    pub sequence: U32<BigEndian>,
    /// Seconds since the Unix epoch.
    pub timestamp: U32<BigEndian>,
    pub wind_avg_tenths: U16<BigEndian>,
    pub wind_gust_tenths: U16<BigEndian>,
    pub direction_degrees: U16<BigEndian>,
    pub battery_millivolts: U16<BigEndian>,
    pub flags: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(TelemetryBody, [u8; TELEMETRY_BODY_LEN]);

/// A decoded, checksum-verified telemetry frame.
///
/// No range validation is applied: `direction_degrees` is expected to be
/// 0-359 but the firmware is trusted on that, and `flags` is opaque here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub node_id: u8,
    /// Distinguishes periodic samples from other message kinds.
    pub msg_type: u8,
    /// Per-node counter. Monotonic, but wraps at `u32::MAX`.
    pub sequence: u32,
    pub timestamp: u32,
    /// Average wind speed ×10.
    pub wind_avg_tenths: u16,
    /// Gust speed ×10.
    pub wind_gust_tenths: u16,
    pub direction_degrees: u16,
    pub battery_millivolts: u16,
    pub flags: u8,
}

impl TelemetryFrame {
    /// Average wind speed in the node's physical unit.
    pub fn wind_avg(&self) -> f64 {
        f64::from(self.wind_avg_tenths) / 10.0
    }

    /// Gust speed in the node's physical unit.
    pub fn wind_gust(&self) -> f64 {
        f64::from(self.wind_gust_tenths) / 10.0
    }

    /// Timestamp in nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> u64 {
        u64::from(self.timestamp) * 1_000_000_000
    }

    /// Serialize with a trailing checksum, as a node would.
    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let body = TelemetryBody::from(self);
        seal(body.as_bytes())
    }
}

impl From<&TelemetryBody> for TelemetryFrame {
    fn from(body: &TelemetryBody) -> Self {
        Self {
            node_id: body.node_id,
            msg_type: body.msg_type,
            sequence: body.sequence.get(),
            timestamp: body.timestamp.get(),
            wind_avg_tenths: body.wind_avg_tenths.get(),
            wind_gust_tenths: body.wind_gust_tenths.get(),
            direction_degrees: body.direction_degrees.get(),
            battery_millivolts: body.battery_millivolts.get(),
            flags: body.flags,
        }
    }
}

impl From<&TelemetryFrame> for TelemetryBody {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            node_id: frame.node_id,
            msg_type: frame.msg_type,
            sequence: U32::new(frame.sequence),
            timestamp: U32::new(frame.timestamp),
            wind_avg_tenths: U16::new(frame.wind_avg_tenths),
            wind_gust_tenths: U16::new(frame.wind_gust_tenths),
            direction_degrees: U16::new(frame.direction_degrees),
            battery_millivolts: U16::new(frame.battery_millivolts),
            flags: frame.flags,
        }
    }
}

// ── Acknowledgment ────────────────────────────────────────────────────────────

/// Ack body exactly as it appears on the wire.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct AckBody {
    pub node_id: u8,
    /// Always ACK_MSG_TYPE.
    pub msg_type: u8,
    pub last_sequence: U32<BigEndian>,
}

assert_eq_size!(AckBody, [u8; ACK_BODY_LEN]);

/// A decoded acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    pub node_id: u8,
    /// Highest sequence the receiver knows for this node, which may be
    /// greater than the sequence of the frame being acknowledged.
    pub last_sequence: u32,
}

// ── Length policy ─────────────────────────────────────────────────────────────

/// How to treat telemetry datagrams longer than 21 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LengthPolicy {
    /// Checksum the whole body, parse only its first 19 bytes.
    #[default]
    Tolerant,
    /// Reject anything that is not exactly 21 bytes.
    Strict,
}

impl LengthPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            LengthPolicy::Strict
        } else {
            LengthPolicy::Tolerant
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a datagram is discarded. None of them is ever reported to the
/// sender: the protocol has no negative acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },

    #[error("frame too long for strict decoding: {len} bytes")]
    Oversized { len: usize },

    #[error("checksum mismatch: computed 0x{expected:04x}, received 0x{received:04x}")]
    ChecksumMismatch { expected: u16, received: u16 },

    #[error("unexpected message type: {0}")]
    UnexpectedMsgType(u8),
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Decode a telemetry datagram with the tolerant length policy.
pub fn decode(bytes: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    decode_with(bytes, LengthPolicy::Tolerant)
}

/// Decode a telemetry datagram.
///
/// Length is checked first, then the checksum over everything except the
/// last two bytes, then the fields are read from the first 19 bytes.
pub fn decode_with(bytes: &[u8], policy: LengthPolicy) -> Result<TelemetryFrame, DecodeError> {
    let len = bytes.len();
    if len < TELEMETRY_FRAME_LEN {
        return Err(DecodeError::TooShort { len });
    }
    if policy == LengthPolicy::Strict && len > TELEMETRY_FRAME_LEN {
        return Err(DecodeError::Oversized { len });
    }

    let body = verify(bytes)?;
    let parsed = TelemetryBody::read_from_prefix(body).ok_or(DecodeError::TooShort { len })?;
    Ok(TelemetryFrame::from(&parsed))
}

/// Build the 8-byte acknowledgment for `node_id`.
pub fn encode_ack(node_id: u8, last_sequence: u32) -> [u8; ACK_FRAME_LEN] {
    let body = AckBody {
        node_id,
        msg_type: ACK_MSG_TYPE,
        last_sequence: U32::new(last_sequence),
    };
    seal(body.as_bytes())
}

/// Decode an acknowledgment. This is the node side of the exchange.
pub fn decode_ack(bytes: &[u8]) -> Result<AckFrame, DecodeError> {
    let len = bytes.len();
    if len < ACK_FRAME_LEN {
        return Err(DecodeError::TooShort { len });
    }

    let body = verify(bytes)?;
    let parsed = AckBody::read_from_prefix(body).ok_or(DecodeError::TooShort { len })?;
    if parsed.msg_type != ACK_MSG_TYPE {
        return Err(DecodeError::UnexpectedMsgType(parsed.msg_type));
    }
    Ok(AckFrame {
        node_id: parsed.node_id,
        last_sequence: parsed.last_sequence.get(),
    })
}

/// Split off the trailing checksum and check it against the body.
/// Caller guarantees `bytes.len() >= CHECKSUM_LEN`.
fn verify(bytes: &[u8]) -> Result<&[u8], DecodeError> {
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);
    let expected = crc16_ccitt(body);
    if expected != received {
        return Err(DecodeError::ChecksumMismatch { expected, received });
    }
    Ok(body)
}

/// Copy `body` into an N-byte frame and append its checksum.
fn seal<const N: usize>(body: &[u8]) -> [u8; N] {
    debug_assert_eq!(body.len() + CHECKSUM_LEN, N);
    let mut out = [0u8; N];
    out[..N - CHECKSUM_LEN].copy_from_slice(body);
    out[N - CHECKSUM_LEN..].copy_from_slice(&crc16_ccitt(body).to_be_bytes());
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
