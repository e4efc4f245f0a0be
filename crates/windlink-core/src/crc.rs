//! CRC16-CCITT as computed by the sensor node firmware.
//!
//! Polynomial 0x1021, initial register 0xFFFF, no final XOR, bytes fed
//! MSB-first. Both the telemetry decoder and the ack encoder depend on
//! bit-exact agreement with the nodes, which we do not control.

/// Generator polynomial (x^16 + x^12 + x^5 + 1).
pub const POLY: u16 = 0x1021;

/// Register value before the first byte is processed.
pub const INIT: u16 = 0xFFFF;

/// Compute the CRC16-CCITT of `data`.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc = INIT;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}
