//! Frame checksum
//!
//! The panel sums the 14 payload nibbles in two 4-bit accumulators: the low
//! nibbles on their own, and the high nibbles plus the carry out of the low
//! sum. Each accumulator is taken mod 16 and becomes one nibble of byte 8.
//! This is the only integrity check the protocol has.

use crate::core::{Error, Result, PAYLOAD_LEN};

/// Checksum byte for a 7-byte payload
pub fn checksum_bytes(payload: &[u8; PAYLOAD_LEN]) -> u8 {
    let low: u32 = payload.iter().map(|b| (b & 0x0F) as u32).sum();
    let high: u32 = payload.iter().map(|b| (b >> 4) as u32).sum::<u32>() + low / 16;
    (((high % 16) as u8) << 4) | (low % 16) as u8
}

/// Checksum of the first 14 hex characters, as two upper-case hex digits
///
/// Fails when fewer than 14 characters are given or they are not hex.
pub fn checksum(payload_hex: &str) -> Result<String> {
    let payload = parse_payload(payload_hex)?;
    Ok(format!("{:02X}", checksum_bytes(&payload)))
}

/// The payload with its checksum appended, 16 upper-case hex characters
pub fn append_checksum(payload_hex: &str) -> Result<String> {
    let payload = parse_payload(payload_hex)?;
    Ok(format!("{}{:02X}", hex::encode_upper(payload), checksum_bytes(&payload)))
}

/// True when the 16-character frame carries a matching checksum
pub fn verify(frame_hex: &str) -> bool {
    let frame_hex = frame_hex.trim();
    if frame_hex.len() != PAYLOAD_LEN * 2 + 2 || !frame_hex.is_ascii() {
        return false;
    }
    match (parse_payload(frame_hex), u8::from_str_radix(&frame_hex[PAYLOAD_LEN * 2..], 16)) {
        (Ok(payload), Ok(expected)) => checksum_bytes(&payload) == expected,
        _ => false,
    }
}

fn parse_payload(payload_hex: &str) -> Result<[u8; PAYLOAD_LEN]> {
    let text = payload_hex.trim();
    let wanted = PAYLOAD_LEN * 2;
    if text.len() < wanted || !text.is_char_boundary(wanted) {
        return Err(Error::checksum(format!(
            "need {} hex characters, got {:?}",
            wanted, payload_hex
        )));
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    hex::decode_to_slice(&text[..wanted], &mut payload)
        .map_err(|e| Error::checksum(format!("{:?} is not hex: {}", payload_hex, e)))?;
    Ok(payload)
}
