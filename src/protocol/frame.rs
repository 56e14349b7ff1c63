use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::core::{Error, Result, FRAME_HEX_LEN, FRAME_LEN, PAYLOAD_LEN};
use super::checksum::checksum_bytes;

/// A checksum-valid 8-byte wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Builds a frame from its payload, appending the checksum
    pub fn from_payload(payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..PAYLOAD_LEN].copy_from_slice(&payload);
        bytes[PAYLOAD_LEN] = checksum_bytes(&payload);
        Frame(bytes)
    }

    /// Parses 16 hex characters and checks the checksum
    pub fn from_hex(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.len() != FRAME_HEX_LEN {
            return Err(Error::invalid_frame(format!(
                "expected {} hex characters, got {} in {:?}",
                FRAME_HEX_LEN,
                text.len(),
                text
            )));
        }
        let mut bytes = [0u8; FRAME_LEN];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|e| Error::invalid_frame(format!("{:?}: {}", text, e)))?;

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[..PAYLOAD_LEN]);
        let expected = checksum_bytes(&payload);
        if expected != bytes[PAYLOAD_LEN] {
            return Err(Error::checksum(format!(
                "{} carries {:02X}, expected {:02X}",
                text.to_ascii_uppercase(),
                bytes[PAYLOAD_LEN],
                expected
            )));
        }
        Ok(Frame(bytes))
    }

    /// First payload byte, the dispatch key
    pub fn header(&self) -> u8 {
        self.0[0]
    }

    /// The 7 payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.0[..PAYLOAD_LEN]
    }

    pub fn checksum(&self) -> u8 {
        self.0[PAYLOAD_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for Frame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Frame::from_hex(s)
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload() {
        let frame = Frame::from_payload([0x31, 0x01, 0x01, 0, 0, 0, 0]);
        assert_eq!(frame.to_string(), "3101010000000033");
        assert_eq!(frame.header(), 0x31);
        assert_eq!(frame.checksum(), 0x33);
    }

    #[test]
    fn test_parse_accepts_lower_case() {
        let frame: Frame = "828301242000004a".parse().unwrap();
        assert_eq!(frame.payload(), &[0x82, 0x83, 0x01, 0x24, 0x20, 0x00, 0x00]);
        assert_eq!(frame.to_string(), "828301242000004A");
    }

    #[test]
    fn test_parse_rejections() {
        assert!(matches!(Frame::from_hex("8283012420"), Err(Error::InvalidFrame(_))));
        assert!(matches!(Frame::from_hex("82830124200000ZZ"), Err(Error::InvalidFrame(_))));
        assert!(matches!(Frame::from_hex("828301242000004B"), Err(Error::Checksum(_))));
    }

    #[test]
    fn test_serializes_as_hex() {
        let frame = Frame::from_payload([0x04, 0x01, 0x03, 0x24, 0, 0, 0]);
        assert_eq!(serde_json::to_string(&frame).unwrap(), r#""040103240000002C""#);
    }
}
