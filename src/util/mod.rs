//! Utility module
//!
//! Helpers for the panel's habit of writing human-readable decimal digits
//! straight into hex nibbles (`0x24` on the wire means 24).

use crate::core::{Error, Result};

/// Reads a decimal-as-hex byte, `None` if either nibble is above 9
pub fn decimal_from_hex_digits(byte: u8) -> Option<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    if high > 9 || low > 9 {
        return None;
    }
    Some(high * 10 + low)
}

/// Writes a value in 0..=99 as decimal-as-hex
pub fn decimal_to_hex_digits(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(Error::ValueRange {
            value: value as i64,
            min: 0,
            max: 99,
        });
    }
    Ok(((value / 10) << 4) | (value % 10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_digits() {
        assert_eq!(decimal_from_hex_digits(0x24), Some(24));
        assert_eq!(decimal_from_hex_digits(0x05), Some(5));
        assert_eq!(decimal_from_hex_digits(0x2A), None);
        assert_eq!(decimal_from_hex_digits(0xA1), None);

        assert_eq!(decimal_to_hex_digits(24).unwrap(), 0x24);
        assert_eq!(decimal_to_hex_digits(99).unwrap(), 0x99);
        assert!(matches!(decimal_to_hex_digits(100), Err(Error::ValueRange { .. })));
    }
}
