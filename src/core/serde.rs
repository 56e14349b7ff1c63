use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    (duration.as_millis() as u64).serialize(serializer)
}

/// Deserializes Duration from whole milliseconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Parses `"B0"` / `"b0"` into `0xB0`
pub fn parse_hex_byte(text: &str) -> Result<u8, String> {
    let trimmed = text.trim();
    if trimmed.len() != 2 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("expected two hex digits, got {:?}", text));
    }
    u8::from_str_radix(trimmed, 16).map_err(|e| format!("invalid hex byte {:?}: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        settle: Duration,
    }

    #[test]
    fn test_duration_as_millis() {
        let original = Test {
            settle: Duration::from_millis(150),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"settle":150}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.settle, Duration::from_millis(150));
    }

    #[test]
    fn test_hex_byte_rejects_garbage() {
        assert_eq!(parse_hex_byte("f9"), Ok(0xF9));
        assert!(parse_hex_byte("F").is_err());
        assert!(parse_hex_byte("GG").is_err());
        assert!(parse_hex_byte("100").is_err());

        let bad = serde_json::from_str::<Test>(r#"{"settle":"soon"}"#);
        assert!(bad.is_err());
    }
}
