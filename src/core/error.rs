use std::io;
use thiserror::Error;

/// Error types for the wallpad gateway
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Checksum error: {0}")]
    Checksum(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Field position error: {device}.{field} at byte {position} is outside the payload")]
    FieldPosition {
        /// Device type whose packet spec is broken
        device: String,
        /// Field name as written in the schema
        field: String,
        /// Offending byte position
        position: u8,
    },

    #[error("Value error: {0}")]
    Value(String),

    #[error("Value {value} out of range [{min}, {max}]")]
    ValueRange {
        /// Requested value
        value: i64,
        /// Lowest accepted value
        min: i64,
        /// Highest accepted value
        max: i64,
    },

    #[error("Command {frame} dropped after {attempts} attempts")]
    QueueExhausted {
        /// Hex form of the dropped command frame
        frame: String,
        /// Number of transmissions made
        attempts: u32,
    },

    #[error("A discovery session is already running")]
    DiscoveryConflict,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Creates a new checksum error
    pub fn checksum(msg: impl Into<String>) -> Self {
        Error::Checksum(msg.into())
    }

    /// Creates a new invalid frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Error::InvalidFrame(msg.into())
    }

    /// Creates a new value error
    pub fn value(msg: impl Into<String>) -> Self {
        Error::Value(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Error::Channel(msg.into())
    }

    /// Returns true for failures confined to a single frame or queue entry.
    ///
    /// The router logs these at debug level. A misplaced schema field is not
    /// one of them: it breaks every frame of that layout.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Error::Checksum(_) | Error::InvalidFrame(_) | Error::QueueExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::schema("unknown device Sauna");
        assert!(matches!(err, Error::Schema(_)));
        assert_eq!(err.to_string(), "Schema error: unknown device Sauna");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let json_err = serde_json::from_str::<u8>("nope").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_structured_messages() {
        let err = Error::ValueRange { value: 55, min: 5, max: 40 };
        assert_eq!(err.to_string(), "Value 55 out of range [5, 40]");

        let err = Error::FieldPosition {
            device: "Light".into(),
            field: "power".into(),
            position: 9,
        };
        assert!(err.to_string().contains("Light.power at byte 9"));
    }

    #[test]
    fn test_frame_local_classification() {
        assert!(Error::checksum("bad").is_frame_local());
        assert!(Error::QueueExhausted { frame: "31".into(), attempts: 3 }.is_frame_local());
        assert!(Error::invalid_frame("short").is_frame_local());
        assert!(!Error::schema("missing").is_frame_local());
        let misplaced = Error::FieldPosition { device: "Light".into(), field: "power".into(), position: 7 };
        assert!(!misplaced.is_frame_local());
        assert!(!Error::DiscoveryConflict.is_frame_local());
    }
}
