use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Runtime configuration for the gateway engine
///
/// Durations are written as milliseconds in JSON. Missing fields take their
/// defaults, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Period of the shared queue/health tick
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub tick_interval: Duration,
    /// Bus silence required before a queued frame may be transmitted
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub settle_threshold: Duration,
    /// Transmissions per command before it is dropped
    pub max_attempts: u32,
    /// Retire queued commands early once their predicted state is seen
    pub track_expected_state: bool,
    /// Sightings of the predicted state needed to retire a command
    pub expected_state_matches: u32,
    /// Bus silence after which the adapter is considered hung
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub reboot_threshold: Duration,
    /// Whether the health monitor may reboot the adapter
    pub auto_reboot: bool,
    /// Length of a discovery session
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub discovery_window: Duration,
    /// Lowest accepted thermostat set point
    pub min_temperature: u8,
    /// Highest accepted thermostat set point
    pub max_temperature: u8,
    /// Capacity of the outbound frame and state channels
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            tick_interval: Duration::from_millis(10),
            settle_threshold: Duration::from_millis(150),
            max_attempts: 12,
            track_expected_state: true,
            expected_state_matches: 1,
            reboot_threshold: Duration::from_secs(10),
            auto_reboot: false,
            discovery_window: Duration::from_secs(20),
            min_temperature: 5,
            max_temperature: 40,
            channel_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Parses and validates a JSON configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: GatewayConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick interval must be non-zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("max attempts must be at least 1"));
        }
        if self.expected_state_matches == 0 {
            return Err(Error::config("expected state matches must be at least 1"));
        }
        if self.reboot_threshold <= self.settle_threshold {
            return Err(Error::config("reboot threshold must exceed the settle threshold"));
        }
        if self.min_temperature > self.max_temperature {
            return Err(Error::config("min temperature is above max temperature"));
        }
        // Set points travel as two decimal digits.
        if self.max_temperature > 99 {
            return Err(Error::config("max temperature must fit in two decimal digits"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::config("channel capacity must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settle_threshold, Duration::from_millis(150));
        assert!(!config.auto_reboot);
    }

    #[test]
    fn test_partial_document() {
        let config = GatewayConfig::from_json(r#"{"max_attempts": 3, "reboot_threshold": 30000}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.reboot_threshold, Duration::from_secs(30));
        assert_eq!(config.tick_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            GatewayConfig::from_json(r#"{"max_attempts": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            GatewayConfig::from_json(r#"{"min_temperature": 30, "max_temperature": 20}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            GatewayConfig::from_json(r#"{"reboot_threshold": 100}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(GatewayConfig::from_json("[1, 2]"), Err(Error::Json(_))));
    }

    #[test]
    fn test_round_trip_keeps_millis() {
        let config = GatewayConfig {
            settle_threshold: Duration::from_millis(200),
            ..Default::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains(r#""settle_threshold":200"#));
        assert_eq!(GatewayConfig::from_json(&text).unwrap(), config);
    }
}
