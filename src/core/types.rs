use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// The closed set of panel device types the gateway knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    Light,
    LightBreaker,
    Thermo,
    Fan,
    Outlet,
    Gas,
    #[serde(rename = "EV")]
    Ev,
}

impl DeviceKind {
    /// Every device kind, in decode dispatch order
    pub const ALL: [DeviceKind; 7] = [
        DeviceKind::Light,
        DeviceKind::LightBreaker,
        DeviceKind::Thermo,
        DeviceKind::Fan,
        DeviceKind::Outlet,
        DeviceKind::Gas,
        DeviceKind::Ev,
    ];

    /// Name used as the schema document key and instance-name prefix
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Light => "Light",
            DeviceKind::LightBreaker => "LightBreaker",
            DeviceKind::Thermo => "Thermo",
            DeviceKind::Fan => "Fan",
            DeviceKind::Outlet => "Outlet",
            DeviceKind::Gas => "Gas",
            DeviceKind::Ev => "EV",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::schema(format!("unknown device type {:?}", s)))
    }
}

/// Packet kinds a device schema may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Command,
    State,
    StateRequest,
    Ack,
}

impl PacketKind {
    /// Name used as the schema document key
    pub fn name(&self) -> &'static str {
        match self {
            PacketKind::Command => "command",
            PacketKind::State => "state",
            PacketKind::StateRequest => "state_request",
            PacketKind::Ack => "ack",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete device on the bus, e.g. `Light1` or `Thermo3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInstance {
    /// Device type
    pub kind: DeviceKind,
    /// One-based device index as carried in the `deviceId` byte
    pub index: u8,
}

impl DeviceInstance {
    /// Creates a new device instance
    pub fn new(kind: DeviceKind, index: u8) -> Self {
        DeviceInstance { kind, index }
    }
}

impl fmt::Display for DeviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.index)
    }
}

impl FromStr for DeviceInstance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| Error::schema(format!("device instance {:?} has no index", s)))?;
        let (name, digits) = trimmed.split_at(split);
        let kind: DeviceKind = name.parse()?;
        let index: u8 = digits
            .parse()
            .map_err(|_| Error::schema(format!("invalid device index in {:?}", s)))?;
        if index == 0 {
            return Err(Error::schema(format!("device index in {:?} must start at 1", s)));
        }
        Ok(DeviceInstance { kind, index })
    }
}

/// A user or automation request, e.g. `("Light1", "power", "ON")`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Device instance name
    pub instance: String,
    /// Action name (`power`, `setTemp`, `setSpeed`)
    pub action: String,
    /// Requested value in symbolic or numeric form
    pub value: String,
}

impl Intent {
    /// Creates a new intent
    pub fn new(instance: impl Into<String>, action: impl Into<String>, value: impl Into<String>) -> Self {
        Intent {
            instance: instance.into(),
            action: action.into(),
            value: value.into(),
        }
    }
}

/// A decoded semantic state triple published outward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Device instance name
    pub instance: String,
    /// Field name as written in the schema
    pub field: String,
    /// Symbolic or numeric value
    pub value: String,
}
