use std::fmt;

use tracing::debug;

use crate::core::{DeviceInstance, DeviceKind, Error, PacketKind, Result, StateUpdate, PAYLOAD_LEN};
use crate::schema::{DeviceRegistry, DeviceSpec, FieldName, FieldSpec, PacketSpec};
use crate::util::{decimal_from_hex_digits, decimal_to_hex_digits};
use super::frame::Frame;
use super::quirks;

/// Intent actions the codec understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Power,
    SetTemp,
    SetSpeed,
    /// Any other action, resolved against the schema by name
    Other(String),
}

impl Action {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("power") {
            Action::Power
        } else if name.eq_ignore_ascii_case("setTemp") {
            Action::SetTemp
        } else if name.eq_ignore_ascii_case("setSpeed") {
            Action::SetSpeed
        } else {
            Action::Other(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Power => "power",
            Action::SetTemp => "setTemp",
            Action::SetSpeed => "setSpeed",
            Action::Other(name) => name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Reverse-mapped through the field's value encodings
    Symbol(String),
    /// Plain number; temperatures already converted from decimal-as-hex
    Integer(u8),
    /// A byte the schema has no meaning for
    Unknown(u8),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Symbol(symbol) => f.write_str(symbol),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Unknown(byte) => write!(f, "{:02X}", byte),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub name: FieldName,
    pub value: FieldValue,
}

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub device: DeviceKind,
    pub kind: PacketKind,
    /// Value of the `deviceId` byte, if the layout has one
    pub device_id: Option<u8>,
    /// Every other field, in byte order
    pub fields: Vec<DecodedField>,
}

impl DecodedPacket {
    /// The addressed device, when the frame names one
    pub fn instance(&self) -> Option<DeviceInstance> {
        match self.device_id {
            Some(index) if index > 0 => Some(DeviceInstance::new(self.device, index)),
            _ => None,
        }
    }

    pub fn field(&self, name: &FieldName) -> Option<&FieldValue> {
        self.fields.iter().find(|field| &field.name == name).map(|field| &field.value)
    }

    /// One state triple per field
    pub fn state_updates(&self) -> Vec<StateUpdate> {
        let Some(instance) = self.instance() else {
            return Vec::new();
        };
        let instance = instance.to_string();
        self.fields
            .iter()
            .map(|field| StateUpdate {
                instance: instance.clone(),
                field: field.name.to_string(),
                value: field.value.to_string(),
            })
            .collect()
    }
}

/// Accepted thermostat set points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureRange {
    pub min: u8,
    pub max: u8,
}

impl Default for TemperatureRange {
    fn default() -> Self {
        TemperatureRange { min: 0, max: 99 }
    }
}

impl TemperatureRange {
    /// Parses `"24"` or `"23.6"` (rounded) and range-checks it
    pub fn parse(&self, value: &str) -> Result<u8> {
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| Error::value(format!("{:?} is not a temperature", value)))?;
        if !parsed.is_finite() {
            return Err(Error::value(format!("{:?} is not a temperature", value)));
        }
        let rounded = parsed.round() as i64;
        if rounded < self.min as i64 || rounded > self.max as i64 {
            return Err(Error::ValueRange {
                value: rounded,
                min: self.min as i64,
                max: self.max as i64,
            });
        }
        Ok(rounded as u8)
    }
}

/// Schema-driven encoder and decoder over one registry snapshot
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec<'a> {
    registry: &'a DeviceRegistry,
    temperature: TemperatureRange,
}

impl<'a> PacketCodec<'a> {
    pub fn new(registry: &'a DeviceRegistry) -> Self {
        PacketCodec {
            registry,
            temperature: TemperatureRange::default(),
        }
    }

    pub fn with_temperature_range(mut self, min: u8, max: u8) -> Self {
        self.temperature = TemperatureRange { min, max };
        self
    }

    /// Encodes an intent into a command frame
    ///
    /// Fails with a schema error for an unknown device type or action, a value
    /// error when the value has no encoding, and a range error for set points
    /// outside the configured limits.
    pub fn encode(&self, kind: DeviceKind, index: u8, action: &str, value: &str) -> Result<Frame> {
        let device = self.registry.require(kind)?;
        let action = Action::parse(action);

        if let Some(result) = quirks::encode_override(device, &action, value) {
            return result;
        }

        let command = device.require(PacketKind::Command)?;
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = command.header;
        if let Some(id) = command.field(&FieldName::DeviceId) {
            payload[id.payload_index(kind)?] = index;
        }

        let target = select_target(device, command, &action, &mut payload)?;
        let byte = self.encode_value(kind, target, &action, value)?;
        payload[target.payload_index(kind)?] = byte;

        Ok(Frame::from_payload(payload))
    }

    /// Encodes a state poll for one device
    pub fn encode_state_request(&self, kind: DeviceKind, index: u8) -> Result<Frame> {
        let device = self.registry.require(kind)?;
        let request = device.require(PacketKind::StateRequest)?;
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = request.header;
        if let Some(id) = request.field(&FieldName::DeviceId) {
            payload[id.payload_index(kind)?] = index;
        }
        Ok(Frame::from_payload(payload))
    }

    /// Decodes a frame into semantic fields
    ///
    /// `Ok(None)` means no device type claims the header. State headers are
    /// tried before ack headers. When several device types share a header the
    /// first that decodes cleanly wins; a field position error only skips the
    /// device type that caused it.
    pub fn decode(&self, frame: &Frame) -> Result<Option<DecodedPacket>> {
        if let Some(echo) = quirks::recognize_echo(self.registry, frame) {
            return Ok(Some(echo));
        }

        let mut failure = None;
        for kind in [PacketKind::State, PacketKind::Ack] {
            let candidates = self.registry.match_header(kind, frame.header()).count();
            if candidates > 1 {
                debug!(%frame, %kind, candidates, "ambiguous header, taking first clean match");
            }

            for device in self.registry.match_header(kind, frame.header()) {
                match decode_packet(device, kind, frame) {
                    Ok(packet) => return Ok(Some(packet)),
                    Err(err) => {
                        debug!(%frame, device = %device.kind, error = %err, "skipping device type");
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// Parses, validates and decodes a 16-character hex frame
    pub fn decode_hex(&self, text: &str) -> Result<Option<DecodedPacket>> {
        self.decode(&Frame::from_hex(text)?)
    }

    fn encode_value(&self, kind: DeviceKind, target: &FieldSpec, action: &Action, value: &str) -> Result<u8> {
        if *action == Action::SetTemp || target.name.is_decimal_digits() {
            return decimal_to_hex_digits(self.temperature.parse(value)?);
        }
        if target.encodings.is_some() {
            return target.encode_symbol(value.trim()).ok_or_else(|| {
                Error::value(format!("{:?} has no encoding for {}.{}", value, kind, target.name))
            });
        }
        value.trim().parse::<u8>().map_err(|_| {
            Error::value(format!("{:?} is not a byte value for {}.{}", value, kind, target.name))
        })
    }
}

/// Picks the field an action writes, setting `commandType` on the way
///
/// A field named after the action wins (`power` on a light). Otherwise the
/// action must be a `commandType` symbol, and the value goes to `value`.
fn select_target<'s>(
    device: &DeviceSpec,
    command: &'s PacketSpec,
    action: &Action,
    payload: &mut [u8; PAYLOAD_LEN],
) -> Result<&'s FieldSpec> {
    let named = FieldName::parse(action.as_str());
    if !matches!(named, FieldName::DeviceId | FieldName::CommandType) {
        if let Some(field) = command.field(&named) {
            return Ok(field);
        }
    }

    if let Some(command_type) = command.field(&FieldName::CommandType) {
        if let Some(byte) = command_type.encode_symbol(action.as_str()) {
            payload[command_type.payload_index(device.kind)?] = byte;
            return command.field(&FieldName::Value).ok_or_else(|| {
                Error::schema(format!("{} command has no value field", device.kind))
            });
        }
    }

    Err(Error::schema(format!("{} has no action {:?}", device.kind, action.as_str())))
}

fn decode_packet(device: &DeviceSpec, kind: PacketKind, frame: &Frame) -> Result<DecodedPacket> {
    let packet = device.require(kind)?;
    let payload = frame.payload();

    let mut device_id = None;
    let mut fields = Vec::with_capacity(packet.fields.len());
    for field in &packet.fields {
        let raw = payload[field.payload_index(device.kind)?];
        if field.name == FieldName::DeviceId {
            device_id = Some(raw);
            continue;
        }

        let value = if field.encodings.is_some() {
            field
                .decode_byte(raw)
                .map(|symbol| FieldValue::Symbol(symbol.to_string()))
                .unwrap_or(FieldValue::Unknown(raw))
        } else if field.name.is_decimal_digits() {
            decimal_from_hex_digits(raw)
                .map(FieldValue::Integer)
                .unwrap_or(FieldValue::Unknown(raw))
        } else {
            FieldValue::Integer(raw)
        };
        fields.push(DecodedField {
            name: field.name.clone(),
            value,
        });
    }

    Ok(DecodedPacket {
        device: device.kind,
        kind,
        device_id,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::builtin().unwrap()
    }

    fn encode(kind: DeviceKind, index: u8, action: &str, value: &str) -> Result<String> {
        let registry = registry();
        PacketCodec::new(&registry)
            .with_temperature_range(5, 40)
            .encode(kind, index, action, value)
            .map(|frame| frame.to_string())
    }

    #[test]
    fn test_light_fixtures() {
        assert_eq!(encode(DeviceKind::Light, 1, "power", "ON").unwrap(), "3101010000000033");
        assert_eq!(encode(DeviceKind::Light, 1, "power", "OFF").unwrap(), "3101000000000032");
    }

    #[test]
    fn test_thermo_fixtures() {
        assert_eq!(encode(DeviceKind::Thermo, 1, "power", "ON").unwrap(), "040104810000008A");
        assert_eq!(encode(DeviceKind::Thermo, 1, "power", "OFF").unwrap(), "0401040000000009");
        assert_eq!(encode(DeviceKind::Thermo, 1, "setTemp", "24").unwrap(), "040103240000002C");
    }

    #[test]
    fn test_fan_speed_uses_command_type() {
        let frame = encode(DeviceKind::Fan, 2, "setSpeed", "high").unwrap();
        assert_eq!(&frame[..14], "78020203000000");
    }

    #[test]
    fn test_encode_errors() {
        assert!(matches!(encode(DeviceKind::Light, 1, "dim", "50"), Err(Error::Schema(_))));
        assert!(matches!(encode(DeviceKind::Light, 1, "power", "BRIGHT"), Err(Error::Value(_))));
        assert!(matches!(encode(DeviceKind::Thermo, 1, "setTemp", "hot"), Err(Error::Value(_))));
        assert!(matches!(
            encode(DeviceKind::Thermo, 1, "setTemp", "55"),
            Err(Error::ValueRange { value: 55, min: 5, max: 40 })
        ));
    }

    #[test]
    fn test_encode_missing_device_type() {
        let registry = DeviceRegistry::from_json(
            r#"{"Light": {"type": "light", "state": {"header": "B0", "structure": {}}}}"#,
        )
        .unwrap();
        let codec = PacketCodec::new(&registry);
        assert!(matches!(codec.encode(DeviceKind::Thermo, 1, "power", "ON"), Err(Error::Schema(_))));
        assert!(matches!(codec.encode(DeviceKind::Light, 1, "power", "ON"), Err(Error::Schema(_))));
    }

    #[test]
    fn test_state_request() {
        let registry = registry();
        let frame = PacketCodec::new(&registry).encode_state_request(DeviceKind::Thermo, 3).unwrap();
        assert_eq!(&frame.to_string()[..14], "02030000000000");
        assert!(matches!(
            PacketCodec::new(&registry).encode_state_request(DeviceKind::Ev, 1),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_decode_thermo_state() {
        let registry = registry();
        let packet = PacketCodec::new(&registry).decode_hex("828301242000004A").unwrap().unwrap();
        assert_eq!(packet.device, DeviceKind::Thermo);
        assert_eq!(packet.kind, PacketKind::State);
        assert_eq!(packet.device_id, Some(1));
        assert_eq!(packet.field(&FieldName::Power), Some(&FieldValue::Symbol("IDLE".into())));
        assert_eq!(packet.field(&FieldName::CurrentTemp), Some(&FieldValue::Integer(24)));
        assert_eq!(packet.field(&FieldName::TargetTemp), Some(&FieldValue::Integer(20)));
    }

    #[test]
    fn test_light_power_inverse() {
        let registry = registry();
        let codec = PacketCodec::new(&registry);
        for (index, symbol) in [(1u8, "ON"), (4, "OFF")] {
            let command = codec.encode(DeviceKind::Light, index, "power", symbol).unwrap();
            let state = crate::protocol::predict(&registry, &command).unwrap();
            let packet = codec.decode(state.frame()).unwrap().unwrap();
            assert_eq!(packet.field(&FieldName::Power), Some(&FieldValue::Symbol(symbol.into())));
            assert_eq!(packet.device_id, Some(index));
        }
    }

    #[test]
    fn test_decode_ack_and_unknown() {
        let registry = registry();
        let codec = PacketCodec::new(&registry);

        let ack = codec.decode(&Frame::from_payload([0xB1, 0x01, 0x02, 0, 0, 0, 0])).unwrap().unwrap();
        assert_eq!(ack.kind, PacketKind::Ack);
        assert_eq!(ack.instance(), Some(DeviceInstance::new(DeviceKind::Light, 2)));

        assert!(codec.decode(&Frame::from_payload([0x55, 0, 0, 0, 0, 0, 0])).unwrap().is_none());
    }

    #[test]
    fn test_unknown_symbol_and_bad_digits() {
        let registry = registry();
        let codec = PacketCodec::new(&registry);
        let packet = codec.decode(&Frame::from_payload([0x82, 0x42, 0x01, 0x2A, 0x20, 0, 0])).unwrap().unwrap();
        assert_eq!(packet.field(&FieldName::Power), Some(&FieldValue::Unknown(0x42)));
        assert_eq!(packet.field(&FieldName::CurrentTemp), Some(&FieldValue::Unknown(0x2A)));
    }

    #[test]
    fn test_field_position_error_falls_through_to_sibling() {
        let registry = DeviceRegistry::from_json(
            r#"{
                "Light": {"type": "light", "state": {"header": "B0",
                    "structure": {"9": {"name": "power"}, "2": {"name": "deviceId"}}}},
                "Outlet": {"type": "switch", "state": {"header": "B0",
                    "structure": {"1": {"name": "power", "values": {"ON": "11"}}, "2": {"name": "deviceId"}}}}
            }"#,
        )
        .unwrap();
        let codec = PacketCodec::new(&registry);

        let packet = codec.decode(&Frame::from_payload([0xB0, 0x11, 0x01, 0, 0, 0, 0])).unwrap().unwrap();
        assert_eq!(packet.device, DeviceKind::Outlet);
    }

    #[test]
    fn test_field_position_error_without_sibling() {
        let registry = DeviceRegistry::from_json(
            r#"{"Light": {"type": "light", "state": {"header": "B0",
                "structure": {"7": {"name": "power"}}}}}"#,
        )
        .unwrap();
        let codec = PacketCodec::new(&registry);
        let result = codec.decode(&Frame::from_payload([0xB0, 0x01, 0x01, 0, 0, 0, 0]));
        assert!(matches!(result, Err(Error::FieldPosition { position: 7, .. })));
    }

    #[test]
    fn test_ev_echo_is_not_breaker_state() {
        let registry = registry();
        let codec = PacketCodec::new(&registry);
        let call = codec.encode(DeviceKind::Ev, 1, "power", "ON").unwrap();
        let packet = codec.decode(&call).unwrap().unwrap();
        assert_eq!(packet.device, DeviceKind::Ev);
        assert_eq!(packet.kind, PacketKind::Command);
        assert!(packet.state_updates().is_empty());

        let breaker = codec.decode(&Frame::from_payload([0xA0, 0x01, 0x02, 0, 0, 0, 0])).unwrap().unwrap();
        assert_eq!(breaker.device, DeviceKind::LightBreaker);
    }

    #[test]
    fn test_state_updates_skip_device_id() {
        let registry = registry();
        let packet = PacketCodec::new(&registry).decode_hex("828301242000004A").unwrap().unwrap();
        let updates = packet.state_updates();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0], StateUpdate {
            instance: "Thermo1".into(),
            field: "power".into(),
            value: "IDLE".into(),
        });
        assert_eq!(updates[2].field, "targetTemp");
        assert_eq!(updates[2].value, "20");
    }
}
