use std::fmt;

use tracing::warn;

use crate::core::serde::parse_hex_byte;
use crate::core::{DeviceKind, Error, PacketKind, Result, PAYLOAD_LEN};
use super::document::{parse_document, DeviceEntry, FieldEntry, PacketEntry, SchemaDocument};

/// Default device layouts shipped with the gateway
pub const BUILTIN_SCHEMA: &str = include_str!("devices.json");

/// Semantic field names with behaviour attached to them
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldName {
    DeviceId,
    Power,
    CommandType,
    Value,
    CurrentTemp,
    TargetTemp,
    Speed,
    /// A field the codec carries through without interpreting
    Other(String),
}

impl FieldName {
    /// Maps a schema field name onto the typed set
    pub fn parse(name: &str) -> Self {
        match name {
            "deviceId" => FieldName::DeviceId,
            "power" => FieldName::Power,
            "commandType" => FieldName::CommandType,
            "value" => FieldName::Value,
            "currentTemp" => FieldName::CurrentTemp,
            "targetTemp" => FieldName::TargetTemp,
            "speed" => FieldName::Speed,
            other => FieldName::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldName::DeviceId => "deviceId",
            FieldName::Power => "power",
            FieldName::CommandType => "commandType",
            FieldName::Value => "value",
            FieldName::CurrentTemp => "currentTemp",
            FieldName::TargetTemp => "targetTemp",
            FieldName::Speed => "speed",
            FieldName::Other(name) => name,
        }
    }

    /// Temperatures are written as decimal digits in hex nibbles
    pub fn is_decimal_digits(&self) -> bool {
        matches!(self, FieldName::CurrentTemp | FieldName::TargetTemp)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a packet layout
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: FieldName,
    /// Byte offset within the 7-byte payload
    pub position: u8,
    /// Symbolic value to byte, in document order
    pub encodings: Option<Vec<(String, u8)>>,
}

impl FieldSpec {
    /// Byte for a symbolic value; exact match first, then case-insensitive
    pub fn encode_symbol(&self, symbol: &str) -> Option<u8> {
        let encodings = self.encodings.as_ref()?;
        encodings
            .iter()
            .find(|(name, _)| name == symbol)
            .or_else(|| encodings.iter().find(|(name, _)| name.eq_ignore_ascii_case(symbol)))
            .map(|(_, byte)| *byte)
    }

    /// Symbol registered for a byte, first registration wins
    pub fn decode_byte(&self, byte: u8) -> Option<&str> {
        self.encodings
            .as_ref()?
            .iter()
            .find(|(_, value)| *value == byte)
            .map(|(name, _)| name.as_str())
    }

    /// Whether the position lies inside the payload
    pub fn in_payload(&self) -> bool {
        (self.position as usize) < PAYLOAD_LEN
    }

    /// Payload index for reading or writing this field
    ///
    /// Fails with a field position error naming the device type when the
    /// schema put the field past the payload.
    pub fn payload_index(&self, device: DeviceKind) -> Result<usize> {
        if !self.in_payload() {
            return Err(Error::FieldPosition {
                device: device.to_string(),
                field: self.name.to_string(),
                position: self.position,
            });
        }
        Ok(self.position as usize)
    }
}

/// Layout of one packet kind for one device type
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSpec {
    pub header: u8,
    pub fields: Vec<FieldSpec>,
}

impl PacketSpec {
    /// Looks up a field by name
    pub fn field(&self, name: &FieldName) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| &field.name == name)
    }
}

/// All packet layouts of one device type
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    /// Entity class from the schema `type` key
    pub type_name: String,
    command: Option<PacketSpec>,
    state: Option<PacketSpec>,
    state_request: Option<PacketSpec>,
    ack: Option<PacketSpec>,
}

impl DeviceSpec {
    /// Layout for a packet kind, if the device declares one
    pub fn packet(&self, kind: PacketKind) -> Option<&PacketSpec> {
        match kind {
            PacketKind::Command => self.command.as_ref(),
            PacketKind::State => self.state.as_ref(),
            PacketKind::StateRequest => self.state_request.as_ref(),
            PacketKind::Ack => self.ack.as_ref(),
        }
    }

    /// Layout for a packet kind, or a schema error naming what is missing
    pub fn require(&self, kind: PacketKind) -> Result<&PacketSpec> {
        self.packet(kind).ok_or_else(|| {
            Error::schema(format!("{} has no {} packet in the schema", self.kind, kind))
        })
    }
}

/// Typed, validated view of a schema document
///
/// Built once per load; a reload builds a fresh registry and swaps it in
/// through [`super::SchemaStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistry {
    devices: Vec<DeviceSpec>,
}

impl DeviceRegistry {
    /// Registry for the built-in device layouts
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SCHEMA)
    }

    /// Parses and validates a JSON schema document
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_document(&parse_document(text)?)
    }

    /// Validates a parsed document and builds the typed registry
    pub fn from_document(document: &SchemaDocument) -> Result<Self> {
        let mut devices = Vec::with_capacity(document.len());
        for (name, entry) in document {
            let kind: DeviceKind = name.parse()?;
            devices.push(build_device(kind, entry)?);
        }
        // Decode dispatch walks devices in declaration order, not document order.
        devices.sort_by_key(|device| device.kind);

        let registry = DeviceRegistry { devices };
        registry.warn_on_ambiguous_headers(PacketKind::State);
        registry.warn_on_ambiguous_headers(PacketKind::Ack);
        registry.warn_on_ambiguous_headers(PacketKind::Command);
        Ok(registry)
    }

    /// Spec of one device type
    pub fn device(&self, kind: DeviceKind) -> Option<&DeviceSpec> {
        self.devices.iter().find(|device| device.kind == kind)
    }

    /// Spec of one device type, or a schema error
    pub fn require(&self, kind: DeviceKind) -> Result<&DeviceSpec> {
        self.device(kind)
            .ok_or_else(|| Error::schema(format!("device type {} is not in the schema", kind)))
    }

    /// All device specs in dispatch order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceSpec> {
        self.devices.iter()
    }

    /// Devices whose `kind` packet carries this header, in dispatch order
    pub fn match_header(&self, kind: PacketKind, header: u8) -> impl Iterator<Item = &DeviceSpec> {
        self.devices
            .iter()
            .filter(move |device| device.packet(kind).map_or(false, |packet| packet.header == header))
    }

    fn warn_on_ambiguous_headers(&self, kind: PacketKind) {
        for (i, device) in self.devices.iter().enumerate() {
            let Some(packet) = device.packet(kind) else { continue };
            for other in &self.devices[i + 1..] {
                if other.packet(kind).map_or(false, |p| p.header == packet.header) {
                    warn!(
                        header = format_args!("{:02X}", packet.header),
                        first = %device.kind,
                        second = %other.kind,
                        "{} header shared by two device types, first wins",
                        kind
                    );
                }
            }
        }
    }
}

fn build_device(kind: DeviceKind, entry: &DeviceEntry) -> Result<DeviceSpec> {
    let build = |packet: &Option<PacketEntry>, packet_kind: PacketKind| {
        packet
            .as_ref()
            .map(|packet| build_packet(kind, packet_kind, packet))
            .transpose()
    };

    Ok(DeviceSpec {
        kind,
        type_name: entry.device_type.clone(),
        command: build(&entry.command, PacketKind::Command)?,
        state: build(&entry.state, PacketKind::State)?,
        state_request: build(&entry.state_request, PacketKind::StateRequest)?,
        ack: build(&entry.ack, PacketKind::Ack)?,
    })
}

fn build_packet(kind: DeviceKind, packet_kind: PacketKind, entry: &PacketEntry) -> Result<PacketSpec> {
    let context = |what: String| Error::schema(format!("{}.{}: {}", kind, packet_kind, what));

    let header = parse_hex_byte(&entry.header).map_err(|e| context(format!("header {}", e)))?;

    let mut fields: Vec<FieldSpec> = Vec::with_capacity(entry.structure.len());
    for (position, field) in &entry.structure {
        let position: u8 = position
            .trim()
            .parse()
            .map_err(|_| context(format!("position {:?} is not a byte offset", position)))?;
        let spec = build_field(position, field).map_err(context)?;

        if fields.iter().any(|existing| existing.name == spec.name) {
            return Err(context(format!("field {} declared twice", spec.name)));
        }
        // Kept so sibling device types still decode; this one fails at use.
        if !spec.in_payload() {
            warn!(
                device = %kind,
                packet = %packet_kind,
                field = %spec.name,
                position,
                "field position outside the 7-byte payload"
            );
        }
        fields.push(spec);
    }
    fields.sort_by_key(|field| field.position);

    Ok(PacketSpec { header, fields })
}

fn build_field(position: u8, entry: &FieldEntry) -> std::result::Result<FieldSpec, String> {
    let encodings = entry
        .values
        .as_ref()
        .map(|values| {
            values
                .iter()
                .map(|(symbol, byte)| {
                    parse_hex_byte(byte)
                        .map(|byte| (symbol.clone(), byte))
                        .map_err(|e| format!("field {} value {}: {}", entry.name, symbol, e))
                })
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(FieldSpec {
        name: FieldName::parse(&entry.name),
        position,
        encodings,
    })
}
