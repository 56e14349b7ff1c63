//! Hardware quirks the schema format cannot express
//!
//! Each variant is a named exception layered above the generic codec path.

use crate::core::{DeviceKind, Error, PacketKind, Result, PAYLOAD_LEN};
use crate::schema::{DeviceRegistry, DeviceSpec, FieldName};
use super::frame::Frame;
use super::packet::{Action, DecodedField, DecodedPacket, FieldValue};

/// Fixed bytes of an elevator call, as captured from real panels
const EV_CALL_SIGNATURE: [(usize, u8); 3] = [(2, 0x01), (4, 0x08), (5, 0x15)];

/// Device types with hand-written handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Elevator call: no `deviceId`, fixed trailer bytes, and a command
    /// header that collides with the light breaker's state header
    EvCall,
    /// Gas valve: can be closed remotely but never opened
    GasShutoff,
}

impl Quirk {
    pub fn for_kind(kind: DeviceKind) -> Option<Quirk> {
        match kind {
            DeviceKind::Ev => Some(Quirk::EvCall),
            DeviceKind::Gas => Some(Quirk::GasShutoff),
            _ => None,
        }
    }

    /// Whether the expected-state predictor has a rule for this device type
    pub fn allows_prediction(kind: DeviceKind) -> bool {
        !matches!(Quirk::for_kind(kind), Some(Quirk::EvCall))
    }
}

/// Encodes quirky commands; `None` hands the intent to the generic path
pub(crate) fn encode_override(
    device: &DeviceSpec,
    action: &Action,
    value: &str,
) -> Option<Result<Frame>> {
    match Quirk::for_kind(device.kind)? {
        Quirk::EvCall => Some(encode_ev_call(device, action, value)),
        Quirk::GasShutoff => {
            if *action == Action::Power && !value.eq_ignore_ascii_case("OFF") {
                Some(Err(Error::value(format!(
                    "gas valve can only be closed remotely, got {:?}",
                    value
                ))))
            } else {
                None
            }
        }
    }
}

fn encode_ev_call(device: &DeviceSpec, action: &Action, value: &str) -> Result<Frame> {
    if *action != Action::Power {
        return Err(Error::schema(format!("EV has no action {:?}", action.as_str())));
    }
    if !value.eq_ignore_ascii_case("ON") {
        return Err(Error::value(format!("an elevator call can only be placed (ON), got {:?}", value)));
    }

    let command = device.require(PacketKind::Command)?;
    let power = command
        .field(&FieldName::Power)
        .ok_or_else(|| Error::schema("EV command has no power field"))?;
    let byte = power
        .encode_symbol("ON")
        .ok_or_else(|| Error::value("EV command power field has no ON encoding"))?;

    let index = power.payload_index(device.kind)?;
    if EV_CALL_SIGNATURE.iter().any(|&(position, _)| position == index) {
        return Err(Error::schema(format!(
            "EV power field at byte {} overlaps the call signature",
            index
        )));
    }

    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = command.header;
    payload[index] = byte;
    for (position, byte) in EV_CALL_SIGNATURE {
        payload[position] = byte;
    }
    Ok(Frame::from_payload(payload))
}

/// Recognises our own elevator call echoed back on the bus
///
/// Without this the echo would decode as whichever device owns the colliding
/// state header.
pub(crate) fn recognize_echo(registry: &DeviceRegistry, frame: &Frame) -> Option<DecodedPacket> {
    let ev = registry.device(DeviceKind::Ev)?;
    let command = ev.packet(PacketKind::Command)?;
    if frame.header() != command.header {
        return None;
    }
    let payload = frame.payload();
    if !EV_CALL_SIGNATURE.iter().all(|(position, byte)| payload[*position] == *byte) {
        return None;
    }

    let fields = command
        .fields
        .iter()
        .filter(|field| field.in_payload())
        .map(|field| {
            let raw = payload[field.position as usize];
            DecodedField {
                name: field.name.clone(),
                value: field
                    .decode_byte(raw)
                    .map(|symbol| FieldValue::Symbol(symbol.to_string()))
                    .unwrap_or(FieldValue::Unknown(raw)),
            }
        })
        .collect();

    Some(DecodedPacket {
        device: DeviceKind::Ev,
        kind: PacketKind::Command,
        device_id: None,
        fields,
    })
}
