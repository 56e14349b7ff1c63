//! Expected-state prediction
//!
//! Synthesises the state frame a device should emit after acting on a
//! command. The result is only used to recognise that a response to the
//! command arrived, so it records which payload bytes the command actually
//! determines and matching looks at those alone. Fields the command says
//! nothing about (a thermostat's temperatures after a power command, a fan's
//! speed after a power command) are left out of the comparison.
//!
//! For set-point commands the current temperature is assumed to equal the
//! target and the power field is assumed on. Both are written into the frame
//! but not confirmed, since a thermostat that reached its target reports
//! idle and its own measured temperature.

use tracing::trace;

use crate::core::{PacketKind, PAYLOAD_LEN};
use crate::schema::{DeviceRegistry, DeviceSpec, FieldName, PacketSpec};
use super::frame::Frame;
use super::packet::Action;
use super::quirks::Quirk;

/// Predicted state frame plus the payload bytes that confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    frame: Frame,
    /// Bit `i` set when payload byte `i` takes part in matching
    mask: u8,
}

impl ExpectedState {
    /// Expectation that every payload byte of `frame` must repeat
    pub fn exact(frame: Frame) -> Self {
        Self { frame, mask: (1 << PAYLOAD_LEN) - 1 }
    }

    /// The synthesised state frame
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Payload positions compared by [`ExpectedState::matches`], header first
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..PAYLOAD_LEN).filter(move |i| self.mask & (1 << i) != 0)
    }

    /// True when `frame` agrees on every confirmed byte
    pub fn matches(&self, frame: &Frame) -> bool {
        let (expected, actual) = (self.frame.payload(), frame.payload());
        self.positions().all(|i| expected[i] == actual[i])
    }
}

/// Expected state after `command`, or `None` when no rule applies
pub fn predict(registry: &DeviceRegistry, command: &Frame) -> Option<ExpectedState> {
    let device = registry
        .match_header(PacketKind::Command, command.header())
        .find(|device| Quirk::allows_prediction(device.kind))?;
    let command_spec = device.packet(PacketKind::Command)?;
    let state_spec = device.packet(PacketKind::State)?;

    let predicted = build_state(device, command_spec, state_spec, command.payload());
    if predicted.is_none() {
        trace!(frame = %command, device = %device.kind, "no expected state for command");
    }
    predicted
}

fn build_state(
    device: &DeviceSpec,
    command: &PacketSpec,
    state: &PacketSpec,
    payload: &[u8],
) -> Option<ExpectedState> {
    let read = |name: &FieldName| {
        let field = command.field(name)?;
        field.payload_index(device.kind).ok().map(|index| (field, payload[index]))
    };

    // Either a commandType selector plus a value byte, or a bare power field.
    let (action, value) = match read(&FieldName::CommandType) {
        Some((selector, byte)) => (Action::parse(selector.decode_byte(byte)?), read(&FieldName::Value)?),
        None => (Action::Power, read(&FieldName::Power)?),
    };
    let (value_field, value_byte) = value;

    let mut expected = [0u8; PAYLOAD_LEN];
    let mut mask = 1u8;
    expected[0] = state.header;
    let mut write = |name: &FieldName, byte: u8, confirm: bool| -> Option<()> {
        let field = state.field(name)?;
        let index = field.payload_index(device.kind).ok()?;
        expected[index] = byte;
        if confirm {
            mask |= 1 << index;
        }
        Some(())
    };
    let encoding = |name: &FieldName, symbol: &str| state.field(name)?.encode_symbol(symbol);

    if let Some((_, id)) = read(&FieldName::DeviceId) {
        write(&FieldName::DeviceId, id, true)?;
    }

    match action {
        Action::Power => {
            let symbol = value_field.decode_byte(value_byte)?;
            write(&FieldName::Power, encoding(&FieldName::Power, symbol)?, true)?;
        }
        Action::SetTemp => {
            write(&FieldName::TargetTemp, value_byte, true)?;
            write(&FieldName::CurrentTemp, value_byte, false)?;
            write(&FieldName::Power, encoding(&FieldName::Power, "ON")?, false)?;
        }
        Action::SetSpeed => {
            let symbol = value_field.decode_byte(value_byte)?;
            write(&FieldName::Speed, encoding(&FieldName::Speed, symbol)?, true)?;
            write(&FieldName::Power, encoding(&FieldName::Power, "ON")?, true)?;
        }
        Action::Other(_) => return None,
    }

    Some(ExpectedState {
        frame: Frame::from_payload(expected),
        mask,
    })
}
