use tracing::{debug, trace, warn};

use crate::core::{DeviceInstance, Error, GatewayConfig, Intent, PacketKind, Result};
use crate::protocol::{predict, DecodedPacket, ExpectedState, Frame, PacketCodec};
use crate::schema::DeviceRegistry;

/// What one inbound candidate turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Device state, to be published
    State { frame: Frame, packet: DecodedPacket },
    /// Acks and echoes of our own commands; logged, never published
    Other { frame: Frame, packet: DecodedPacket },
    /// Valid frame with a header no device type claims
    Unknown(Frame),
    /// Failed validation or decoding
    Rejected,
}

impl Inbound {
    /// The validated frame, if there is one
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Inbound::State { frame, .. } | Inbound::Other { frame, .. } | Inbound::Unknown(frame) => Some(frame),
            Inbound::Rejected => None,
        }
    }
}

/// Validates and decodes one 16-character candidate
///
/// Never fails: garbled input is the normal case on a shared bus, so every
/// failure is logged here and reported as `Rejected`.
pub fn classify(registry: &DeviceRegistry, candidate: &str) -> Inbound {
    let frame = match Frame::from_hex(candidate) {
        Ok(frame) => frame,
        Err(e) => {
            log_rejected(candidate, &e);
            return Inbound::Rejected;
        }
    };

    match PacketCodec::new(registry).decode(&frame) {
        Ok(Some(packet)) if packet.kind == PacketKind::State => Inbound::State { frame, packet },
        Ok(Some(packet)) => {
            trace!(%frame, device = %packet.device, kind = %packet.kind, "non-state frame");
            Inbound::Other { frame, packet }
        }
        Ok(None) => {
            debug!(%frame, "no device type for header");
            Inbound::Unknown(frame)
        }
        Err(e) => {
            log_rejected(&frame.to_string(), &e);
            Inbound::Rejected
        }
    }
}

// Line noise is routine; anything else means the schema does not fit the bus.
fn log_rejected(frame: &str, error: &Error) {
    if error.is_frame_local() {
        debug!(frame, %error, "discarding frame");
    } else {
        warn!(frame, %error, "schema layout does not fit the frame");
    }
}

/// An intent ready to be queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedIntent {
    pub instance: DeviceInstance,
    pub command: Frame,
    /// Present when expected-state tracking is on and a rule exists
    pub expected_state: Option<ExpectedState>,
}

/// Resolves an intent into a command frame and its expected state
pub fn route_intent(registry: &DeviceRegistry, config: &GatewayConfig, intent: &Intent) -> Result<RoutedIntent> {
    let instance: DeviceInstance = intent.instance.parse()?;
    let command = PacketCodec::new(registry)
        .with_temperature_range(config.min_temperature, config.max_temperature)
        .encode(instance.kind, instance.index, &intent.action, &intent.value)?;

    let expected_state = if config.track_expected_state {
        predict(registry, &command)
    } else {
        None
    };

    Ok(RoutedIntent {
        instance,
        command,
        expected_state,
    })
}
