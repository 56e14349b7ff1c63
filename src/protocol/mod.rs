//! Wallpad protocol implementation module
//!
//! This module defines the 8-byte frame, its checksum, stream framing,
//! schema-driven packet encoding/decoding, and expected-state prediction.

pub mod checksum;
pub mod codec;
pub mod frame;
pub mod packet;
pub mod predict;
pub mod quirks;

pub use self::checksum::{append_checksum, checksum, verify};
pub use self::codec::{split_frames, HexFrameCodec};
pub use self::frame::Frame;
pub use self::packet::{Action, DecodedField, DecodedPacket, FieldValue, PacketCodec, TemperatureRange};
pub use self::predict::{predict, ExpectedState};
pub use self::quirks::Quirk;
