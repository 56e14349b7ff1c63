//! Core types and traits for the wallpad gateway
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod config;
pub mod error;
pub mod serde;
pub mod types;

pub use self::config::GatewayConfig;
pub use self::error::{Error, Result};
pub use self::types::{DeviceInstance, DeviceKind, Intent, PacketKind, StateUpdate};

/// Payload bytes in every frame, header included
pub const PAYLOAD_LEN: usize = 7;

/// Bytes in a frame including the checksum byte
pub const FRAME_LEN: usize = 8;

/// Hex characters in a frame on the wire
pub const FRAME_HEX_LEN: usize = FRAME_LEN * 2;
