//! Wallpad Gateway: schema-driven protocol engine for RS-485 wallpad panels
//!
//! This library translates between a pub/sub message bus and the 8-byte hex
//! frames spoken by apartment wallpad panels. Frame layouts are not fixed in
//! code but come from a declarative device schema, so new device layouts can
//! be loaded and swapped at runtime.
pub mod bus;
pub mod core;
pub mod discovery;
pub mod engine;
pub mod protocol;
pub mod schema;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, GatewayConfig, Intent, Result, StateUpdate};
pub use crate::engine::{Engine, EngineChannels};
pub use crate::protocol::Frame;
pub use crate::schema::DeviceRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
