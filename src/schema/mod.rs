//! Device schema module
//!
//! A schema document describes, per device type, the header byte and field
//! layout of each packet kind. This module parses those documents, validates
//! them into a typed [`DeviceRegistry`], and keeps the active registry in a
//! [`SchemaStore`] that can be swapped at runtime.

pub mod document;
pub mod registry;
pub mod store;

pub use self::document::{parse_document, DeviceEntry, FieldEntry, PacketEntry, SchemaDocument};
pub use self::registry::{DeviceRegistry, DeviceSpec, FieldName, FieldSpec, PacketSpec, BUILTIN_SCHEMA};
pub use self::store::SchemaStore;
