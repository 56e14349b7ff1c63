use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Device schema document as written on disk or sent by the config editor
///
/// Keys are device type names (`"Light"`, `"Thermo"`, ...).
pub type SchemaDocument = BTreeMap<String, DeviceEntry>;

/// One device type in a schema document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Home-automation entity class (`light`, `climate`, `fan`, `switch`, ...)
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<PacketEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PacketEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_request: Option<PacketEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<PacketEntry>,
}

/// Layout of one packet kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketEntry {
    /// Header byte as two hex digits
    pub header: String,
    /// Byte position (as a decimal string key) to field definition
    #[serde(default)]
    pub structure: BTreeMap<String, FieldEntry>,
}

/// A named field at one byte position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    /// Symbolic value to hex byte
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, String>>,
}

/// Parses a schema document from JSON
pub fn parse_document(text: &str) -> Result<SchemaDocument> {
    let document: SchemaDocument = serde_json::from_str(text)?;
    if document.is_empty() {
        return Err(Error::schema("schema document declares no device types"));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let text = r#"{
            "Light": {
                "type": "light",
                "command": {
                    "header": "31",
                    "structure": {
                        "1": {"name": "deviceId"},
                        "2": {"name": "power", "values": {"ON": "01", "OFF": "00"}}
                    }
                }
            }
        }"#;

        let document = parse_document(text).unwrap();
        let light = &document["Light"];
        assert_eq!(light.device_type, "light");
        assert!(light.state.is_none());

        let command = light.command.as_ref().unwrap();
        assert_eq!(command.header, "31");
        assert_eq!(command.structure["2"].name, "power");
        assert_eq!(command.structure["2"].values.as_ref().unwrap()["ON"], "01");
    }

    #[test]
    fn test_empty_and_malformed_documents() {
        assert!(matches!(parse_document("{}"), Err(Error::Schema(_))));
        assert!(matches!(parse_document(r#"{"Light": {}}"#), Err(Error::Json(_))));
        assert!(matches!(parse_document("not json"), Err(Error::Json(_))));
    }
}
