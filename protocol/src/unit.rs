//! Inbound messages arriving from a connected button unit.

use serde::{Deserialize, Serialize};

/// One JSON frame sent by a unit over its WebSocket connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UnitMessage {
    #[serde(rename = "REGISTER")]
    Register { id: String },
    #[serde(rename = "BUTTON_PRESSED")]
    ButtonPressed,
    #[serde(rename = "BUTTON_RELEASED")]
    ButtonReleased,
    #[serde(rename = "UNREGISTER")]
    Unregister,
}

/// Parses the hex `id` field of a `REGISTER` message, tolerating an optional
/// `0x` prefix.
pub fn parse_unit_id(raw: &str) -> Result<u64, std::num::ParseIntError> {
    let trimmed = raw.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(trimmed, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_with_0x_prefix() {
        assert_eq!(parse_unit_id("0x1a").unwrap(), 0x1a);
    }

    #[test]
    fn parses_register_without_prefix() {
        assert_eq!(parse_unit_id("1a").unwrap(), 0x1a);
    }

    #[test]
    fn deserializes_register_message() {
        let msg: UnitMessage = serde_json::from_str(r#"{"type":"REGISTER","id":"0x1"}"#).unwrap();
        assert_eq!(
            msg,
            UnitMessage::Register {
                id: "0x1".to_string()
            }
        );
    }

    #[test]
    fn deserializes_button_events() {
        let pressed: UnitMessage = serde_json::from_str(r#"{"type":"BUTTON_PRESSED"}"#).unwrap();
        assert_eq!(pressed, UnitMessage::ButtonPressed);
        let released: UnitMessage =
            serde_json::from_str(r#"{"type":"BUTTON_RELEASED"}"#).unwrap();
        assert_eq!(released, UnitMessage::ButtonReleased);
    }

    #[test]
    fn rejects_unknown_type() {
        let result: Result<UnitMessage, _> = serde_json::from_str(r#"{"type":"BOGUS"}"#);
        assert!(result.is_err());
    }
}
