//! Outbound actuator commands: the things the coordinator schedules on a
//! unit's button LED, matrix LED and sound player.

use serde::{Deserialize, Serialize};

use crate::timestamp::ActuatorTimestamp;

/// Either a named effect (`"colorscroll"`, `"flash_red"`, ...) or an explicit
/// `[R, G, B]` color triple, exactly as the unit firmware expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    Named(String),
    Rgb([u8; 3]),
}

impl Pattern {
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgb([r, g, b])
    }
}

/// One actuator command, addressed to a single unit by the caller and
/// carrying the absolute wall-clock time it should take effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActuatorCommand {
    #[serde(rename = "BUTTON_LED")]
    ButtonLed {
        value: LedValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<Pattern>,
        at: ActuatorTimestamp,
    },
    #[serde(rename = "MATRIX_LED")]
    MatrixLed {
        value: LedValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<Pattern>,
        at: ActuatorTimestamp,
    },
    #[serde(rename = "SOUND")]
    Sound {
        value: SoundValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        at: ActuatorTimestamp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LedValue {
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "OFF")]
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SoundValue {
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "STOP")]
    Stop,
}

impl ActuatorCommand {
    pub fn start_button_led(pattern: Pattern, at: ActuatorTimestamp) -> Self {
        Self::ButtonLed {
            value: LedValue::Start,
            pattern: Some(pattern),
            at,
        }
    }

    pub fn stop_button_led(at: ActuatorTimestamp) -> Self {
        Self::ButtonLed {
            value: LedValue::Off,
            pattern: None,
            at,
        }
    }

    pub fn start_matrix_led(pattern: Pattern, at: ActuatorTimestamp) -> Self {
        Self::MatrixLed {
            value: LedValue::Start,
            pattern: Some(pattern),
            at,
        }
    }

    pub fn stop_matrix_led(at: ActuatorTimestamp) -> Self {
        Self::MatrixLed {
            value: LedValue::Off,
            pattern: None,
            at,
        }
    }

    pub fn play_sound(filename: String, at: ActuatorTimestamp) -> Self {
        Self::Sound {
            value: SoundValue::Start,
            filename: Some(filename),
            at,
        }
    }

    pub fn stop_sound(at: ActuatorTimestamp) -> Self {
        Self::Sound {
            value: SoundValue::Stop,
            filename: None,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    #[test]
    fn named_pattern_serializes_as_string() {
        let cmd =
            ActuatorCommand::start_button_led(Pattern::named("colorscroll"), ActuatorTimestamp::new(Local::now()));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["pattern"], serde_json::json!("colorscroll"));
        assert_eq!(json["type"], serde_json::json!("BUTTON_LED"));
        assert_eq!(json["value"], serde_json::json!("START"));
    }

    #[test]
    fn rgb_pattern_serializes_as_triple() {
        let cmd =
            ActuatorCommand::start_matrix_led(Pattern::rgb(0, 200, 0), ActuatorTimestamp::new(Local::now()));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["pattern"], serde_json::json!([0, 200, 0]));
    }

    #[test]
    fn stop_commands_omit_pattern_and_filename() {
        let cmd = ActuatorCommand::stop_sound(ActuatorTimestamp::new(Local::now()));
        let json = serde_json::to_value(&cmd).unwrap();
        assert!(json.get("filename").is_none());
        assert_eq!(json["value"], serde_json::json!("STOP"));
    }
}
