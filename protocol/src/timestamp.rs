//! The `"%Y-%m-%d %H:%M:%S.%f"` wall-clock timestamp carried by every
//! actuator command.

use chrono::{DateTime, Local};
#[cfg(test)]
use chrono::TimeZone;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A local wall-clock timestamp formatted exactly the way the unit firmware
/// expects: `%Y-%m-%d %H:%M:%S.%f` with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActuatorTimestamp(DateTime<Local>);

impl ActuatorTimestamp {
    pub fn new(at: DateTime<Local>) -> Self {
        Self(at)
    }

    pub fn inner(&self) -> DateTime<Local> {
        self.0
    }
}

impl Serialize for ActuatorTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
    }
}

impl<'de> Deserialize<'de> for ActuatorTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let naive = chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(serde::de::Error::custom)?;
        let local = naive
            .and_local_timezone(Local)
            .single()
            .ok_or_else(|| serde::de::Error::custom("ambiguous local timestamp"))?;
        Ok(Self(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let now = Local::now();
        let ts = ActuatorTimestamp::new(now);
        let json = serde_json::to_string(&ts).unwrap();
        let back: ActuatorTimestamp = serde_json::from_str(&json).unwrap();
        // Microsecond precision, so compare at that resolution.
        assert_eq!(back.inner().timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn formats_with_microseconds() {
        let at = Local.with_ymd_and_hms(2026, 7, 29, 10, 30, 0).unwrap();
        let ts = ActuatorTimestamp::new(at);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-07-29 10:30:00.000000\"");
    }
}
