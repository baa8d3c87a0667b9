//! Wire types shared between the gamemaster coordinator and its collaborators:
//! the button units (over a message-framed WebSocket) and peer coordinators
//! (over plain HTTP and a message-framed notification channel).
//!
//! Every unit message is a single JSON object per frame; peer HTTP bodies
//! are single-line ASCII, as laid out in the coordinator specification.

pub mod actuator;
pub mod election;
pub mod sounds;
pub mod timestamp;
pub mod unit;

pub use actuator::{ActuatorCommand, Pattern};
pub use election::PeerMessage;
pub use timestamp::ActuatorTimestamp;
pub use unit::UnitMessage;

/// Port the unit-facing WebSocket listens on, active coordinator only.
pub const UNIT_PORT: u16 = 8001;

/// Default port for the combined peer HTTP / notification channel.
pub const DEFAULT_PEER_PORT: u16 = 8002;

/// Fixed safety margin added on top of measured latency when scheduling an
/// actuator command's `at` timestamp.
pub const SCHEDULING_MARGIN: std::time::Duration = std::time::Duration::from_millis(100);

/// Threshold below which two consecutive correct presses are treated as a
/// double-press, triggering the multiplayer transfer.
pub const PRESS_THRESHOLD_SECONDS: f64 = 2.0;

/// Timeout used for peer `/gamemaster`, `/request_gamemaster` and `/alive` probes.
pub const PEER_PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
