//! The eleven-state game state and the timer phases its control tasks fire.

use std::time::Duration;

/// The Engine's exclusive, exhaustive game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NoUnits,
    PreGameSingle,
    PreGameMultiple,
    Playing,
    PlayingAllReleased,
    WaitRelease,
    Lose,
    Win,
    PreGameMultiplayer,
    PlayingMultiplayer,
    EndMultiplayer,
    Timeout,
}

/// Which phase of a (possibly multi-step) control task fired. Each variant
/// names the state it belongs to; multi-dwell states (`Lose`, `Win`) chain
/// two phases through a second control task installed from inside the
/// first phase's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// `PreGameMultiple` / `PreGameMultiplayer` attractor tick.
    AttractorTick,
    /// `PlayingAllReleased` -> `Timeout`.
    AllReleasedTimeout,
    /// `WaitRelease` -> flash held units blue.
    WaitReleaseFlash,
    LoseStopAll,
    LoseReturn,
    WinStopAll,
    WinReturn,
    /// `Timeout` -> attract mode (single dwell, unlike Lose/Win).
    TimeoutEnd,
    /// `PreGameMultiplayer` -> `PlayingMultiplayer`.
    MultiplayerPartition,
    /// `PlayingMultiplayer` inactivity -> `Timeout`.
    MultiplayerInactivity,
    EndMultiplayerStopAll,
}

/// The durations every control task sleeps for. Production code uses
/// [`Durations::default`]; tests shrink them via [`Durations::scaled`] so
/// the suite doesn't spend real minutes waiting on attract-mode ticks.
#[derive(Debug, Clone, Copy)]
pub struct Durations {
    pub attractor_tick: Duration,
    pub all_released_timeout: Duration,
    pub wait_release_flash: Duration,
    pub lose_dwell: Duration,
    pub win_dwell: Duration,
    pub timeout_dwell: Duration,
    pub multiplayer_transition: Duration,
    pub multiplayer_inactivity: Duration,
    pub end_multiplayer_dwell: Duration,
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            attractor_tick: Duration::from_secs(10),
            all_released_timeout: Duration::from_secs(15),
            wait_release_flash: Duration::from_secs(10),
            lose_dwell: Duration::from_secs(10),
            win_dwell: Duration::from_secs(10),
            timeout_dwell: Duration::from_secs(4),
            multiplayer_transition: Duration::from_secs(1),
            multiplayer_inactivity: Duration::from_secs(15),
            end_multiplayer_dwell: Duration::from_secs(10),
        }
    }
}

impl Durations {
    /// Every duration divided by `factor`, floored at 1ms so tests still
    /// exercise the real ordering of events without waiting out attract
    /// mode in real time.
    pub fn scaled(factor: u32) -> Self {
        let shrink = |d: Duration| (d / factor).max(Duration::from_millis(1));
        let base = Self::default();
        Self {
            attractor_tick: shrink(base.attractor_tick),
            all_released_timeout: shrink(base.all_released_timeout),
            wait_release_flash: shrink(base.wait_release_flash),
            lose_dwell: shrink(base.lose_dwell),
            win_dwell: shrink(base.win_dwell),
            timeout_dwell: shrink(base.timeout_dwell),
            multiplayer_transition: shrink(base.multiplayer_transition),
            multiplayer_inactivity: shrink(base.multiplayer_inactivity),
            end_multiplayer_dwell: shrink(base.end_multiplayer_dwell),
        }
    }
}
