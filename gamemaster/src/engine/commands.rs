//! Actuator command bundles, grounded verbatim in the color/pattern
//! choices of the original `Unit.win` / `.lose` / `.correct_pressed` /
//! `.correct` / `.wrong` / `.stop_all` helpers, re-expressed as free
//! functions over a `&UnitHandle` instead of methods on a send-queue
//! object.

use protocol::{sounds, ActuatorCommand, Pattern};

use crate::clock::Clock;
use protocol::{ActuatorTimestamp, SCHEDULING_MARGIN};

/// `now + 100ms + latency`, the timestamping rule every command follows.
pub fn schedule_at(clock: &dyn Clock, latency_seconds: f64) -> ActuatorTimestamp {
    let latency = chrono::Duration::from_std(std::time::Duration::from_secs_f64(latency_seconds))
        .unwrap_or(chrono::Duration::zero());
    let margin = chrono::Duration::from_std(SCHEDULING_MARGIN).expect("margin fits");
    ActuatorTimestamp::new(clock.wall_now() + margin + latency)
}

/// Max latency across a set of units, for commands addressed to all of
/// them at once so they fire in sync.
pub fn max_latency(latencies: impl Iterator<Item = f64>) -> f64 {
    latencies.fold(0.0_f64, f64::max)
}

pub fn stop_all(at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    [
        ActuatorCommand::stop_button_led(at.clone()),
        ActuatorCommand::stop_matrix_led(at.clone()),
        ActuatorCommand::stop_sound(at),
    ]
}

pub fn win(at: ActuatorTimestamp, sound: String) -> [ActuatorCommand; 3] {
    [
        ActuatorCommand::start_button_led(Pattern::named("colorscroll"), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::named("colorscroll"), at.clone()),
        ActuatorCommand::play_sound(sound, at),
    ]
}

pub fn win_random(at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    win(at, sounds::random_win_sound())
}

pub fn lose(at: ActuatorTimestamp, sound: String) -> [ActuatorCommand; 3] {
    [
        ActuatorCommand::start_button_led(Pattern::named("flash_red"), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::named("swipe_red"), at.clone()),
        ActuatorCommand::play_sound(sound, at),
    ]
}

pub fn lose_random(at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    lose(at, sounds::random_lose_sound())
}

/// Cue for a press of a unit already recorded in `previous_correct`, or a
/// fresh correct press in single-player mode: green flash + a cue sound.
pub fn correct_pressed(at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    [
        ActuatorCommand::start_button_led(Pattern::rgb(0, 200, 0), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::rgb(0, 128, 0), at.clone()),
        ActuatorCommand::play_sound(sounds::random_correct_press_sound(), at),
    ]
}

/// Same cue, themed to a multiplayer player's color.
pub fn correct_pressed_multiplayer(color: (u8, u8, u8), at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    let (r, g, b) = color;
    [
        ActuatorCommand::start_button_led(Pattern::rgb(r, g, b), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::rgb(r, g, b), at.clone()),
        ActuatorCommand::play_sound(sounds::random_correct_press_sound(), at),
    ]
}

/// Lights the current `correct` target yellow.
pub fn correct(at: ActuatorTimestamp) -> [ActuatorCommand; 2] {
    [
        ActuatorCommand::start_button_led(Pattern::rgb(255, 255, 0), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::rgb(255, 205, 0), at),
    ]
}

/// Lights the current `wrong` decoy red.
pub fn wrong(at: ActuatorTimestamp) -> [ActuatorCommand; 2] {
    [
        ActuatorCommand::start_button_led(Pattern::rgb(255, 0, 0), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::rgb(180, 0, 0), at),
    ]
}

/// A held-but-ignored button gets re-lit amber while `WaitRelease`
/// dwells, per spec.
pub fn wait_release_hold(at: ActuatorTimestamp) -> [ActuatorCommand; 1] {
    [ActuatorCommand::start_button_led(Pattern::rgb(0xFF, 0xA5, 0x00), at)]
}

/// The blue "please release me" flash `WaitRelease`'s control task emits
/// once 10s have passed with buttons still held.
pub fn wait_release_flash(at: ActuatorTimestamp) -> [ActuatorCommand; 1] {
    [ActuatorCommand::start_button_led(Pattern::named("flash_blue"), at)]
}

/// Player-themed "next target" lighting for multiplayer: named button
/// pattern + named matrix swipe, keyed by whether this is player 1
/// (yellow) or player 2 (blue).
pub fn multiplayer_target(player: u8, at: ActuatorTimestamp) -> [ActuatorCommand; 2] {
    let (button_pattern, matrix_pattern) = if player == 1 {
        ("flash_yellow_player1_win", "swipe_yellow")
    } else {
        ("flash_blue_player2_win", "swipe_blue")
    };
    [
        ActuatorCommand::start_button_led(Pattern::named(button_pattern), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::named(matrix_pattern), at),
    ]
}

/// Cluster-wide "player p wins" cue: same named patterns as
/// [`multiplayer_target`] plus a random win sound.
pub fn multiplayer_win(player: u8, at: ActuatorTimestamp) -> [ActuatorCommand; 3] {
    let (button_pattern, matrix_pattern) = if player == 1 {
        ("flash_yellow_player1_win", "swipe_yellow")
    } else {
        ("flash_blue_player2_win", "swipe_blue")
    };
    [
        ActuatorCommand::start_button_led(Pattern::named(button_pattern), at.clone()),
        ActuatorCommand::start_matrix_led(Pattern::named(matrix_pattern), at.clone()),
        ActuatorCommand::play_sound(sounds::random_win_sound(), at),
    ]
}
