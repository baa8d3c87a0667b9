//! The sound catalog (spec §6): filenames relative to the coordinator's
//! working directory, indices picked uniformly within each range.

use rand::Rng;

/// Picks a random win sound, returning a `sounds/win/winN.wav` path for
/// `N` in `1..=8`.
pub fn random_win_sound() -> String {
    let n = rand::thread_rng().gen_range(1..=8);
    format!("sounds/win/win{n}.wav")
}

/// Picks a random lose sound, `N` in `1..=6`.
pub fn random_lose_sound() -> String {
    let n = rand::thread_rng().gen_range(1..=6);
    format!("sounds/lose/lose{n}.wav")
}

/// Picks a random "correct press" cue, `N` in `1..=7`.
pub fn random_correct_press_sound() -> String {
    let n = rand::thread_rng().gen_range(1..=7);
    format!("sounds/on_green_press/green-press{n}.wav")
}
