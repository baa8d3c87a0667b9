//! The single in-flight timer-driven activity per state (spec §3, §5, §9).
//!
//! A control task never touches Engine state directly — it only sleeps
//! (or ticks, for the attractor loop) and then posts a [`super::EngineEvent::Timer`]
//! back to the Engine's own event loop, which is the only place state is
//! ever mutated. This keeps the single-writer invariant without the
//! control task needing to borrow or lock anything.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::TimerPhase;
use super::EngineEvent;

/// A cancellable handle to one running control task, tagged with the
/// generation it was spawned for. Stale `Timer` events (from a task that
/// raced a cancellation) are dropped by comparing generations, so we never
/// need to block on the old `JoinHandle` before installing a new one.
pub struct ControlTask {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ControlTask {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancels this task. Does not wait for it to finish — cancellation is
    /// cooperative and only observed at the task's next suspension point;
    /// generation-gating in the Engine's `Timer` handler makes this safe.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// One-shot control task: sleeps `after`, then fires `phase` once.
pub fn spawn_once(
    generation: u64,
    after: Duration,
    phase: TimerPhase,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> ControlTask {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                let _ = events.send(EngineEvent::Timer { generation, phase });
            }
        }
    });
    ControlTask {
        generation,
        cancel,
        handle,
    }
}

/// Repeating control task: fires `phase` every `every`, forever, until
/// cancelled. Used only by the attractor-mode states.
pub fn spawn_repeating(
    generation: u64,
    every: Duration,
    phase: TimerPhase,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> ControlTask {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    if events.send(EngineEvent::Timer { generation, phase }).is_err() {
                        return;
                    }
                }
            }
        }
    });
    ControlTask {
        generation,
        cancel,
        handle,
    }
}

/// A no-op control task: occupies the slot (so the cancel-before-replace
/// discipline applies uniformly) but fires nothing. Used by states whose
/// control task genuinely does nothing further (`PreGameSingle`, `Playing`).
pub fn spawn_noop(generation: u64) -> ControlTask {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(async {});
    ControlTask {
        generation,
        cancel,
        handle,
    }
}
