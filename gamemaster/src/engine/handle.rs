//! A handle the Engine holds per registered unit: its outbound command
//! queue and its latency estimate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use protocol::ActuatorCommand;
use tokio::sync::mpsc;

/// The Engine's view of one connected unit. Cloning is cheap (it's just the
/// sender half of the outbound channel plus a shared latency cell); the
/// session owning the receiver half lives in [`crate::unit_session`].
#[derive(Clone)]
pub struct UnitHandle {
    pub id: u64,
    outbound: mpsc::UnboundedSender<ActuatorCommand>,
    /// One-way latency estimate in microseconds, updated by the session's
    /// ping/pong measurement. Zero until a sample is available.
    latency_micros: Arc<AtomicU64>,
}

impl UnitHandle {
    pub fn new(
        id: u64,
        outbound: mpsc::UnboundedSender<ActuatorCommand>,
        latency_micros: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            outbound,
            latency_micros,
        }
    }

    /// Never blocks, never loses a command: backpressure is absorbed by the
    /// unbounded channel, per the unit session's `enqueue` contract.
    pub fn enqueue(&self, command: ActuatorCommand) {
        // The only way this fails is if the session's receiver half has
        // already been dropped (connection torn down); the Engine will
        // shortly process the matching Unregister event.
        let _ = self.outbound.send(command);
    }

    /// Last-measured one-way latency, in seconds. Zero if no sample has
    /// landed yet, per spec (report 0 if unavailable).
    pub fn latency_seconds(&self) -> f64 {
        self.latency_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_zero_latency_until_sampled() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = UnitHandle::new(1, tx, Arc::new(AtomicU64::new(0)));
        assert_eq!(handle.latency_seconds(), 0.0);
    }

    #[test]
    fn reports_sampled_latency_in_seconds() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let latency = Arc::new(AtomicU64::new(25_000));
        let handle = UnitHandle::new(1, tx, latency);
        assert!((handle.latency_seconds() - 0.025).abs() < 1e-9);
    }
}
