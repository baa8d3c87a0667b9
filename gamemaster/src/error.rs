//! Crate error types. Transport- and election-facing errors are typed so
//! callers can match on them; `main` collapses everything into `anyhow`.

use thiserror::Error;

/// Errors surfaced while servicing one unit's WebSocket connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid JSON format")]
    InvalidJson,

    #[error("connection lost")]
    ConnectionLost,
}

/// Errors from the leader-election surface. Probe/request failures are
/// non-fatal by design (spec.md §7: a peer probe failure becomes "absent"
/// in the election model, not an error) and so are represented by the
/// `Absent`/`Unreachable` outcome variants in `election.rs` rather than
/// here; this type covers the one place election failure is fatal enough
/// to propagate: notifying a successor during step-down.
#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("failed to notify successor {0}: {1}")]
    NotifyFailed(String, String),
}
