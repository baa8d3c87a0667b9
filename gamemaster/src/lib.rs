//! Library surface for the `gamemaster` coordinator binary, split out the
//! way `breakpoint_server` separates its `lib.rs` from `main.rs` so the
//! integration test suite in `tests/` can drive the real transport and
//! engine types instead of re-implementing them.

pub mod clock;
pub mod election;
pub mod engine;
pub mod error;
pub mod transport;
pub mod unit_session;
