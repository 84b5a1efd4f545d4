//! Session orchestration modules.
//!
//! Covers the session registry and lifecycle, per-session event buffering,
//! idle eviction and the time source they share.

pub mod clock;
pub mod event_buffer;
pub mod idle_sweeper;
pub mod session_store;
