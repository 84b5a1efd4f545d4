//! Background eviction of idle sessions.
//!
//! Started explicitly at server boot and stopped through its cancellation
//! token on shutdown. Each tick delegates to
//! [`SessionStore::sweep_idle`], which tests can call directly with a
//! [`ManualClock`](super::clock::ManualClock) instead of waiting on timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::session_store::SessionStore;

/// Spawn the idle-sweep background task.
///
/// The task ticks every `interval` and evicts sessions that have been
/// detached and quiet for longer than `idle_timeout`.
#[must_use]
pub fn spawn_idle_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let idle_timeout = chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::MAX);
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("idle sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = store.sweep_idle(idle_timeout);
                        debug!(evicted = evicted.len(), remaining = store.len(), "idle sweep completed");
                    }
                }
            }
        }
        .instrument(info_span!("idle_sweeper")),
    )
}
