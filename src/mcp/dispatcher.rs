//! Stream dispatcher: binds one event-stream connection to a session.
//!
//! [`attach`] claims the session's single stream slot, replays buffered
//! events after the resume marker, then follows the buffer live. The
//! returned stream holds an [`AttachGuard`]; dropping the stream (client
//! disconnect, server shutdown) releases the slot while the buffer stays
//! put for a later resume.
//!
//! The session lock is taken only to copy pending events; waiting happens
//! on the session's append channel and the keepalive timer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::event::Event;
use crate::models::session::{Pending, Session};
use crate::orchestrator::event_buffer::ReplayGap;
use crate::Result;

/// Default keepalive period.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Item produced by an attached stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Legacy `endpoint` announcement.
    Endpoint(String),
    /// Legacy `session` announcement.
    SessionAnnounce(String),
    /// The resume marker was older than the retained window.
    Gap(ReplayGap),
    /// A buffered message or a keepalive.
    Event(Event),
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Interval between keepalives.
    pub keepalive: Duration,
    /// Emit legacy `endpoint` / `session` events at stream start.
    pub legacy_session_events: bool,
    /// Endpoint path announced in legacy mode.
    pub endpoint: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            legacy_session_events: false,
            endpoint: "/mcp".into(),
        }
    }
}

/// Releases the session's stream slot when dropped.
#[derive(Debug)]
pub struct AttachGuard {
    session: Arc<Session>,
    token: u64,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        self.session.detach(self.token);
        info!(session_id = %self.session.id(), "event stream closed");
    }
}

struct DispatchState {
    session: Arc<Session>,
    appended: watch::Receiver<u64>,
    cursor: u64,
    queued: VecDeque<StreamItem>,
    keepalive: Interval,
    _guard: AttachGuard,
}

/// Attach an event stream to `session`, optionally resuming after
/// `resume_from`.
///
/// # Errors
///
/// Returns `AppError::AlreadyAttached` if a stream is already live and
/// `AppError::SessionNotFound` if the session is closed.
pub fn attach(
    session: &Arc<Session>,
    resume_from: Option<u64>,
    options: &DispatchOptions,
) -> Result<BoxStream<'static, StreamItem>> {
    // Subscribe before claiming so no append between claim and first wait
    // is missed.
    let appended = session.subscribe();
    let attachment = session.attach(resume_from)?;
    let guard = AttachGuard {
        session: Arc::clone(session),
        token: attachment.token,
    };

    let mut queued = VecDeque::new();
    if options.legacy_session_events {
        queued.push_back(StreamItem::Endpoint(options.endpoint.clone()));
        queued.push_back(StreamItem::SessionAnnounce(session.id().to_owned()));
    }
    if let Some(replay) = attachment.replay {
        if let Some(gap) = replay.gap {
            warn!(
                session_id = %session.id(),
                requested = gap.requested,
                oldest_retained = gap.oldest_retained,
                "replay gap; resuming from oldest retained event"
            );
            queued.push_back(StreamItem::Gap(gap));
        }
        debug!(session_id = %session.id(), replayed = replay.events.len(), "replaying buffered events");
        queued.extend(replay.events.into_iter().map(StreamItem::Event));
    }
    info!(session_id = %session.id(), cursor = attachment.cursor, "event stream attached");

    let period = options.keepalive.max(Duration::from_millis(1));
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = DispatchState {
        session: Arc::clone(session),
        appended,
        cursor: attachment.cursor,
        queued,
        keepalive,
        _guard: guard,
    };
    Ok(stream::unfold(state, next_item).boxed())
}

async fn next_item(mut state: DispatchState) -> Option<(StreamItem, DispatchState)> {
    loop {
        if let Some(item) = state.queued.pop_front() {
            return Some((item, state));
        }

        let _ = state.appended.borrow_and_update();
        match state.session.pending_after(state.cursor) {
            Pending::Closed => return None,
            Pending::Events(events) => {
                if let Some(last) = events.last() {
                    state.cursor = last.sequence_id;
                    state
                        .queued
                        .extend(events.into_iter().map(StreamItem::Event));
                    continue;
                }
            }
        }

        tokio::select! {
            changed = state.appended.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            _ = state.keepalive.tick() => {
                return Some((StreamItem::Event(Event::keepalive()), state));
            }
        }
    }
}
