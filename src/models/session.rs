//! Session state and per-session serialization.
//!
//! A [`Session`] owns its event buffer, the (at most one) stream
//! attachment and the terminal `closed` flag behind a single short-lived
//! mutex. Nothing holds that lock across an `.await`: stream writers copy
//! pending events out and release it before touching the network.
//!
//! Appends are announced on a `watch` channel carrying the latest sequence
//! number, which lets an attached dispatcher sleep until there is work.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::models::event::Event;
use crate::orchestrator::clock::Clock;
use crate::orchestrator::event_buffer::{EventBuffer, Replay};
use crate::{AppError, Result};

/// Mutable state guarded by the per-session lock.
#[derive(Debug)]
struct SessionState {
    last_activity_at: DateTime<Utc>,
    buffer: EventBuffer,
    attachment: Option<u64>,
    next_attachment: u64,
    closed: bool,
}

/// Result of a successful stream attachment.
#[derive(Debug)]
pub struct Attachment {
    /// Token identifying this attachment for a later detach.
    pub token: u64,
    /// Replayed events when a resume marker was supplied.
    pub replay: Option<Replay>,
    /// Highest sequence the attachment has already covered; live delivery
    /// continues strictly after it.
    pub cursor: u64,
}

/// Snapshot of pending work for an attached stream.
#[derive(Debug)]
pub enum Pending {
    /// Events after the cursor (possibly empty).
    Events(Vec<Event>),
    /// The session has been terminated; the stream must end.
    Closed,
}

/// Server-tracked correlation context for one client.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    appended: watch::Sender<u64>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Construct an open, detached session with an empty buffer.
    #[must_use]
    pub fn new(id: String, buffer_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let (appended, _) = watch::channel(0);
        Self {
            id,
            created_at: now,
            clock,
            state: Mutex::new(SessionState {
                last_activity_at: now,
                buffer: EventBuffer::new(buffer_capacity),
                attachment: None,
                next_attachment: 1,
                closed: false,
            }),
            appended,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Server-assigned identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the last inbound operation or stream detach.
    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.lock().last_activity_at
    }

    /// Whether the session has been terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether an event stream is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().attachment.is_some()
    }

    /// Sequence number of the most recent buffered event.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.lock().buffer.latest_sequence()
    }

    /// Record activity now.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is closed.
    pub fn touch(&self) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.closed {
            return Err(AppError::SessionNotFound(self.id.clone()));
        }
        state.last_activity_at = now;
        Ok(())
    }

    /// Append a JSON-RPC envelope to the buffer and wake the attached stream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is closed.
    pub fn append(&self, payload: Value) -> Result<u64> {
        let sequence_id = {
            let mut state = self.lock();
            if state.closed {
                return Err(AppError::SessionNotFound(self.id.clone()));
            }
            state.buffer.append(payload)
        };
        self.appended.send_modify(|latest| *latest = sequence_id);
        debug!(session_id = %self.id, sequence_id, "event buffered");
        Ok(sequence_id)
    }

    /// Emit a server-initiated notification on this session's stream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is closed.
    pub fn push_notification(&self, method: &str, params: Option<Value>) -> Result<u64> {
        let message = crate::models::message::OutboundMessage::notification(method, params);
        self.append(message.to_value())
    }

    /// Retained events newer than `last_seen`, with gap detection.
    #[must_use]
    pub fn replay_since(&self, last_seen: u64) -> Replay {
        self.lock().buffer.replay_since(last_seen)
    }

    /// Claim the single stream slot.
    ///
    /// With a resume marker the replay is computed under the same lock as
    /// the claim, so no append can fall between replay and live delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is closed, or
    /// `AppError::AlreadyAttached` if another stream holds the slot.
    pub fn attach(&self, resume_from: Option<u64>) -> Result<Attachment> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.closed {
            return Err(AppError::SessionNotFound(self.id.clone()));
        }
        if state.attachment.is_some() {
            return Err(AppError::AlreadyAttached(self.id.clone()));
        }
        let token = state.next_attachment;
        state.next_attachment += 1;
        state.attachment = Some(token);
        state.last_activity_at = now;

        let latest = state.buffer.latest_sequence();
        let (replay, cursor) = match resume_from {
            Some(last_seen) => {
                let replay = state.buffer.replay_since(last_seen);
                let cursor = replay
                    .events
                    .last()
                    .map_or(last_seen.min(latest), |event| event.sequence_id);
                (Some(replay), cursor)
            }
            None => (None, latest),
        };
        Ok(Attachment {
            token,
            replay,
            cursor,
        })
    }

    /// Release the stream slot if `token` still owns it. The buffer is kept.
    pub fn detach(&self, token: u64) {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.attachment == Some(token) {
            state.attachment = None;
            state.last_activity_at = now;
            debug!(session_id = %self.id, token, "stream detached");
        }
    }

    /// Copy events after `cursor` for delivery.
    #[must_use]
    pub fn pending_after(&self, cursor: u64) -> Pending {
        let state = self.lock();
        if state.closed {
            Pending::Closed
        } else {
            Pending::Events(state.buffer.events_after(cursor))
        }
    }

    /// Subscribe to append notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }

    /// Whether the session has been detached and quiet for longer than `idle_timeout`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        let state = self.lock();
        !state.closed && state.attachment.is_none() && now - state.last_activity_at > idle_timeout
    }

    /// Close the session when it is still idle at `now`. Returns whether it closed.
    pub fn close_if_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        {
            let mut state = self.lock();
            let idle = !state.closed
                && state.attachment.is_none()
                && now - state.last_activity_at > idle_timeout;
            if !idle {
                return false;
            }
            Self::close_locked(&mut state);
        }
        self.wake();
        true
    }

    /// Mark closed, drop the attachment and discard the buffer.
    ///
    /// Returns `false` when the session was already closed.
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            Self::close_locked(&mut state);
        }
        self.wake();
        true
    }

    fn close_locked(state: &mut SessionState) {
        state.closed = true;
        state.attachment = None;
        state.buffer.clear();
    }

    fn wake(&self) {
        // Re-send the current value so any attached dispatcher re-checks
        // state and observes the closed flag.
        self.appended.send_modify(|_| {});
    }
}
