//! Process-wide session registry and lifecycle control.
//!
//! The store-wide lock only guards the id → session map and is never held
//! across I/O or while a session's own lock is taken for long. Operations
//! on different sessions therefore never contend beyond the brief map
//! lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Duration;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::models::session::Session;
use crate::orchestrator::clock::{Clock, SystemClock};
use crate::orchestrator::event_buffer::DEFAULT_CAPACITY;
use crate::{AppError, Result};

/// Registry of live sessions keyed by identifier.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    clock: Arc<dyn Clock>,
    buffer_capacity: usize,
}

impl SessionStore {
    /// Create an empty store using the wall clock.
    #[must_use]
    pub fn new(buffer_capacity: usize) -> Self {
        Self::with_clock(buffer_capacity, Arc::new(SystemClock))
    }

    /// Create an empty store driven by `clock`.
    #[must_use]
    pub fn with_clock(buffer_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            buffer_capacity,
        }
    }

    /// Clock shared with every session in the store.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a session under a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn create_session(&self) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Arc::new(Session::new(
            id.clone(),
            self.buffer_capacity,
            Arc::clone(&self.clock),
        ));
        sessions.insert(id.clone(), Arc::clone(&session));
        drop(sessions);

        info!(session_id = %id, "session created");
        session
    }

    /// Look up a live session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the id is unknown or closed.
    pub fn get_session(&self, id: &str) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_owned()))?;
        if session.is_closed() {
            return Err(AppError::SessionNotFound(id.to_owned()));
        }
        Ok(session)
    }

    /// Record activity on a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the id is unknown or closed.
    pub fn touch(&self, id: &str) -> Result<()> {
        self.get_session(id)?.touch()
    }

    /// Terminate a session: close it, end its stream and drop its buffer.
    ///
    /// Idempotent; returns whether a live session was actually closed.
    pub fn terminate(&self, id: &str) -> bool {
        let span = info_span!("terminate_session", session_id = id);
        let _guard = span.enter();

        let removed = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);
        let closed = removed.is_some_and(|session| session.close());
        if closed {
            info!("session terminated");
        }
        closed
    }

    /// Terminate every live session. Used on shutdown so open streams end.
    pub fn terminate_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = drained.iter().filter(|session| session.close()).count();
        if count > 0 {
            info!(count, "all sessions terminated");
        }
        count
    }

    /// Evict sessions that have had no attached stream and no activity for
    /// longer than `idle_timeout`. Returns the evicted identifiers.
    pub fn sweep_idle(&self, idle_timeout: Duration) -> Vec<String> {
        let now = self.clock.now();
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|session| session.is_idle(now, idle_timeout))
            .cloned()
            .collect();

        // Re-checked under each session's own lock: a stream may have
        // attached since the candidate scan.
        let evicted: Vec<String> = candidates
            .into_iter()
            .filter(|session| session.close_if_idle(now, idle_timeout))
            .map(|session| session.id().to_owned())
            .collect();

        if !evicted.is_empty() {
            let mut sessions = self
                .sessions
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for id in &evicted {
                sessions.remove(id);
                info!(session_id = %id, "idle session evicted");
            }
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
