//! Bounded per-session event ring used for stream resumability.
//!
//! Every appended payload receives the next sequence number (starting at 1,
//! never reused). When the ring is full the oldest entry is dropped, so a
//! resume marker pointing into the evicted region is reported as a
//! [`ReplayGap`] instead of being silently truncated.

use std::collections::VecDeque;

use serde_json::Value;

use crate::models::event::Event;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// The requested resume marker is older than the retained window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGap {
    /// Last sequence the client reported seeing.
    pub requested: u64,
    /// Oldest sequence still retained (first one replayed).
    pub oldest_retained: u64,
}

/// Events newer than a resume marker, plus the gap if one exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    /// Retained events with `sequence_id > requested`, ascending.
    pub events: Vec<Event>,
    /// Set when events between the marker and the window were evicted.
    pub gap: Option<ReplayGap>,
}

/// Append-only ring of message events.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    next_sequence: u64,
}

impl EventBuffer {
    /// Create an empty ring. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 1,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence of the most recently appended event, `0` before the first.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Sequence of the oldest retained event; equals the next sequence to be
    /// assigned when the ring is empty.
    #[must_use]
    pub fn oldest_retained(&self) -> u64 {
        self.events
            .front()
            .map_or(self.next_sequence, |event| event.sequence_id)
    }

    /// Append a message payload and return its sequence number.
    pub fn append(&mut self, payload: Value) -> u64 {
        let sequence_id = self.next_sequence;
        self.next_sequence += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event::message(sequence_id, payload));
        sequence_id
    }

    /// All retained events after `last_seen`, flagging a gap when the
    /// marker falls before the retained window.
    #[must_use]
    pub fn replay_since(&self, last_seen: u64) -> Replay {
        let oldest = self.oldest_retained();
        let gap = (last_seen.saturating_add(1) < oldest).then_some(ReplayGap {
            requested: last_seen,
            oldest_retained: oldest,
        });
        Replay {
            events: self.events_after(last_seen),
            gap,
        }
    }

    /// Retained events with `sequence_id > after`, ascending.
    #[must_use]
    pub fn events_after(&self, after: u64) -> Vec<Event> {
        // Sequence ids are contiguous inside the ring, so the start index is
        // a subtraction away.
        let oldest = self.oldest_retained();
        let skip = usize::try_from(after.saturating_add(1).saturating_sub(oldest))
            .unwrap_or(usize::MAX);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Discard every retained event. Sequence numbers are not reset.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
