//! Server-to-client stream events.

use serde_json::Value;

/// Kind of event pushed down an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Buffered JSON-RPC envelope; carries a sequence id.
    Message,
    /// Idle-connection filler; never buffered, never replayed.
    Keepalive,
}

/// One event emitted on a session's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Per-session sequence number starting at 1; `0` for keepalives.
    pub sequence_id: u64,
    /// Event kind.
    pub kind: EventKind,
    /// JSON-RPC envelope for messages, `Null` for keepalives.
    pub payload: Value,
}

impl Event {
    /// Buffered message event.
    #[must_use]
    pub fn message(sequence_id: u64, payload: Value) -> Self {
        Self {
            sequence_id,
            kind: EventKind::Message,
            payload,
        }
    }

    /// Unbuffered keepalive.
    #[must_use]
    pub fn keepalive() -> Self {
        Self {
            sequence_id: 0,
            kind: EventKind::Keepalive,
            payload: Value::Null,
        }
    }
}
