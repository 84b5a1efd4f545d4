//! Destinations for a request's terminal response.
//!
//! A response goes either back on the POST that carried the request
//! ([`DirectResponder`]) or, when that HTTP exchange is gone by the time the
//! handler finishes, onto the session's event stream ([`StreamResponder`]).

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::models::message::OutboundMessage;
use crate::models::session::Session;

/// Which kind of sink a responder writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderKind {
    /// The open POST response.
    Direct,
    /// The session's buffered event stream.
    Stream,
}

/// One-shot sink for a terminal message.
pub trait Responder: Send {
    /// Sink kind, for logging and routing decisions.
    fn kind(&self) -> ResponderKind;

    /// Deliver `message`.
    ///
    /// # Errors
    ///
    /// Hands the message back if the sink is gone so the caller can try
    /// another one.
    fn respond(self: Box<Self>, message: OutboundMessage)
        -> std::result::Result<(), OutboundMessage>;
}

/// Sends the response back through the waiting POST handler.
#[derive(Debug)]
pub struct DirectResponder {
    tx: oneshot::Sender<OutboundMessage>,
}

impl DirectResponder {
    /// Wrap the sending half of the POST handler's channel.
    #[must_use]
    pub fn new(tx: oneshot::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Whether the POST handler is still waiting.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Responder for DirectResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Direct
    }

    fn respond(
        self: Box<Self>,
        message: OutboundMessage,
    ) -> std::result::Result<(), OutboundMessage> {
        self.tx.send(message)
    }
}

/// Appends the response to the session's event buffer.
#[derive(Debug, Clone)]
pub struct StreamResponder {
    session: Arc<Session>,
}

impl StreamResponder {
    /// Target `session`'s stream.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Responder for StreamResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Stream
    }

    fn respond(
        self: Box<Self>,
        message: OutboundMessage,
    ) -> std::result::Result<(), OutboundMessage> {
        match self.session.append(message.to_value()) {
            Ok(sequence_id) => {
                debug!(session_id = %self.session.id(), sequence_id, "response queued on stream");
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %self.session.id(), %err, "stream delivery failed");
                Err(message)
            }
        }
    }
}

/// Pick the sink for a finished request: the POST if it is still open,
/// otherwise the stream.
#[must_use]
pub fn select(direct: DirectResponder, stream: StreamResponder) -> Box<dyn Responder> {
    if direct.is_open() {
        Box::new(direct)
    } else {
        Box::new(stream)
    }
}
