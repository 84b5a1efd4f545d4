//! Request router: turns a decoded envelope into exactly one outcome.
//!
//! Requests run on their own task so a slow handler is not cancelled when
//! the POST that carried it goes away; the finished response is then
//! delivered through [`responder::select`]. Notifications and client
//! responses are handed off and acknowledged immediately.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, info_span, warn, Instrument};

use super::handler::{HandlerError, MessageHandler, RequestContext};
use super::responder::{self, DirectResponder, Responder, ResponderKind, StreamResponder};
use crate::models::message::{InboundMessage, OutboundMessage, Request};
use crate::models::session::Session;

/// What the HTTP layer should answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// `200` carrying this JSON-RPC response.
    Response(OutboundMessage),
    /// `202` with an empty body.
    Accepted,
}

/// Dispatches inbound envelopes to a [`MessageHandler`].
#[derive(Clone)]
pub struct Router {
    handler: Arc<dyn MessageHandler>,
    mirror_to_stream: bool,
}

impl Router {
    /// Create a router. With `mirror_to_stream`, every request's response
    /// is also appended to the session's event buffer.
    #[must_use]
    pub fn new(handler: Arc<dyn MessageHandler>, mirror_to_stream: bool) -> Self {
        Self {
            handler,
            mirror_to_stream,
        }
    }

    /// Route one message received on `session`.
    pub async fn route(
        &self,
        session: &Arc<Session>,
        ctx: RequestContext,
        message: InboundMessage,
    ) -> RouteOutcome {
        match message {
            InboundMessage::Request(request) => self.route_request(session, ctx, request).await,
            InboundMessage::Notification(note) => {
                let handler = Arc::clone(&self.handler);
                let stream = StreamResponder::new(Arc::clone(session));
                let span = info_span!("notification", session_id = %ctx.session_id, method = %note.method);
                tokio::spawn(
                    async move {
                        if let Some(reply) = handler
                            .handle_notification(ctx, note.method, note.params)
                            .await
                        {
                            let _ = Box::new(stream).respond(reply);
                        }
                    }
                    .instrument(span),
                );
                RouteOutcome::Accepted
            }
            InboundMessage::Response(response) => {
                let handler = Arc::clone(&self.handler);
                let span = info_span!("client_response", session_id = %ctx.session_id);
                tokio::spawn(
                    async move { handler.handle_response(ctx, response).await }.instrument(span),
                );
                RouteOutcome::Accepted
            }
        }
    }

    async fn route_request(
        &self,
        session: &Arc<Session>,
        ctx: RequestContext,
        request: Request,
    ) -> RouteOutcome {
        let (tx, rx) = oneshot::channel();
        let direct = DirectResponder::new(tx);
        let stream = StreamResponder::new(Arc::clone(session));
        let handler = Arc::clone(&self.handler);
        let mirror = self.mirror_to_stream;
        let request_id = request.id.clone();
        let span = info_span!(
            "request",
            session_id = %ctx.session_id,
            method = %request.method,
            id = ?request.id
        );

        tokio::spawn(
            async move {
                let Request { id, method, params } = request;
                let outcome = run_handler(handler, ctx, method, params).await;
                let message = match outcome {
                    Ok(result) => OutboundMessage::result(id, result),
                    Err(err) => {
                        debug!(code = err.code, message = %err.message, "handler failure");
                        OutboundMessage::error(id, err.into())
                    }
                };
                deliver(direct, stream, mirror, message);
            }
            .instrument(span),
        );

        // The sender is only dropped unsent if the delivery task itself
        // died; the caller still gets its one terminal response.
        let message = rx.await.unwrap_or_else(|_| {
            error!("request task ended without a response");
            OutboundMessage::error(request_id, HandlerError::internal("internal error").into())
        });
        RouteOutcome::Response(message)
    }
}

/// Run the handler on its own task so a panic becomes an internal error
/// instead of tearing down the router task.
async fn run_handler(
    handler: Arc<dyn MessageHandler>,
    ctx: RequestContext,
    method: String,
    params: Option<serde_json::Value>,
) -> std::result::Result<serde_json::Value, HandlerError> {
    let task = tokio::spawn(async move { handler.handle_request(ctx, method, params).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "handler task failed");
            Err(HandlerError::internal("internal error"))
        }
    }
}

fn deliver(
    direct: DirectResponder,
    stream: StreamResponder,
    mirror: bool,
    message: OutboundMessage,
) {
    if mirror {
        let _ = Box::new(stream.clone()).respond(message.clone());
    }
    let responder = responder::select(direct, stream.clone());
    let kind = responder.kind();
    if kind == ResponderKind::Stream && mirror {
        // Already on the stream.
        return;
    }
    if let Err(message) = responder.respond(message) {
        if kind == ResponderKind::Direct && !mirror {
            warn!("direct channel closed before response; falling back to stream");
            let _ = Box::new(stream).respond(message);
        }
    }
}
