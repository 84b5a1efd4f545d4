//! External message-handling seam and the built-in protocol handler.
//!
//! The transport core never interprets method names itself: every routed
//! request, notification and client response is handed to a
//! [`MessageHandler`]. [`BuiltinHandler`] covers the protocol housekeeping
//! methods (`initialize`, `ping`, `tools/list`) so the server is usable on
//! its own; deployments plug their business logic in by implementing the
//! trait.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};
use tracing::debug;

use crate::models::message::{JsonRpcError, OutboundMessage, Response};

/// Boxed future returned by handler methods.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Protocol version answered when the client does not offer one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC code for bad parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC code for a handler-side failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Per-message context handed to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Session the message arrived on.
    pub session_id: String,
    /// Value of the `MCP-Protocol-Version` header, if any.
    pub protocol_version: Option<String>,
}

/// Failure raised by a handler while processing a request.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
}

impl HandlerError {
    /// Unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    /// Parameters failed validation.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    /// Handler-side failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler: {} ({})", self.message, self.code)
    }
}

impl std::error::Error for HandlerError {}

impl From<HandlerError> for JsonRpcError {
    fn from(err: HandlerError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Business logic invoked by the router.
pub trait MessageHandler: Send + Sync + 'static {
    /// Process a request and produce its result.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] which the router turns into a JSON-RPC
    /// error response.
    fn handle_request(
        &self,
        ctx: RequestContext,
        method: String,
        params: Option<Value>,
    ) -> HandlerFuture<'_, std::result::Result<Value, HandlerError>>;

    /// Process a notification. A returned message is emitted on the stream.
    fn handle_notification(
        &self,
        _ctx: RequestContext,
        _method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Option<OutboundMessage>> {
        Box::pin(async { None })
    }

    /// Process a client response to a server-initiated request.
    fn handle_response(&self, _ctx: RequestContext, _response: Response) -> HandlerFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Handler answering the protocol housekeeping methods.
#[derive(Debug, Clone)]
pub struct BuiltinHandler {
    server_name: String,
    server_version: String,
}

impl BuiltinHandler {
    /// Create a handler advertising `server_name` / `server_version`.
    #[must_use]
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        // The offered version is echoed back, never negotiated.
        let version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.server_name, "version": self.server_version },
        })
    }
}

impl MessageHandler for BuiltinHandler {
    fn handle_request(
        &self,
        ctx: RequestContext,
        method: String,
        params: Option<Value>,
    ) -> HandlerFuture<'_, std::result::Result<Value, HandlerError>> {
        Box::pin(async move {
            debug!(session_id = %ctx.session_id, method, "builtin request");
            match method.as_str() {
                "initialize" => Ok(self.initialize(params.as_ref())),
                "ping" => Ok(json!({})),
                "tools/list" => Ok(json!({ "tools": [] })),
                other => Err(HandlerError::method_not_found(other)),
            }
        })
    }

    fn handle_notification(
        &self,
        ctx: RequestContext,
        method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Option<OutboundMessage>> {
        Box::pin(async move {
            debug!(session_id = %ctx.session_id, method, "builtin notification");
            None
        })
    }
}
