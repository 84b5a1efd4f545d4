//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// JSON-RPC error code for a body that is not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC error code for a structurally invalid envelope.
pub const INVALID_REQUEST: i64 = -32600;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system, socket or other I/O failure.
    Io(String),
    /// Request body is not valid JSON.
    Parse(String),
    /// Envelope failed JSON-RPC schema validation.
    MalformedMessage(String),
    /// A POST or DELETE arrived without an `Mcp-Session-Id` header.
    SessionRequired,
    /// Session identifier is unknown or the session was already closed.
    SessionNotFound(String),
    /// A second event stream was requested for a session that already has one.
    AlreadyAttached(String),
    /// Caller failed the injected authorization predicate.
    Unauthorized(String),
}

impl AppError {
    /// HTTP status the error surfaces as at the transport boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse(_) | Self::MalformedMessage(_) | Self::SessionRequired => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyAttached(_) => StatusCode::CONFLICT,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error code for codec failures, `None` for everything else.
    #[must_use]
    pub fn jsonrpc_code(&self) -> Option<i64> {
        match self {
            Self::Parse(_) => Some(PARSE_ERROR),
            Self::MalformedMessage(_) => Some(INVALID_REQUEST),
            _ => None,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::MalformedMessage(msg) => write!(f, "malformed message: {msg}"),
            Self::SessionRequired => write!(f, "session required: missing Mcp-Session-Id header"),
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::AlreadyAttached(id) => write!(f, "already attached: {id}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self.jsonrpc_code() {
            // Codec failures answer with a JSON-RPC error object; the
            // request id is unknown at that point.
            Some(code) => json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": code, "message": self.to_string() },
            }),
            None => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
