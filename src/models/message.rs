//! JSON-RPC 2.0 envelope types exchanged over POST and the event stream.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Protocol version tag every envelope must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: JSON-RPC allows integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Terminal outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Successful result payload.
    Result(Value),
    /// Failure payload.
    Error(JsonRpcError),
}

/// Client request: has both `id` and `method`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier echoed in the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Positional or named parameters.
    pub params: Option<Value>,
}

/// Client notification: has `method` but no `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Positional or named parameters.
    pub params: Option<Value>,
}

/// Client response to a server-initiated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the server request being answered; `None` for `null`.
    pub id: Option<RequestId>,
    /// Result or error.
    pub outcome: Outcome,
}

/// A decoded client-to-server envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Expects exactly one terminal response.
    Request(Request),
    /// Fire-and-forget; acknowledged with `202`.
    Notification(Notification),
    /// Answer to a server-initiated request; acknowledged with `202`.
    Response(Response),
}

impl InboundMessage {
    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(note) => Some(&note.method),
            Self::Response(_) => None,
        }
    }
}

/// A server-to-client envelope, sent as a POST body or a stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Terminal response to a client request.
    Response(Response),
    /// Server-initiated notification.
    Notification(Notification),
}

impl OutboundMessage {
    /// Successful response for `id`.
    #[must_use]
    pub fn result(id: RequestId, result: Value) -> Self {
        Self::Response(Response {
            id: Some(id),
            outcome: Outcome::Result(result),
        })
    }

    /// Error response for `id`.
    #[must_use]
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self::Response(Response {
            id: Some(id),
            outcome: Outcome::Error(error),
        })
    }

    /// Server-initiated notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Render as a JSON-RPC wire object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
        match self {
            Self::Response(resp) => {
                map.insert(
                    "id".into(),
                    resp.id.as_ref().map_or(Value::Null, |id| json!(id)),
                );
                match &resp.outcome {
                    Outcome::Result(value) => {
                        map.insert("result".into(), value.clone());
                    }
                    Outcome::Error(err) => {
                        map.insert("error".into(), json!(err));
                    }
                }
            }
            Self::Notification(note) => {
                map.insert("method".into(), json!(note.method));
                if let Some(params) = &note.params {
                    map.insert("params".into(), params.clone());
                }
            }
        }
        Value::Object(map)
    }
}
