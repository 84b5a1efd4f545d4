//! JSON-RPC envelope codec.
//!
//! [`decode`] classifies a raw POST body as a request, notification or
//! response and rejects anything else with [`AppError::MalformedMessage`]
//! (or [`AppError::Parse`] when the body is not JSON at all), so malformed
//! input never reaches the router.
//!
//! Field presence is checked on the raw JSON object rather than through
//! serde's `Option`, because `"id": null` and a missing `id` mean different
//! things.

use serde_json::{Map, Value};

use crate::models::message::{
    InboundMessage, JsonRpcError, Notification, OutboundMessage, Outcome, Request, RequestId,
    Response, JSONRPC_VERSION,
};
use crate::{AppError, Result};

/// Decode one JSON-RPC envelope from `bytes`.
///
/// # Errors
///
/// Returns `AppError::Parse` if the body is not JSON and
/// `AppError::MalformedMessage` if it is not a valid single envelope.
pub fn decode(bytes: &[u8]) -> Result<InboundMessage> {
    let value: Value = serde_json::from_slice(bytes)?;
    decode_value(value)
}

/// Decode one JSON-RPC envelope from an already parsed value.
///
/// # Errors
///
/// Returns `AppError::MalformedMessage` if the value is not a valid envelope.
pub fn decode_value(value: Value) -> Result<InboundMessage> {
    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => return Err(malformed("batch requests are not supported")),
        _ => return Err(malformed("envelope must be a JSON object")),
    };

    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(_) => return Err(malformed("jsonrpc must be \"2.0\"")),
        None => return Err(malformed("missing jsonrpc version")),
    }

    let has_result = object.contains_key("result");
    let has_error = object.contains_key("error");
    let params = take_params(&mut object)?;

    match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => {
            if has_result || has_error {
                return Err(malformed("method cannot be combined with result or error"));
            }
            match object.remove("id") {
                Some(id) => Ok(InboundMessage::Request(Request {
                    id: parse_id(id)?,
                    method,
                    params,
                })),
                None => Ok(InboundMessage::Notification(Notification { method, params })),
            }
        }
        Some(_) => Err(malformed("method must be a non-empty string")),
        None => {
            if params.is_some() {
                return Err(malformed("params without method"));
            }
            let id = match object.remove("id") {
                Some(Value::Null) => None,
                Some(id) => Some(parse_id(id)?),
                None => return Err(malformed("missing method or id")),
            };
            let outcome = match (object.remove("result"), object.remove("error")) {
                (Some(result), None) => Outcome::Result(result),
                (None, Some(error)) => Outcome::Error(parse_error_object(error)?),
                (Some(_), Some(_)) => {
                    return Err(malformed("response cannot carry both result and error"))
                }
                (None, None) => return Err(malformed("response needs result or error")),
            };
            Ok(InboundMessage::Response(Response { id, outcome }))
        }
    }
}

/// Serialize an outbound envelope to its wire text.
#[must_use]
pub fn encode(message: &OutboundMessage) -> String {
    encode_payload(&message.to_value())
}

/// Serialize an already rendered envelope, as stored in the event buffer.
#[must_use]
pub fn encode_payload(payload: &Value) -> String {
    payload.to_string()
}

fn take_params(object: &mut Map<String, Value>) -> Result<Option<Value>> {
    match object.remove("params") {
        None => Ok(None),
        Some(params @ (Value::Object(_) | Value::Array(_))) => Ok(Some(params)),
        Some(_) => Err(malformed("params must be an object or array")),
    }
}

fn parse_id(id: Value) -> Result<RequestId> {
    match id {
        Value::String(text) => Ok(RequestId::String(text)),
        Value::Number(number) => number
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| malformed("numeric id must be an integer")),
        _ => Err(malformed("id must be a string or integer")),
    }
}

fn parse_error_object(error: Value) -> Result<JsonRpcError> {
    let Value::Object(ref object) = error else {
        return Err(malformed("error must be an object"));
    };
    if !matches!(object.get("code"), Some(Value::Number(n)) if n.is_i64()) {
        return Err(malformed("error.code must be an integer"));
    }
    if !matches!(object.get("message"), Some(Value::String(_))) {
        return Err(malformed("error.message must be a string"));
    }
    serde_json::from_value(error).map_err(|err| malformed(&err.to_string()))
}

fn malformed(reason: &str) -> AppError {
    AppError::MalformedMessage(reason.to_owned())
}
