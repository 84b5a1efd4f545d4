use axum::http::StatusCode;
use axum::response::IntoResponse;
use streamgate::errors::{INVALID_REQUEST, PARSE_ERROR};
use streamgate::AppError;

#[test]
fn display_messages_are_prefixed() {
    assert_eq!(
        AppError::SessionNotFound("abc".into()).to_string(),
        "session not found: abc"
    );
    assert_eq!(
        AppError::AlreadyAttached("abc".into()).to_string(),
        "already attached: abc"
    );
    assert_eq!(
        AppError::SessionRequired.to_string(),
        "session required: missing Mcp-Session-Id header"
    );
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
}

#[test]
fn status_codes_follow_error_kind() {
    assert_eq!(AppError::Parse(String::new()).status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        AppError::MalformedMessage(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(AppError::SessionRequired.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        AppError::Unauthorized(String::new()).status_code(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        AppError::SessionNotFound(String::new()).status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::AlreadyAttached(String::new()).status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        AppError::Io(String::new()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn codec_errors_carry_jsonrpc_codes() {
    assert_eq!(AppError::Parse(String::new()).jsonrpc_code(), Some(PARSE_ERROR));
    assert_eq!(
        AppError::MalformedMessage(String::new()).jsonrpc_code(),
        Some(INVALID_REQUEST)
    );
    assert_eq!(AppError::SessionRequired.jsonrpc_code(), None);
}

#[test]
fn json_error_converts_to_parse() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Parse(_)));
}

#[test]
fn into_response_uses_status_code() {
    let response = AppError::SessionNotFound("gone".into()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
