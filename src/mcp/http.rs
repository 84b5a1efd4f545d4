//! Streamable HTTP transport: one MCP endpoint plus health/info probes.
//!
//! - `GET <endpoint>` opens (or resumes) the session's event stream.
//! - `POST <endpoint>` submits one JSON-RPC envelope.
//! - `DELETE <endpoint>` terminates the session.
//!
//! Authorization runs as route middleware in front of everything except
//! `/health`, so a rejected caller never reaches session state.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth::Authorizer;
use super::codec;
use super::dispatcher::{self, DispatchOptions, StreamItem};
use super::handler::RequestContext;
use super::router::{RouteOutcome, Router};
use crate::config::GlobalConfig;
use crate::models::event::EventKind;
use crate::orchestrator::session_store::SessionStore;
use crate::{AppError, Result};

/// Session correlation header.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Resume marker header.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";
/// Protocol version header, echoed on POST responses.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Shared state for every HTTP handler.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Live sessions.
    pub store: Arc<SessionStore>,
    /// Routes decoded envelopes to the message handler.
    pub router: Router,
    /// Injected authorization predicate.
    pub authorizer: Box<dyn Authorizer>,
}

impl AppState {
    fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            keepalive: self.config.session.keepalive(),
            legacy_session_events: self.config.session.legacy_session_events,
            endpoint: self.config.endpoint.clone(),
        }
    }
}

/// Build the axum router for `state`.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    let endpoint = state.config.endpoint.clone();
    axum::Router::new()
        .route(
            &endpoint,
            get(handle_get).post(handle_post).delete(handle_delete),
        )
        .route("/info", get(server_info))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `config.host:config.port` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound,
/// and `AppError::Io` if the server fails while running.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid listen address: {err}")))?;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_listener(listener, state, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// On cancellation every session is terminated so open event streams end
/// and the graceful shutdown can complete.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails while running.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(%local, endpoint = %state.config.endpoint, "starting streamable HTTP transport");

    let store = Arc::clone(&state.store);
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            store.terminate_all();
        })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("streamable HTTP transport shut down");
    Ok(())
}

async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.authorizer.is_authorized(request.headers()) {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "rejecting unauthenticated request");
        AppError::Unauthorized(
            "provide Authorization: Bearer <token> or X-API-Key header".into(),
        )
        .into_response()
    }
}

/// `GET <endpoint>`: open or resume an event stream.
async fn handle_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response> {
    let resume_from = last_event_id(&headers)?;
    let session = match header_str(&headers, SESSION_HEADER) {
        Some(id) => {
            let session = state.store.get_session(id)?;
            info!(session_id = %id, ?resume_from, "resuming session");
            session
        }
        None => state.store.create_session(),
    };
    session.touch()?;

    let session_id = session.id().to_owned();
    let items = dispatcher::attach(&session, resume_from, &state.dispatch_options())?;
    let events = items.map(|item| Ok::<SseEvent, Infallible>(to_sse_event(item)));

    let mut response = Sse::new(events).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(SESSION_HEADER, header_value(&session_id)?);
    response_headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response_headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

/// `POST <endpoint>`: submit one JSON-RPC envelope.
async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    // Session correlation is checked before the body is looked at.
    let session_id = header_str(&headers, SESSION_HEADER).ok_or(AppError::SessionRequired)?;
    let session = state.store.get_session(session_id)?;
    session.touch()?;

    let message = codec::decode(&body)?;
    debug!(session_id, method = ?message.method(), "inbound message");

    let protocol_version = header_str(&headers, PROTOCOL_VERSION_HEADER).map(str::to_owned);
    let ctx = RequestContext {
        session_id: session_id.to_owned(),
        protocol_version: protocol_version.clone(),
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SESSION_HEADER, header_value(session_id)?);
    if let Some(version) = protocol_version.as_deref() {
        response_headers.insert(PROTOCOL_VERSION_HEADER, header_value(version)?);
    }

    let response = match state.router.route(&session, ctx, message).await {
        RouteOutcome::Response(message) => {
            response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            (StatusCode::OK, response_headers, codec::encode(&message)).into_response()
        }
        RouteOutcome::Accepted => (StatusCode::ACCEPTED, response_headers).into_response(),
    };
    Ok(response)
}

/// `DELETE <endpoint>`: terminate the session. Idempotent.
async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let session_id = header_str(&headers, SESSION_HEADER).ok_or(AppError::SessionRequired)?;
    if !state.store.terminate(session_id) {
        debug!(session_id, "terminate on unknown or already closed session");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /health`: liveness probe, exempt from authorization.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let info = &state.config.server_info;
    Json(json!({
        "status": "healthy",
        "service": info.name,
        "version": info.version,
        "region": info.region,
        "transport": "streamable-http",
    }))
}

/// `GET /info`: static server description.
async fn server_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let info = &config.server_info;
    let authentication = if config.auth_enabled() {
        "enabled"
    } else {
        "disabled"
    };
    Json(json!({
        "name": info.name,
        "description": info.description,
        "version": info.version,
        "transport": "streamable-http",
        "region": info.region,
        "endpoints": { "health": "/health", "info": "/info", "mcp": config.endpoint },
        "authentication": authentication,
    }))
}

fn to_sse_event(item: StreamItem) -> SseEvent {
    match item {
        StreamItem::Event(event) => match event.kind {
            EventKind::Message => SseEvent::default()
                .id(event.sequence_id.to_string())
                .event("message")
                .data(codec::encode_payload(&event.payload)),
            EventKind::Keepalive => SseEvent::default().comment("keepalive"),
        },
        StreamItem::Gap(gap) => SseEvent::default().comment(format!(
            "replay-gap requested={} oldest={}",
            gap.requested, gap.oldest_retained
        )),
        StreamItem::Endpoint(endpoint) => SseEvent::default()
            .event("endpoint")
            .data(json!({ "endpoint": endpoint }).to_string()),
        StreamItem::SessionAnnounce(session_id) => SseEvent::default()
            .event("session")
            .data(json!({ "sessionId": session_id }).to_string()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| AppError::MalformedMessage(format!("invalid header value: {err}")))
}

/// Parse the optional `Last-Event-ID` resume marker.
fn last_event_id(headers: &HeaderMap) -> Result<Option<u64>> {
    header_str(headers, LAST_EVENT_ID_HEADER)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| AppError::MalformedMessage(format!("invalid Last-Event-ID: {raw}")))
        })
        .transpose()
}
