use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use streamgate::mcp::handler::{
    BuiltinHandler, HandlerError, HandlerFuture, MessageHandler, RequestContext, INTERNAL_ERROR,
    METHOD_NOT_FOUND,
};
use streamgate::mcp::router::{RouteOutcome, Router};
use streamgate::models::message::{
    InboundMessage, Notification, OutboundMessage, Outcome, Request, RequestId, Response,
};
use streamgate::models::session::Session;
use streamgate::orchestrator::session_store::SessionStore;
use tokio::sync::mpsc;

fn ctx(session: &Session) -> RequestContext {
    RequestContext {
        session_id: session.id().to_owned(),
        protocol_version: Some("2025-03-26".into()),
    }
}

fn request(id: i64, method: &str) -> InboundMessage {
    InboundMessage::Request(Request {
        id: RequestId::Number(id),
        method: method.into(),
        params: None,
    })
}

fn builtin(mirror: bool) -> Router {
    Router::new(Arc::new(BuiltinHandler::new("streamgate", "0.0.0")), mirror)
}

/// Sleeps before answering so the caller can walk away.
struct SlowHandler;

impl MessageHandler for SlowHandler {
    fn handle_request(
        &self,
        _ctx: RequestContext,
        _method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Result<Value, HandlerError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({"slow": true}))
        })
    }
}

struct PanickingHandler;

fn explode(method: &str) -> Result<Value, HandlerError> {
    panic!("handler blew up on {method}")
}

impl MessageHandler for PanickingHandler {
    fn handle_request(
        &self,
        _ctx: RequestContext,
        method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Result<Value, HandlerError>> {
        Box::pin(async move { explode(&method) })
    }
}

/// Records notifications and client responses it sees.
struct RecordingHandler {
    seen: mpsc::UnboundedSender<String>,
}

impl MessageHandler for RecordingHandler {
    fn handle_request(
        &self,
        _ctx: RequestContext,
        method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Result<Value, HandlerError>> {
        Box::pin(async move { Err(HandlerError::method_not_found(&method)) })
    }

    fn handle_notification(
        &self,
        _ctx: RequestContext,
        method: String,
        _params: Option<Value>,
    ) -> HandlerFuture<'_, Option<OutboundMessage>> {
        Box::pin(async move {
            let _ = self.seen.send(method.clone());
            Some(OutboundMessage::notification(format!("ack/{method}"), None))
        })
    }

    fn handle_response(&self, _ctx: RequestContext, response: Response) -> HandlerFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.seen.send(format!("response:{:?}", response.id));
        })
    }
}

async fn wait_for_sequence(session: &Session, target: u64) {
    for _ in 0..100 {
        if session.latest_sequence() >= target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never reached sequence {target}");
}

#[tokio::test]
async fn request_gets_exactly_one_direct_response_and_a_mirror() {
    let store = SessionStore::default();
    let session = store.create_session();
    let router = builtin(true);

    let outcome = router.route(&session, ctx(&session), request(1, "ping")).await;
    assert_eq!(
        outcome,
        RouteOutcome::Response(OutboundMessage::result(RequestId::Number(1), json!({})))
    );

    wait_for_sequence(&session, 1).await;
    let replay = session.replay_since(0);
    assert_eq!(replay.events.len(), 1);
    assert_eq!(
        replay.events[0].payload,
        json!({"jsonrpc": "2.0", "id": 1, "result": {}})
    );
}

#[tokio::test]
async fn without_mirror_the_stream_stays_empty() {
    let store = SessionStore::default();
    let session = store.create_session();
    let router = builtin(false);

    let outcome = router
        .route(&session, ctx(&session), request(2, "tools/list"))
        .await;
    assert!(matches!(outcome, RouteOutcome::Response(_)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.latest_sequence(), 0);
}

#[tokio::test]
async fn unknown_method_becomes_jsonrpc_error() {
    let store = SessionStore::default();
    let session = store.create_session();
    let outcome = builtin(false)
        .route(&session, ctx(&session), request(3, "tools/call"))
        .await;
    match outcome {
        RouteOutcome::Response(OutboundMessage::Response(resp)) => {
            assert_eq!(resp.id, Some(RequestId::Number(3)));
            assert!(matches!(resp.outcome, Outcome::Error(ref e) if e.code == METHOD_NOT_FOUND));
        }
        other => panic!("expected error response, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_panic_becomes_internal_error() {
    let store = SessionStore::default();
    let session = store.create_session();
    let router = Router::new(Arc::new(PanickingHandler), false);

    let outcome = router.route(&session, ctx(&session), request(4, "boom")).await;
    match outcome {
        RouteOutcome::Response(OutboundMessage::Response(resp)) => {
            assert_eq!(resp.id, Some(RequestId::Number(4)));
            assert!(matches!(resp.outcome, Outcome::Error(ref e) if e.code == INTERNAL_ERROR));
        }
        other => panic!("expected internal error, got {other:?}"),
    }
}

#[tokio::test]
async fn abandoned_request_falls_back_to_stream() {
    let store = SessionStore::default();
    let session = store.create_session();
    let router = Router::new(Arc::new(SlowHandler), false);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        router.route(&session, ctx(&session), request(5, "slow")),
    )
    .await;
    assert!(abandoned.is_err());

    wait_for_sequence(&session, 1).await;
    let replay = session.replay_since(0);
    assert_eq!(replay.events.len(), 1);
    assert_eq!(
        replay.events[0].payload,
        json!({"jsonrpc": "2.0", "id": 5, "result": {"slow": true}})
    );
}

#[tokio::test]
async fn abandoned_request_with_mirror_is_streamed_once() {
    let store = SessionStore::default();
    let session = store.create_session();
    let router = Router::new(Arc::new(SlowHandler), true);

    let _ = tokio::time::timeout(
        Duration::from_millis(10),
        router.route(&session, ctx(&session), request(6, "slow")),
    )
    .await;

    wait_for_sequence(&session, 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(session.latest_sequence(), 1);
}

#[tokio::test]
async fn notification_is_accepted_and_reply_is_streamed() {
    let store = SessionStore::default();
    let session = store.create_session();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = Router::new(Arc::new(RecordingHandler { seen: tx }), false);

    let outcome = router
        .route(
            &session,
            ctx(&session),
            InboundMessage::Notification(Notification {
                method: "notifications/initialized".into(),
                params: None,
            }),
        )
        .await;
    assert_eq!(outcome, RouteOutcome::Accepted);

    let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler ran")
        .expect("method");
    assert_eq!(seen, "notifications/initialized");

    wait_for_sequence(&session, 1).await;
    assert_eq!(
        session.replay_since(0).events[0].payload["method"],
        "ack/notifications/initialized"
    );
}

#[tokio::test]
async fn client_response_is_accepted() {
    let store = SessionStore::default();
    let session = store.create_session();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let router = Router::new(Arc::new(RecordingHandler { seen: tx }), true);

    let outcome = router
        .route(
            &session,
            ctx(&session),
            InboundMessage::Response(Response {
                id: Some(RequestId::from("srv-1")),
                outcome: Outcome::Result(json!({})),
            }),
        )
        .await;
    assert_eq!(outcome, RouteOutcome::Accepted);

    let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler ran")
        .expect("response");
    assert!(seen.starts_with("response:Some"));
    assert_eq!(session.latest_sequence(), 0);
}

#[tokio::test]
async fn failures_on_one_session_leave_another_untouched() {
    use futures_util::StreamExt;
    use streamgate::mcp::dispatcher::{self, DispatchOptions, StreamItem};

    let store = SessionStore::default();
    let doomed = store.create_session();
    let healthy = store.create_session();
    let options = DispatchOptions {
        keepalive: Duration::from_secs(3600),
        ..DispatchOptions::default()
    };
    let mut doomed_stream = dispatcher::attach(&doomed, None, &options).expect("attach doomed");
    let mut healthy_stream = dispatcher::attach(&healthy, None, &options).expect("attach healthy");

    assert!(store.terminate(doomed.id()));
    let panicking = Router::new(Arc::new(PanickingHandler), true);
    let outcome = panicking
        .route(&doomed, ctx(&doomed), request(1, "boom"))
        .await;
    assert!(matches!(
        outcome,
        RouteOutcome::Response(OutboundMessage::Response(Response {
            outcome: Outcome::Error(ref e),
            ..
        })) if e.code == INTERNAL_ERROR
    ));
    let ended = tokio::time::timeout(Duration::from_secs(1), doomed_stream.next())
        .await
        .expect("doomed stream ends");
    assert!(ended.is_none());

    healthy.append(json!("still flowing")).expect("append");
    match tokio::time::timeout(Duration::from_secs(1), healthy_stream.next())
        .await
        .expect("healthy stream item")
    {
        Some(StreamItem::Event(event)) => assert_eq!(event.payload, json!("still flowing")),
        other => panic!("expected event, got {other:?}"),
    }

    let outcome = builtin(false)
        .route(&healthy, ctx(&healthy), request(2, "ping"))
        .await;
    assert_eq!(
        outcome,
        RouteOutcome::Response(OutboundMessage::result(RequestId::Number(2), json!({})))
    );
    assert!(!healthy.is_closed());
    assert!(healthy.is_attached());
}
