//! Stream exclusivity, termination and shutdown.

use std::time::Duration;

use serde_json::json;

use super::test_helpers::{
    open_stream, post_json, read_to_end, read_until, session_id, spawn_server, test_config,
};

#[tokio::test]
async fn second_stream_conflicts_and_first_keeps_working() {
    let server = spawn_server(test_config()).await;
    let client = reqwest::Client::new();

    let mut first = open_stream(&client, &server, None, None).await;
    let id = session_id(first.headers());

    let second = open_stream(&client, &server, Some(&id), None).await;
    assert_eq!(second.status(), 409);

    let session = server.state.store.get_session(&id).expect("session");
    session
        .push_notification("notifications/message", Some(json!({"text": "hello"})))
        .expect("push");
    read_until(&mut first, "hello").await;
}

#[tokio::test]
async fn get_with_unknown_session_is_not_found() {
    let server = spawn_server(test_config()).await;
    let client = reqwest::Client::new();
    let resp = open_stream(&client, &server, Some("made-up"), None).await;
    assert_eq!(resp.status(), 404);
    assert!(server.state.store.is_empty());
}

#[tokio::test]
async fn delete_terminates_session_and_ends_stream() {
    let server = spawn_server(test_config()).await;
    let client = reqwest::Client::new();

    let mut stream = open_stream(&client, &server, None, None).await;
    let id = session_id(stream.headers());

    let resp = client
        .delete(server.mcp_url())
        .header("mcp-session-id", &id)
        .send()
        .await
        .expect("DELETE");
    assert_eq!(resp.status(), 204);

    read_to_end(&mut stream).await;
    assert!(server.state.store.is_empty());

    let resp = post_json(
        &client,
        &server,
        &id,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let server = spawn_server(test_config()).await;
    let client = reqwest::Client::new();
    let stream = open_stream(&client, &server, None, None).await;
    let id = session_id(stream.headers());

    for _ in 0..2 {
        let resp = client
            .delete(server.mcp_url())
            .header("mcp-session-id", &id)
            .send()
            .await
            .expect("DELETE");
        assert_eq!(resp.status(), 204);
    }
}

#[tokio::test]
async fn delete_without_session_is_bad_request() {
    let server = spawn_server(test_config()).await;
    let resp = reqwest::Client::new()
        .delete(server.mcp_url())
        .send()
        .await
        .expect("DELETE");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let server = spawn_server(test_config()).await;
    let client = reqwest::Client::new();
    let mut stream = open_stream(&client, &server, None, None).await;

    server.ct.cancel();
    read_to_end(&mut stream).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.state.store.is_empty());
}
