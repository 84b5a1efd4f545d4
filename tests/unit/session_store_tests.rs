use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use streamgate::orchestrator::clock::{Clock, ManualClock};
use streamgate::orchestrator::session_store::SessionStore;
use streamgate::AppError;

fn store_with_clock(capacity: usize) -> (SessionStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let store = SessionStore::with_clock(capacity, Arc::clone(&clock) as Arc<dyn Clock>);
    (store, clock)
}

#[test]
fn created_sessions_have_unique_ids() {
    let store = SessionStore::default();
    let ids: HashSet<String> = (0..50)
        .map(|_| store.create_session().id().to_owned())
        .collect();
    assert_eq!(ids.len(), 50);
    assert_eq!(store.len(), 50);
}

#[test]
fn get_returns_live_session() {
    let store = SessionStore::default();
    let session = store.create_session();
    let found = store.get_session(session.id()).expect("live session");
    assert!(Arc::ptr_eq(&session, &found));
}

#[test]
fn unknown_id_is_not_found() {
    let store = SessionStore::default();
    let err = store.get_session("does-not-exist").expect_err("unknown");
    assert!(matches!(err, AppError::SessionNotFound(id) if id == "does-not-exist"));
}

#[test]
fn terminate_is_idempotent() {
    let store = SessionStore::default();
    let session = store.create_session();
    let id = session.id().to_owned();

    assert!(store.terminate(&id));
    assert!(!store.terminate(&id));
    assert!(!store.terminate("never-existed"));
    assert!(session.is_closed());
    assert!(store.is_empty());
    assert!(matches!(
        store.get_session(&id),
        Err(AppError::SessionNotFound(_))
    ));
}

#[test]
fn terminate_discards_buffer_and_rejects_appends() {
    let store = SessionStore::default();
    let session = store.create_session();
    session.append(json!("queued")).expect("append");
    store.terminate(session.id());
    assert!(session.replay_since(0).events.is_empty());
    assert!(matches!(
        session.append(json!("late")),
        Err(AppError::SessionNotFound(_))
    ));
}

#[test]
fn touch_updates_last_activity() {
    let (store, clock) = store_with_clock(4);
    let session = store.create_session();
    let created = session.last_activity_at();
    clock.advance(Duration::seconds(10));
    store.touch(session.id()).expect("touch");
    assert_eq!(session.last_activity_at() - created, Duration::seconds(10));
    assert_eq!(session.created_at(), created);
}

#[test]
fn sweep_evicts_only_sessions_idle_past_timeout() {
    let (store, clock) = store_with_clock(4);
    let stale = store.create_session();
    clock.advance(Duration::seconds(50));
    let fresh = store.create_session();
    clock.advance(Duration::seconds(20));

    let evicted = store.sweep_idle(Duration::seconds(60));
    assert_eq!(evicted, vec![stale.id().to_owned()]);
    assert!(stale.is_closed());
    assert!(!fresh.is_closed());
    assert_eq!(store.len(), 1);
}

#[test]
fn sweep_never_evicts_attached_session() {
    let (store, clock) = store_with_clock(4);
    let session = store.create_session();
    let attachment = session.attach(None).expect("attach");
    clock.advance(Duration::hours(5));
    assert!(store.sweep_idle(Duration::seconds(60)).is_empty());
    assert!(!session.is_closed());

    session.detach(attachment.token);
    clock.advance(Duration::seconds(30));
    assert!(store.sweep_idle(Duration::seconds(60)).is_empty());
    clock.advance(Duration::seconds(31));
    assert_eq!(store.sweep_idle(Duration::seconds(60)).len(), 1);
}

#[test]
fn activity_postpones_eviction() {
    let (store, clock) = store_with_clock(4);
    let session = store.create_session();
    clock.advance(Duration::seconds(59));
    session.touch().expect("touch");
    clock.advance(Duration::seconds(59));
    assert!(store.sweep_idle(Duration::seconds(60)).is_empty());
}

#[test]
fn terminate_all_closes_everything() {
    let store = SessionStore::default();
    let a = store.create_session();
    let b = store.create_session();
    assert_eq!(store.terminate_all(), 2);
    assert!(a.is_closed() && b.is_closed());
    assert!(store.is_empty());
}

#[test]
fn push_notification_is_buffered_as_envelope() {
    let store = SessionStore::default();
    let session = store.create_session();
    let seq = session
        .push_notification("notifications/message", Some(json!({"level": "info"})))
        .expect("push");
    assert_eq!(seq, 1);
    let replay = session.replay_since(0);
    assert_eq!(
        replay.events[0].payload,
        json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {"level": "info"}
        })
    );
}

#[tokio::test]
async fn background_sweeper_evicts_and_stops_on_cancel() {
    use streamgate::orchestrator::idle_sweeper::spawn_idle_sweeper;
    use tokio_util::sync::CancellationToken;

    let (store, clock) = store_with_clock(4);
    let store = Arc::new(store);
    let session = store.create_session();
    clock.advance(Duration::minutes(10));

    let cancel = CancellationToken::new();
    let handle = spawn_idle_sweeper(
        Arc::clone(&store),
        std::time::Duration::from_millis(10),
        std::time::Duration::from_secs(60),
        cancel.clone(),
    );

    for _ in 0..100 {
        if session.is_closed() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(session.is_closed());
    assert!(store.is_empty());

    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("sweeper stops")
        .expect("join");
}
