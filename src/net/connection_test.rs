use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use frames::{ClientMessage, RoomKey, Status, syscall};
use serde_json::json;

use super::*;
use crate::net::MemoryConnector;
use crate::test_support::{fast_config, push_frame};

fn memory_connection() -> (Connection, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    let conn = Connection::new(&fast_config(), Arc::clone(&connector) as Arc<dyn Connector>);
    (conn, connector)
}

fn channel_listener(conn: &Connection, kind: EventKind) -> (Subscription, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = conn.subscribe(kind, move |event| {
        let _ = tx.send(event.clone());
    });
    (sub, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

fn position_frame(user: &str) -> Frame {
    push_frame(
        syscall::POSITION_UPDATE,
        Some("quiz:7"),
        json!({ "userId": user, "position": 2, "totalParticipants": 9 }),
    )
}

#[test]
fn starts_disconnected() {
    let (conn, _) = memory_connection();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!conn.is_connected());
}

#[test]
fn connect_outside_runtime_fails() {
    let (conn, _) = memory_connection();
    assert!(matches!(conn.connect(), Err(EngineError::NoRuntime)));
}

#[test]
fn lifecycle_emitted_only_on_transitions() {
    let (conn, _) = memory_connection();
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&connects);
    let _on_connect = conn.subscribe(EventKind::Connect, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let d = Arc::clone(&disconnects);
    let _on_disconnect = conn.subscribe(EventKind::Disconnect, move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });

    conn.set_state(ConnectionState::Connecting);
    conn.set_state(ConnectionState::Disconnected);
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);

    conn.set_state(ConnectionState::Connected);
    conn.set_state(ConnectionState::Connected);
    conn.set_state(ConnectionState::Disconnected);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn disposed_subscription_is_never_invoked() {
    let (conn, _) = memory_connection();
    let kept = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    let k = Arc::clone(&kept);
    let _kept = conn.subscribe(EventKind::PositionUpdate, move |_| {
        k.fetch_add(1, Ordering::SeqCst);
    });
    let d = Arc::clone(&dropped);
    let disposed = conn.subscribe(EventKind::PositionUpdate, move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(conn.listener_count(EventKind::PositionUpdate), 2);

    disposed.dispose();
    conn.dispatch_frame(&position_frame("42"));

    assert_eq!(conn.listener_count(EventKind::PositionUpdate), 1);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);
}

#[test]
fn dispatch_decodes_into_typed_event() {
    let (conn, _) = memory_connection();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = conn.subscribe(EventKind::PositionUpdate, move |event| {
        sink.lock().unwrap().push(event.clone());
    });

    conn.dispatch_frame(&position_frame("42"));

    let seen = seen.lock().unwrap();
    let [Event::Server(ServerEvent::PositionUpdate(update))] = seen.as_slice() else {
        panic!("expected one position update, got {seen:?}");
    };
    assert_eq!(update.position, 2);
    assert_eq!(update.total_participants, 9);
    assert_eq!(update.quiz_id, Some(7));
}

#[test]
fn malformed_and_unknown_frames_are_dropped() {
    let (conn, _) = memory_connection();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let _sub = conn.subscribe(EventKind::PositionUpdate, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    conn.dispatch_frame(&push_frame(syscall::POSITION_UPDATE, None, json!({ "position": "first" })));
    conn.dispatch_frame(&push_frame("chat:message", None, json!({})));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn error_frames_become_server_errors() {
    let (conn, _) = memory_connection();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = conn.subscribe(EventKind::ServerError, move |event| {
        sink.lock().unwrap().push(event.clone());
    });

    let mut frame = push_frame(syscall::ROOM_JOIN, Some("quiz:7"), json!({ "message": "forbidden" }));
    frame.status = Status::Error;
    conn.dispatch_frame(&frame);

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn offline_sends_are_queued() {
    let (conn, _) = memory_connection();
    conn.send(&ClientMessage::JoinRoom(RoomKey::Quiz { quiz_id: 7 }));
    let queued = conn.drain_queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].syscall, syscall::ROOM_JOIN);
    assert_eq!(queued[0].room.as_deref(), Some("quiz:7"));
}

#[tokio::test]
async fn connects_exchanges_frames_and_reconnects() {
    let (conn, connector) = memory_connection();
    let mut server = connector.push_link();
    let (_connects, mut connect_rx) = channel_listener(&conn, EventKind::Connect);
    let (_drops, mut disconnect_rx) = channel_listener(&conn, EventKind::Disconnect);
    let (_attempts, mut attempt_rx) = channel_listener(&conn, EventKind::ReconnectAttempt);
    let (_positions, mut position_rx) = channel_listener(&conn, EventKind::PositionUpdate);

    conn.send(&ClientMessage::JoinRoom(RoomKey::Quiz { quiz_id: 7 }));
    assert!(conn.connect().unwrap());
    assert!(!conn.connect().unwrap());

    assert_eq!(next(&mut connect_rx).await, Event::Lifecycle(Lifecycle::Connect));
    assert!(conn.is_connected());

    let flushed = next(&mut server.incoming).await;
    assert_eq!(flushed.syscall, syscall::ROOM_JOIN);

    server.outgoing.send(position_frame("42")).unwrap();
    assert!(matches!(next(&mut position_rx).await, Event::Server(ServerEvent::PositionUpdate(_))));

    let mut second = connector.push_link();
    drop(server);
    assert_eq!(next(&mut disconnect_rx).await, Event::Lifecycle(Lifecycle::Disconnect));
    assert_eq!(next(&mut attempt_rx).await, Event::Lifecycle(Lifecycle::ReconnectAttempt(1)));
    assert_eq!(next(&mut connect_rx).await, Event::Lifecycle(Lifecycle::Connect));

    conn.send(&ClientMessage::RefreshMonitor { quiz_id: 7 });
    assert_eq!(next(&mut second.incoming).await.syscall, syscall::MONITOR_REFRESH);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn close_stops_the_loop() {
    let (conn, connector) = memory_connection();
    let mut server = connector.push_link();
    let (_connects, mut connect_rx) = channel_listener(&conn, EventKind::Connect);
    let (_drops, mut disconnect_rx) = channel_listener(&conn, EventKind::Disconnect);

    conn.connect().unwrap();
    next(&mut connect_rx).await;
    conn.close();

    assert_eq!(next(&mut disconnect_rx).await, Event::Lifecycle(Lifecycle::Disconnect));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(server.incoming.recv().await.is_none());
}

#[tokio::test]
async fn dropping_last_handle_releases_the_link() {
    let (conn, connector) = memory_connection();
    let mut server = connector.push_link();
    let (connects, mut connect_rx) = channel_listener(&conn, EventKind::Connect);

    conn.connect().unwrap();
    next(&mut connect_rx).await;
    drop(connects);
    drop(conn);

    let closed = tokio::time::timeout(Duration::from_secs(5), server.incoming.recv()).await;
    assert!(matches!(closed, Ok(None)));
}
