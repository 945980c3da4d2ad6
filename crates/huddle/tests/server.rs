//! Integration tests for the Huddle server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle::prelude::*;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = HuddleServerBuilder::new()
        .bind("127.0.0.1:0")
        .version("9.9.9-test")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_envelope(envelope: &Envelope) -> Message {
    let text = serde_json::to_string(envelope).expect("encode");
    Message::Text(text.into())
}

/// Next envelope from the server, or `None` once the connection is closed.
async fn recv(ws: &mut ClientWs) -> Option<Envelope> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("server should answer in time");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(&text).expect("decode"));
            }
            Some(Ok(Message::Binary(data))) => {
                return Some(serde_json::from_slice(&data).expect("decode"));
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Sends a request and returns the server's response.
async fn request(ws: &mut ClientWs, request: Request) -> Response {
    let envelope = Envelope {
        seq: 1,
        timestamp: 0,
        payload: Payload::Request(request),
    };
    ws.send(encode_envelope(&envelope)).await.expect("send request");
    match recv(ws).await.map(|env| env.payload) {
        Some(Payload::Response(response)) => response,
        other => panic!("expected Response, got {other:?}"),
    }
}

async fn next_event(ws: &mut ClientWs) -> Option<Event> {
    match recv(ws).await.map(|env| env.payload) {
        Some(Payload::Event(event)) => Some(event),
        None => None,
        other => panic!("expected Event, got {other:?}"),
    }
}

async fn create_room(ws: &mut ClientWs, info: &str, name: &str) -> (RoomCode, Token) {
    match request(
        ws,
        Request::CreateRoom {
            creation_info: info.into(),
            name: name.into(),
        },
    )
    .await
    {
        Response::RoomCreated {
            room,
            user_id,
            token,
        } => {
            assert_eq!(user_id, PublicId::CREATOR);
            (room, token)
        }
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

async fn join_room(ws: &mut ClientWs, room: &RoomCode, name: &str) -> (PublicId, Token) {
    match request(
        ws,
        Request::JoinRoom {
            room: room.clone(),
            name: name.into(),
        },
    )
    .await
    {
        Response::RoomJoined { id, token, .. } => (id, token),
        other => panic!("expected RoomJoined, got {other:?}"),
    }
}

async fn subscribe(ws: &mut ClientWs, room: &RoomCode, token: &Token) -> PublicId {
    match request(
        ws,
        Request::Subscribe {
            room: room.clone(),
            token: token.clone(),
        },
    )
    .await
    {
        Response::Subscribed { user_id, .. } => user_id,
        other => panic!("expected Subscribed, got {other:?}"),
    }
}

fn expect_error(response: Response, expected: u16) {
    match response {
        Response::Error { code, .. } => assert_eq!(code, expected),
        other => panic!("expected Error {expected}, got {other:?}"),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_version_reports_configured_string() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    match request(&mut ws, Request::Version).await {
        Response::Version { version } => assert_eq!(version, "9.9.9-test"),
        other => panic!("expected Version, got {other:?}"),
    }
}

#[tokio::test]
async fn test_build_rejects_zero_mailbox_capacity() {
    let result = HuddleServer::builder()
        .bind("127.0.0.1:0")
        .registry_config(RegistryConfig {
            mailbox_capacity: 0,
            ..RegistryConfig::default()
        })
        .build()
        .await;
    assert!(matches!(
        result,
        Err(HuddleError::Room(RoomError::InvalidConfig(_)))
    ));
}

#[tokio::test]
async fn test_raw_json_request() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text(
        r#"{"seq":1,"payload":{"type":"Request","data":{"type":"version"}}}"#.into(),
    ))
    .await
    .expect("send");

    let frame = match ws.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("expected text frame, got {other:?}"),
    };
    let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["payload"]["type"], "Response");
    assert_eq!(value["payload"]["data"]["type"], "version");
    assert_eq!(value["payload"]["data"]["version"], "9.9.9-test");
}

#[tokio::test]
async fn test_create_join_and_room_info() {
    let addr = start_server().await;
    let mut ann = connect(&addr).await;
    let mut bea = connect(&addr).await;

    let (room, ann_token) = create_room(&mut ann, "lobby-1", "Ann").await;
    assert_eq!(room.as_str().len(), 4);

    match request(
        &mut bea,
        Request::JoinRoom {
            room: room.clone(),
            name: "Bea".into(),
        },
    )
    .await
    {
        Response::RoomJoined { id, info, .. } => {
            assert_eq!(id, PublicId(1));
            assert_eq!(info, "lobby-1");
        }
        other => panic!("expected RoomJoined, got {other:?}"),
    }

    match request(
        &mut ann,
        Request::RoomInfo {
            room: room.clone(),
            token: ann_token,
        },
    )
    .await
    {
        Response::RoomInfo { info } => {
            assert_eq!(info.id, room);
            assert_eq!(info.creation_info, "lobby-1");
            let names: Vec<_> = info.users.iter().map(|u| u.name.as_str()).collect();
            assert_eq!(names, ["Ann", "Bea"]);
            assert_eq!(info.completion_info, None);
        }
        other => panic!("expected RoomInfo, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_codes() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    // Unknown room.
    let response = request(
        &mut ws,
        Request::JoinRoom {
            room: RoomCode::from("ZZZZ"),
            name: "Bea".into(),
        },
    )
    .await;
    expect_error(response, 404);

    // Missing mandatory field.
    let response = request(
        &mut ws,
        Request::CreateRoom {
            creation_info: String::new(),
            name: "Ann".into(),
        },
    )
    .await;
    expect_error(response, 400);

    // Oversized info.
    let response = request(
        &mut ws,
        Request::CreateRoom {
            creation_info: "x".repeat(4096),
            name: "Ann".into(),
        },
    )
    .await;
    expect_error(response, 400);

    let (room, _) = create_room(&mut ws, "lobby", "Ann").await;
    let (_, bea_token) = join_room(&mut ws, &room, "Bea").await;

    // Only the creator may complete.
    let response = request(
        &mut ws,
        Request::CompleteRoom {
            room: room.clone(),
            token: bea_token.clone(),
            completion_info: "done".into(),
        },
    )
    .await;
    expect_error(response, 403);

    // Unknown token.
    let response = request(
        &mut ws,
        Request::RenameUser {
            room,
            token: Token::new("bogus"),
            name: "Eve".into(),
        },
    )
    .await;
    expect_error(response, 403);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json".into())).await.expect("send");
    match recv(&mut ws).await.map(|env| env.payload) {
        Some(Payload::Response(response)) => expect_error(response, 400),
        other => panic!("expected Error, got {other:?}"),
    }

    assert!(matches!(
        request(&mut ws, Request::Version).await,
        Response::Version { .. }
    ));
}

#[tokio::test]
async fn test_subscriber_sees_full_session_then_disconnects() {
    let addr = start_server().await;
    let mut ann = connect(&addr).await;
    let mut ann_events = connect(&addr).await;
    let mut bea = connect(&addr).await;

    let (room, ann_token) = create_room(&mut ann, "lobby-1", "Ann").await;
    assert_eq!(
        subscribe(&mut ann_events, &room, &ann_token).await,
        PublicId::CREATOR
    );
    assert_eq!(
        next_event(&mut ann_events).await,
        Some(Event::UserAdded {
            id: PublicId(0),
            name: "Ann".into(),
        })
    );

    let (bea_id, bea_token) = join_room(&mut bea, &room, "Bea").await;
    assert_eq!(bea_id, PublicId(1));
    assert!(matches!(
        request(
            &mut bea,
            Request::RenameUser {
                room: room.clone(),
                token: bea_token,
                name: "Beatrice".into(),
            },
        )
        .await,
        Response::Ack
    ));
    assert!(matches!(
        request(
            &mut ann,
            Request::CompleteRoom {
                room: room.clone(),
                token: ann_token,
                completion_info: "done".into(),
            },
        )
        .await,
        Response::Ack
    ));

    assert_eq!(
        next_event(&mut ann_events).await,
        Some(Event::UserAdded {
            id: PublicId(1),
            name: "Bea".into(),
        })
    );
    assert_eq!(
        next_event(&mut ann_events).await,
        Some(Event::UserRenamed {
            id: PublicId(1),
            name: "Beatrice".into(),
        })
    );
    assert_eq!(
        next_event(&mut ann_events).await,
        Some(Event::Complete {
            completion_info: "done".into(),
        })
    );
    // The server closes the stream after the terminal event.
    assert_eq!(next_event(&mut ann_events).await, None);
}

#[tokio::test]
async fn test_resubscribe_replaces_other_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let mut first = connect(&addr).await;
    let mut second = connect(&addr).await;

    let (room, token) = create_room(&mut ws, "lobby", "Ann").await;

    subscribe(&mut first, &room, &token).await;
    assert!(matches!(
        next_event(&mut first).await,
        Some(Event::UserAdded { .. })
    ));

    subscribe(&mut second, &room, &token).await;
    assert_eq!(
        next_event(&mut first).await,
        Some(Event::Disconnected {
            reason: DisconnectReason::Replaced,
        })
    );
    assert_eq!(next_event(&mut first).await, None);

    join_room(&mut ws, &room, "Bea").await;
    assert_eq!(
        next_event(&mut second).await,
        Some(Event::UserAdded {
            id: PublicId(1),
            name: "Bea".into(),
        })
    );
}

#[tokio::test]
async fn test_shutdown_disconnects_subscribers() {
    let server = HuddleServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();
    let registry = server.registry();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut ws = connect(&addr).await;
    let mut events = connect(&addr).await;
    let (room, token) = create_room(&mut ws, "lobby", "Ann").await;
    subscribe(&mut events, &room, &token).await;
    assert!(next_event(&mut events).await.is_some());

    stop_tx.send(()).expect("server still running");
    running.await.expect("join").expect("clean shutdown");

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Disconnected {
            reason: DisconnectReason::Closed,
        })
    );
    assert_eq!(registry.room_count().await, 0);
}
