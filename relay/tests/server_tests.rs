use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use peerdrop_entities::{Role, SessionState};
use peerdrop_relay::{MetricsSnapshot, RelayConfig, RelayServer};
use peerdrop_session::api::{
    CreateSessionResponse, ErrorResponse, JoinSessionResponse, SessionResponse,
};
use peerdropx_common::{ClientMessage, ErrorCode, ServerMessage, Signal};
use reqwest::StatusCode;
use rstest::rstest;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn start_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RelayServer::new(RelayConfig::default());
    tokio::spawn(server.serve(listener));
    addr
}

async fn create(
    client: &reqwest::Client,
    addr: SocketAddr,
) -> CreateSessionResponse {
    let response = client
        .post(format!("http://{addr}/api/transfers"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

async fn error_of(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    let body: ErrorResponse = response.json().await.unwrap();
    assert!(!body.success);
    (status, body.error)
}

/// Test the whole session lifecycle over HTTP
#[tokio::test]
async fn test_session_api_lifecycle() {
    let addr = start_relay().await;
    let client = reqwest::Client::new();

    let created = create(&client, addr).await;
    assert!(created.success);
    assert_eq!(created.session.state, SessionState::Created);
    assert!(!created.sender_token.is_empty());
    let id = created.session.transfer_id.clone();

    let typed = created.session.transfer_code.as_str().to_lowercase();
    let joined: JoinSessionResponse = client
        .post(format!("http://{addr}/api/transfers/join"))
        .json(&json!({ "transferCode": typed }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(joined.session.transfer_id, id);
    assert_eq!(joined.session.state, SessionState::Joined);
    assert_ne!(joined.receiver_token, created.sender_token);

    let again = client
        .post(format!("http://{addr}/api/transfers/join"))
        .json(&json!({ "transferCode": created.session.transfer_code }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(again).await,
        (StatusCode::CONFLICT, "already-joined".to_string())
    );

    let view: SessionResponse = client
        .get(format!("http://{addr}/api/transfers/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view.session.state, SessionState::Joined);

    let forbidden = client
        .post(format!("http://{addr}/api/transfers/{id}/close"))
        .json(&json!({ "senderToken": joined.receiver_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(forbidden).await,
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    );

    let closed: SessionResponse = client
        .post(format!("http://{addr}/api/transfers/{id}/close"))
        .json(&json!({ "senderToken": created.sender_token }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(closed.session.state, SessionState::Closed);
}

#[tokio::test]
async fn test_session_api_errors() {
    let addr = start_relay().await;
    let client = reqwest::Client::new();

    let bad_code = client
        .post(format!("http://{addr}/api/transfers/join"))
        .json(&json!({ "transferCode": "not a code" }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(bad_code).await,
        (StatusCode::BAD_REQUEST, "invalid-code".to_string())
    );

    let unknown = client
        .post(format!("http://{addr}/api/transfers/join"))
        .json(&json!({ "transferCode": "ZZZZ-ZZZZ" }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(unknown).await,
        (StatusCode::NOT_FOUND, "not-found".to_string())
    );

    let missing = client
        .get(format!("http://{addr}/api/transfers/no-such-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let created = create(&client, addr).await;
    let early_close = client
        .post(format!(
            "http://{addr}/api/transfers/{}/close",
            created.session.transfer_id
        ))
        .json(&json!({ "senderToken": created.sender_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(early_close).await,
        (StatusCode::CONFLICT, "not-joined".to_string())
    );
}

#[tokio::test]
async fn test_create_accepts_empty_body_and_ttl() {
    let addr = start_relay().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/transfers"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: CreateSessionResponse = client
        .post(format!("http://{addr}/api/transfers"))
        .json(&json!({ "ttlMinutes": 500 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ttl = created.session.expires_at - chrono::Utc::now();
    assert!(ttl.num_minutes() <= 30 && ttl.num_minutes() >= 29);
}

/// Test that a fractional TTL is kept in whole minutes
#[rstest]
#[case(json!({ "ttlMinutes": 25.5 }), 25)]
#[case(json!({ "ttlMinutes": 12.9 }), 12)]
#[case(json!({ "ttlMinutes": 2.5 }), 10)]
#[tokio::test]
async fn test_create_with_fractional_ttl(
    #[case] body: Value,
    #[case] minutes: i64,
) {
    let addr = start_relay().await;
    let created: CreateSessionResponse = reqwest::Client::new()
        .post(format!("http://{addr}/api/transfers"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ttl = created.session.expires_at - chrono::Utc::now();
    assert!(ttl.num_minutes() <= minutes && ttl.num_minutes() >= minutes - 1);
}

/// Test that a body that is present but malformed is rejected
#[rstest]
#[case(r#"{"ttlMinutes":"25"}"#)]
#[case("garbage")]
#[case("42")]
#[tokio::test]
async fn test_create_rejects_malformed_body(#[case] body: &'static str) {
    let addr = start_relay().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/transfers"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(response).await,
        (StatusCode::BAD_REQUEST, "invalid-request".to_string())
    );
}

#[tokio::test]
async fn test_health_and_stats() {
    let addr = start_relay().await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "ok");

    let stats: MetricsSnapshot = client
        .get(format!("http://{addr}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, MetricsSnapshot::default());
}

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn send(socket: &mut Socket, message: ClientMessage) {
    socket
        .send(Message::Text(message.encode().unwrap()))
        .await
        .unwrap();
}

async fn next_frame(socket: &mut Socket) -> ServerMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .unwrap();
        if let Message::Text(text) = message {
            return ServerMessage::decode(&text).unwrap();
        }
    }
}

/// Test two WebSocket clients pairing up and exchanging a signal
#[tokio::test]
async fn test_websocket_pairing_and_relay() {
    let addr = start_relay().await;
    let url = format!("ws://{addr}/ws");
    let (mut sender, _) = connect_async(url.as_str()).await.unwrap();
    let (mut receiver, _) = connect_async(url.as_str()).await.unwrap();

    send(
        &mut sender,
        ClientMessage::JoinRoom {
            transfer_id: "t-ws".into(),
            role: Role::Sender,
            token: "s-tok".into(),
        },
    )
    .await;
    assert_eq!(next_frame(&mut sender).await, ServerMessage::JoinedRoom {
        role: Role::Sender,
        peer_present: false
    });

    send(
        &mut receiver,
        ClientMessage::JoinRoom {
            transfer_id: "t-ws".into(),
            role: Role::Receiver,
            token: "r-tok".into(),
        },
    )
    .await;
    assert_eq!(next_frame(&mut receiver).await, ServerMessage::JoinedRoom {
        role: Role::Receiver,
        peer_present: true
    });
    next_frame(&mut receiver).await;
    assert_eq!(next_frame(&mut sender).await, ServerMessage::PeerJoined {
        role: Role::Sender,
        peer_role: Role::Receiver
    });

    send(
        &mut receiver,
        ClientMessage::Relay {
            transfer_id: "t-ws".into(),
            role: Role::Receiver,
            token: "r-tok".into(),
            signal: Signal::Ready,
        },
    )
    .await;
    assert_eq!(next_frame(&mut sender).await, ServerMessage::Relay {
        role: Role::Sender,
        from: Role::Receiver,
        signal: Signal::Ready
    });

    receiver.close(None).await.unwrap();
    assert_eq!(next_frame(&mut sender).await, ServerMessage::PeerLeft {
        role: Role::Sender,
        peer_role: Role::Receiver
    });
}

#[tokio::test]
async fn test_websocket_role_taken_closes_socket() {
    let addr = start_relay().await;
    let url = format!("ws://{addr}/ws");
    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    for (socket, token) in [(&mut first, "a"), (&mut second, "b")] {
        send(
            socket,
            ClientMessage::JoinRoom {
                transfer_id: "t-taken".into(),
                role: Role::Sender,
                token: token.into(),
            },
        )
        .await;
        if token == "a" {
            next_frame(socket).await;
        }
    }
    let ServerMessage::Error { code, .. } = next_frame(&mut second).await else {
        panic!("expected an error frame");
    };
    assert_eq!(code, ErrorCode::RoleTaken);

    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = second.next().await {
            if message.is_close() {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(rest);
}
