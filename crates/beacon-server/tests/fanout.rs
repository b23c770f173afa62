//! End-to-end fan-out over a real listener: WebSocket consumers on both
//! scopes, HTTP producers with and without credentials.

use std::time::Duration;

use beacon_hub::Hub;
use beacon_settings::Settings;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JWT_SECRET: &str = "it-jwt-secret";
const TIME_SECRET: &str = "it-time-secret";

fn test_settings() -> Settings {
    Settings {
        port: 0,
        jwt_secret: JWT_SECRET.into(),
        time_token_secret: TIME_SECRET.into(),
        time_window_secs: 3600,
        allowed_skew: 1,
    }
}

async fn next_text(ws: &mut WsClient) -> Option<String> {
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.as_str().to_owned()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            _ => return None,
        }
    }
}

async fn no_text(ws: &mut WsClient) -> bool {
    match timeout(Duration::from_millis(300), ws.next()).await {
        Ok(Some(Ok(Message::Text(_)))) => false,
        _ => true,
    }
}

/// Poll `/health` until the session count reaches `expected` (session
/// commands race HTTP probes) and return the last observed value.
async fn session_count(client: &reqwest::Client, port: u16, expected: u64) -> u64 {
    let mut sessions = u64::MAX;
    for _ in 0..20 {
        let body: serde_json::Value = client
            .get(format!("http://127.0.0.1:{port}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        sessions = body["sessions"].as_u64().unwrap_or(0);
        if sessions == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    sessions
}

#[tokio::test]
async fn scoped_fan_out_end_to_end() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;

    let jwt = beacon_auth::bearer::issue("producer", JWT_SECRET, Duration::from_secs(600)).unwrap();
    let (mut trusted, _) = connect_async(format!(
        "ws://127.0.0.1:{port}/ws?token={jwt}&topic=orders"
    ))
    .await
    .expect("trusted upgrade");
    let (mut public, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public?topic=orders"))
        .await
        .expect("public upgrade");

    let client = reqwest::Client::new();
    let token = beacon_auth::timetoken::generate(TIME_SECRET, 3600);

    let resp = client
        .post(format!("http://127.0.0.1:{port}/publish?topic=orders"))
        .header("X-API-Token", &token)
        .body(r#"{"id":"1"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let resp = client
        .post(format!("http://127.0.0.1:{port}/publish/public?topic=orders"))
        .body(r#"{"id":"2"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    // Each scope sees exactly its own event, same topic notwithstanding.
    assert_eq!(next_text(&mut trusted).await.as_deref(), Some(r#"{"id":"1"}"#));
    assert_eq!(next_text(&mut public).await.as_deref(), Some(r#"{"id":"2"}"#));
    assert!(no_text(&mut trusted).await);
    assert!(no_text(&mut public).await);
}

#[tokio::test]
async fn missing_topic_selector_lands_on_default() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;

    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public"))
        .await
        .expect("public upgrade");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/publish/public"))
        .body(r#"{"hello":"default"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    assert_eq!(
        next_text(&mut ws).await.as_deref(),
        Some(r#"{"hello":"default"}"#)
    );
}

#[tokio::test]
async fn topics_partition_sessions() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;

    let (mut orders, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public?topic=orders"))
        .await
        .unwrap();
    let (mut prices, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public?topic=prices"))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/publish/public?topic=orders"))
        .body(r#"{"id":"o1"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    assert_eq!(next_text(&mut orders).await.as_deref(), Some(r#"{"id":"o1"}"#));
    assert!(no_text(&mut prices).await);
}

#[tokio::test]
async fn trusted_upgrade_without_credential_is_refused() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;

    assert!(connect_async(format!("ws://127.0.0.1:{port}/ws")).await.is_err());
    assert!(
        connect_async(format!("ws://127.0.0.1:{port}/ws?token=bogus"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn health_reflects_connected_sessions() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;

    let (_ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public"))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    assert_eq!(session_count(&client, port, 1).await, 1);
}

#[tokio::test]
async fn oversized_inbound_frame_terminates_the_session() {
    let server = beacon_server::start(test_settings(), Hub::spawn())
        .await
        .unwrap();
    let port = server.port;
    let client = reqwest::Client::new();

    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/public"))
        .await
        .unwrap();
    assert_eq!(session_count(&client, port, 1).await, 1);

    // Inbound frames past the 512-byte limit are a protocol violation;
    // the broker tears the session down rather than reading on.
    let oversized = "x".repeat(600);
    ws.send(Message::Text(oversized.into())).await.unwrap();

    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(_))) => {}
            Err(_) => panic!("socket stayed open after oversized frame"),
        }
    }
    assert_eq!(session_count(&client, port, 0).await, 0);
}
