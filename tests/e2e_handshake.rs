//! End-to-end handshake tests.
//!
//! A fake appliance sits on the server side of an in-memory WebSocket and
//! drives the bootstrap the way a real appliance does.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use homeconnect::protocol::{initial_values_packet, services_packet};
use homeconnect::{Action, Connection, DeviceIdentity, HomeConnectError, Packet, Session};
use tokio::io::DuplexStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Appliance = WebSocketStream<DuplexStream>;

const CATALOG: &[(&str, u8)] = &[("ei", 2), ("iz", 1), ("ci", 1)];

/// Connect a client to an in-memory fake appliance
async fn session() -> (Connection, Appliance) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    let appliance = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    (
        Connection::from_websocket(client, DeviceIdentity::default()),
        appliance,
    )
}

async fn push(appliance: &mut Appliance, packet: &Packet) {
    appliance
        .send(Message::Text(packet.to_json().unwrap()))
        .await
        .unwrap();
}

/// Next packet the client sent
async fn expect_packet(appliance: &mut Appliance) -> Packet {
    loop {
        let message = timeout(Duration::from_secs(5), appliance.next())
            .await
            .expect("Timed out waiting for client packet")
            .expect("Client closed the stream")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return Packet::from_json(&text).unwrap();
        }
    }
}

/// Check that the client sends nothing for a short while
async fn expect_silence(appliance: &mut Appliance) {
    let next = timeout(Duration::from_millis(100), appliance.next()).await;
    assert!(
        !matches!(next, Ok(Some(Ok(Message::Text(_))))),
        "unexpected packet: {next:?}"
    );
}

#[tokio::test]
async fn test_initial_values_seeds_counter() {
    let (connection, mut appliance) = session().await;

    push(&mut appliance, &initial_values_packet(7, 1, 100)).await;

    let response = expect_packet(&mut appliance).await;
    assert_eq!(response.session_id, 7);
    assert_eq!(response.message_id, 101);
    assert_eq!(response.action, Action::Response);
    assert_eq!(response.resource, "/ei/initialValues");
    assert_eq!(response.version, 2);
    let identity = response.first_data().unwrap();
    assert_eq!(identity["deviceType"], "Application");
    assert_eq!(identity["deviceID"], "deadbeef");

    let services = expect_packet(&mut appliance).await;
    assert_eq!(services, Packet::new(7, 102, Action::Get, "/ci/services", 1));

    // Not ready until the catalog arrives
    assert!(connection.ready_handle().try_get().is_none());
    expect_silence(&mut appliance).await;
}

#[tokio::test]
async fn test_full_handshake_resolves_ready() {
    let (connection, mut appliance) = session().await;
    let ready = connection.ready_handle();

    push(&mut appliance, &initial_values_packet(7, 1, 100)).await;
    expect_packet(&mut appliance).await;
    expect_packet(&mut appliance).await;

    push(&mut appliance, &services_packet(7, 2, CATALOG)).await;

    let sent: Vec<Packet> = vec![
        expect_packet(&mut appliance).await,
        expect_packet(&mut appliance).await,
        expect_packet(&mut appliance).await,
    ];
    assert_eq!(
        sent,
        vec![
            Packet::new(7, 103, Action::Notify, "/ei/deviceReady", 2),
            Packet::new(7, 104, Action::Get, "/iz/info", 1),
            Packet::new(7, 105, Action::Get, "/ci/registeredDevices", 1),
        ]
    );

    let session = ready.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(
        session,
        Session {
            session_id: 7,
            next_message_id: 106,
        }
    );

    let dispatcher = connection.ready(Duration::from_secs(5)).await.unwrap();
    assert_eq!(dispatcher.session_id(), 7);
    assert_eq!(dispatcher.catalog().version("ei").unwrap(), 2);
    assert_eq!(dispatcher.next_message_id().await, 106);
}

#[tokio::test]
async fn test_close_before_catalog_fails_ready() {
    let (connection, mut appliance) = session().await;

    push(&mut appliance, &initial_values_packet(7, 1, 100)).await;
    expect_packet(&mut appliance).await;
    expect_packet(&mut appliance).await;

    appliance
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "going away".into(),
        }))
        .await
        .unwrap();

    let result = connection.ready(Duration::from_secs(5)).await;
    assert!(
        matches!(result, Err(HomeConnectError::ProtocolViolation(ref m)) if m.contains("going away")),
        "got {result:?}"
    );
    assert!(matches!(
        connection.join().await,
        Err(HomeConnectError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn test_missing_service_sends_nothing() {
    let (connection, mut appliance) = session().await;

    push(&mut appliance, &initial_values_packet(7, 1, 100)).await;
    expect_packet(&mut appliance).await;
    expect_packet(&mut appliance).await;

    push(&mut appliance, &services_packet(7, 2, &[("ei", 2), ("ci", 1)])).await;

    let result = connection.ready(Duration::from_secs(5)).await;
    assert!(
        matches!(result, Err(HomeConnectError::Decode(ref m)) if m.contains("'iz'")),
        "got {result:?}"
    );
    expect_silence(&mut appliance).await;
}

#[tokio::test]
async fn test_malformed_initial_values_fails_ready() {
    let (connection, mut appliance) = session().await;

    appliance
        .send(Message::Text(
            r#"{"sID":7,"msgID":1,"resource":"/ei/initialValues","version":2,"action":"NOTIFY","data":[{}]}"#
                .to_string(),
        ))
        .await
        .unwrap();

    assert!(matches!(
        connection.ready(Duration::from_secs(5)).await,
        Err(HomeConnectError::Decode(_))
    ));
    expect_silence(&mut appliance).await;
}

#[tokio::test]
async fn test_seed_at_id_limit_fails_ready() {
    let (connection, mut appliance) = session().await;

    push(&mut appliance, &initial_values_packet(7, 1, i64::MAX)).await;

    let result = connection.ready(Duration::from_secs(5)).await;
    assert!(
        matches!(result, Err(HomeConnectError::Decode(ref m)) if m.contains("edMsgID")),
        "got {result:?}"
    );
    expect_silence(&mut appliance).await;
    assert!(matches!(
        connection.join().await,
        Err(HomeConnectError::Decode(_))
    ));
}

#[tokio::test]
async fn test_unknown_action_is_decode_error() {
    let (connection, mut appliance) = session().await;

    appliance
        .send(Message::Text(
            r#"{"sID":7,"msgID":1,"resource":"/ei/initialValues","version":2,"action":"PATCH"}"#
                .to_string(),
        ))
        .await
        .unwrap();

    assert!(matches!(
        connection.ready(Duration::from_secs(5)).await,
        Err(HomeConnectError::Decode(_))
    ));
}

#[tokio::test]
async fn test_unrelated_traffic_before_initial_values_is_ignored() {
    let (connection, mut appliance) = session().await;
    let mut inbound = connection.subscribe();

    let notify = Packet::new(7, 1, Action::Notify, "/ro/values", 1);
    push(&mut appliance, &notify).await;
    assert_eq!(inbound.recv().await.unwrap(), notify);
    expect_silence(&mut appliance).await;

    push(&mut appliance, &initial_values_packet(7, 2, 10)).await;
    assert_eq!(expect_packet(&mut appliance).await.message_id, 11);
    assert_eq!(expect_packet(&mut appliance).await.message_id, 12);
}

#[tokio::test]
async fn test_ready_times_out_without_initial_values() {
    let (connection, _appliance) = session().await;

    assert_eq!(
        connection.ready(Duration::from_millis(50)).await.unwrap_err(),
        HomeConnectError::Timeout(Duration::from_millis(50))
    );
}

#[tokio::test]
async fn test_custom_identity_is_reported() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    let mut appliance = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

    let identity = DeviceIdentity {
        device_name: "kitchen-bridge".to_string(),
        device_id: "0badcafe".to_string(),
        ..Default::default()
    };
    let _connection = Connection::from_websocket(client, identity);

    push(&mut appliance, &initial_values_packet(3, 1, 0)).await;
    let response = expect_packet(&mut appliance).await;
    assert_eq!(response.message_id, 1);
    assert_eq!(response.first_data().unwrap()["deviceName"], "kitchen-bridge");
    assert_eq!(response.first_data().unwrap()["deviceID"], "0badcafe");
}
