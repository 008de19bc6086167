// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! WebSocket push channel tests.

#[macro_use]
mod harness;

use axum::body::Bytes;
use futures_util::{SinkExt, StreamExt};
use harness::{
    hub::{spawn_hub, spawn_hub_with, TestHub},
    resources::{publish, publish_with_links, received, subscriber},
};
use notification_hub::config::SocketConfig;
use notification_hub::{Config, Notification};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use wiremock::MockServer;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(hub: &TestHub) -> Client {
    let (client, _) = connect_async(hub.ws_url()).await.unwrap();
    client
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next text frame as JSON; `None` once the server closed the connection.
async fn next_frame(client: &mut Client) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame");
        match message {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

fn socket_config(socket: SocketConfig) -> Config {
    Config {
        socket,
        ..Config::default()
    }
}

async fn subscribe(client: &mut Client, topic: &str) -> Value {
    send(client, json!({"mode": "subscribe", "topic": topic})).await;
    next_frame(client).await.unwrap()
}

#[tokio::test]
async fn test_subscribe_is_confirmed() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;

    let reply = subscribe(&mut client, &topic).await;

    assert_eq!(reply, json!({"mode": "confirm", "topic": topic}));
    assert_eq!(hub.state.registry.list_sockets(&topic).await.len(), 1);
}

#[tokio::test]
async fn test_invalid_topic_is_rejected_and_socket_stays_usable() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let bad = publish_with_links(
        &resources,
        "/bad",
        r#"<https://other-hub.example/hub>; rel="hub""#,
    )
    .await;
    let good = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;

    let reply = subscribe(&mut client, &bad).await;
    assert_eq!(reply["mode"], "reject");
    assert_eq!(reply["topic"], bad.as_str());
    assert!(hub.state.registry.list_sockets(&bad).await.is_empty());

    let reply = subscribe(&mut client, &good).await;
    assert_eq!(reply["mode"], "confirm");
}

#[tokio::test]
async fn test_unknown_mode_and_garbage_are_rejected_without_closing() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;

    send(&mut client, json!({"mode": "publish", "topic": topic})).await;
    assert_eq!(next_frame(&mut client).await.unwrap()["mode"], "reject");

    client
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut client).await.unwrap()["mode"], "reject");

    send(&mut client, json!({"mode": "subscribe"})).await;
    let reply = next_frame(&mut client).await.unwrap();
    assert_eq!(reply["mode"], "reject");
    assert!(reply["reason"].as_str().unwrap().contains("topic"));

    assert_eq!(subscribe(&mut client, &topic).await["mode"], "confirm");
}

#[tokio::test]
async fn test_notification_is_pushed_to_subscribed_socket() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;
    assert_eq!(subscribe(&mut client, &topic).await["mode"], "confirm");

    assert_eq!(hub.notify(&topic, r#"{"foo":"bar"}"#).await.status(), 202);

    let frame = next_frame(&mut client).await.unwrap();
    assert_eq!(frame, json!({"mode": "notification", "data": {"foo": "bar"}}));
}

#[tokio::test]
async fn test_fan_out_reaches_both_transports() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let (subscriber_server, callback) = subscriber(true).await;

    hub.subscribe(&topic, &callback).await;
    assert!(eventually!(hub.callback_count(&topic).await == 1));
    let mut client = connect(&hub).await;
    assert_eq!(subscribe(&mut client, &topic).await["mode"], "confirm");

    hub.notify(&topic, r#"{"n":1}"#).await;

    assert_eq!(next_frame(&mut client).await.unwrap()["data"], json!({"n": 1}));
    assert!(eventually!(!received(&subscriber_server, "POST").await.is_empty()));
}

#[tokio::test]
async fn test_disconnect_reclaims_subscriptions() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let first = publish(&resources, "/res/1", &hub.base).await;
    let second = publish(&resources, "/res/2", &hub.base).await;
    let mut client = connect(&hub).await;
    subscribe(&mut client, &first).await;
    subscribe(&mut client, &second).await;
    assert_eq!(hub.state.registry.counts().await, (0, 2));

    client.close(None).await.unwrap();
    drop(client);

    assert!(eventually!(hub.state.registry.counts().await == (0, 0)));
    assert_eq!(hub.notify(&first, "{}").await.status(), 202);
}

#[tokio::test]
async fn test_unsubscribe_removes_entry_and_closes() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;
    subscribe(&mut client, &topic).await;

    send(&mut client, json!({"mode": "unsubscribe", "topic": topic})).await;

    assert_eq!(next_frame(&mut client).await, None);
    assert!(eventually!(hub.state.registry.list_sockets(&topic).await.is_empty()));
}

#[tokio::test]
async fn test_sockets_are_isolated_per_connection() {
    let hub = spawn_hub().await;
    let resources = MockServer::start().await;
    let first = publish(&resources, "/res/1", &hub.base).await;
    let second = publish(&resources, "/res/2", &hub.base).await;
    let mut a = connect(&hub).await;
    let mut b = connect(&hub).await;
    subscribe(&mut a, &first).await;
    subscribe(&mut b, &second).await;

    hub.notify(&second, r#"{"for":"b"}"#).await;

    assert_eq!(next_frame(&mut b).await.unwrap()["data"]["for"], "b");
    let nothing = tokio::time::timeout(Duration::from_millis(300), a.next()).await;
    assert!(nothing.is_err(), "first socket must not see the second topic");
}

#[tokio::test]
async fn test_stalled_reader_is_dropped() {
    let hub = spawn_hub_with(socket_config(SocketConfig {
        queue_capacity: 4,
        ..SocketConfig::default()
    }))
    .await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let other = publish(&resources, "/res/2", &hub.base).await;
    let mut client = connect(&hub).await;
    subscribe(&mut client, &topic).await;
    subscribe(&mut client, &other).await;

    // The client stops reading; large frames back up the connection.
    let payload = "x".repeat(256 * 1024);
    let notification = Arc::new(Notification {
        body: Bytes::from(format!(r#"{{"fill":"{payload}"}}"#)),
        content_type: "application/ld+json".to_string(),
        data: json!({ "fill": payload }),
    });
    let mut failures = 0;
    for _ in 0..400 {
        let summary = hub
            .state
            .dispatcher
            .dispatch(&topic, Arc::clone(&notification))
            .await;
        failures += summary.socket_failures;
        if hub.state.registry.list_sockets(&topic).await.is_empty() {
            break;
        }
    }

    assert_eq!(failures, 1);
    assert!(hub.state.registry.list_sockets(&topic).await.is_empty());
    // The whole session goes, not just the flooded topic.
    assert!(eventually!(hub.state.registry.counts().await == (0, 0)));
    drop(client);
}

#[tokio::test]
async fn test_silent_peer_is_reclaimed() {
    let hub = spawn_hub_with(socket_config(SocketConfig {
        idle_secs: 1,
        ping_secs: 3600,
        ..SocketConfig::default()
    }))
    .await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;
    subscribe(&mut client, &topic).await;
    assert_eq!(hub.state.registry.counts().await, (0, 1));

    assert!(eventually!(hub.state.registry.counts().await == (0, 0)));
    drop(client);
}

#[tokio::test]
async fn test_pongs_keep_a_reading_client_alive() {
    let hub = spawn_hub_with(socket_config(SocketConfig {
        idle_secs: 2,
        ping_secs: 1,
        ..SocketConfig::default()
    }))
    .await;
    let resources = MockServer::start().await;
    let topic = publish(&resources, "/res/1", &hub.base).await;
    let mut client = connect(&hub).await;
    subscribe(&mut client, &topic).await;

    // Reading answers the hub's pings.
    let mut pings = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while let Ok(Some(Ok(message))) = tokio::time::timeout_at(deadline, client.next()).await {
        if let Message::Ping(_) = message {
            pings += 1;
        }
    }

    assert!(pings >= 2);
    assert_eq!(hub.state.registry.list_sockets(&topic).await.len(), 1);
}
