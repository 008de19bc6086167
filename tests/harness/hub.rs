// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process hub served over real TCP.

use notification_hub::{app, AppState, Config};
use std::sync::Arc;
use tokio::net::TcpListener;

/// A running hub and a client to talk to it.
pub struct TestHub {
    pub base: String,
    pub state: Arc<AppState>,
    pub client: reqwest::Client,
}

/// Start a hub with default settings.
pub async fn spawn_hub() -> TestHub {
    spawn_hub_with(Config::default()).await
}

/// Start a hub; `bind_addr` and `public_base` are filled in.
pub async fn spawn_hub_with(mut config: Config) -> TestHub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    config.bind_addr = addr.to_string();
    config.public_base = Some(base.clone());
    let state = Arc::new(AppState::new(config).unwrap());

    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestHub {
        base,
        state,
        client: reqwest::Client::new(),
    }
}

impl TestHub {
    pub fn hub_url(&self) -> String {
        format!("{}/hub", self.base)
    }

    pub fn inbox_endpoint(&self) -> String {
        format!("{}/inbox", self.base)
    }

    pub fn ws_url(&self) -> String {
        format!("{}/", self.base.replacen("http://", "ws://", 1))
    }

    /// POST a notification to the inbox of `target`.
    pub async fn notify(&self, target: &str, body: &str) -> reqwest::Response {
        self.client
            .post(self.inbox_endpoint())
            .query(&[("target", target)])
            .header("content-type", "application/ld+json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Send a WebSub request with the given form fields.
    pub async fn hub_request(&self, fields: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.hub_url())
            .form(fields)
            .send()
            .await
            .unwrap()
    }

    pub async fn subscribe(&self, topic: &str, callback: &str) -> reqwest::Response {
        self.hub_request(&[
            ("hub.mode", "subscribe"),
            ("hub.topic", topic),
            ("hub.callback", callback),
        ])
        .await
    }

    pub async fn callback_count(&self, topic: &str) -> usize {
        self.state.registry.list_callbacks(topic).await.len()
    }
}
