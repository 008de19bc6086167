// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notification fan-out.
//!
//! Delivery is best effort: every failure is logged and counted, nothing
//! is retried, and one slow subscriber never holds up the others.

use crate::metrics::HubMetrics;
use crate::registry::SubscriptionRegistry;
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A notification accepted by an inbox.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Request body exactly as received
    pub body: Bytes,
    /// Content-Type the body was posted with
    pub content_type: String,
    /// Parsed body, embedded in socket frames
    pub data: serde_json::Value,
}

/// What a single dispatch did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Callback deliveries started
    pub callbacks: usize,
    /// Socket pushes queued
    pub sockets: usize,
    /// Sockets found closed
    pub socket_failures: usize,
}

/// Pushes notifications to every subscriber of a topic.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    client: reqwest::Client,
    metrics: HubMetrics,
}

impl Dispatcher {
    pub fn new(
        registry: SubscriptionRegistry,
        client: reqwest::Client,
        metrics: HubMetrics,
    ) -> Self {
        Self {
            registry,
            client,
            metrics,
        }
    }

    /// Fan `notification` out to all subscribers of `topic`.
    ///
    /// Callback deliveries run in their own tasks and may still be in
    /// flight when this returns; socket frames are queued before it returns.
    pub async fn dispatch(&self, topic: &str, notification: Arc<Notification>) -> DispatchSummary {
        let callbacks = self.registry.list_callbacks(topic).await;
        let sockets = self.registry.list_sockets(topic).await;
        let mut summary = DispatchSummary::default();

        for subscription in callbacks {
            let client = self.client.clone();
            let metrics = self.metrics.clone();
            let notification = Arc::clone(&notification);
            tokio::spawn(async move {
                deliver(&client, &metrics, &subscription.callback, &notification).await;
            });
            summary.callbacks += 1;
        }

        for (session, push) in sockets {
            match push.notify(&notification.data) {
                Ok(()) => {
                    self.metrics.record_delivery("socket", true);
                    summary.sockets += 1;
                }
                Err(err) => {
                    debug!(topic = %topic, %session, error = %err, "Dropping unresponsive socket");
                    self.metrics.record_delivery("socket", false);
                    self.registry.delete_socket(topic, session).await;
                    summary.socket_failures += 1;
                }
            }
        }

        info!(
            topic = %topic,
            callbacks = summary.callbacks,
            sockets = summary.sockets,
            socket_failures = summary.socket_failures,
            "Notification dispatched"
        );
        summary
    }
}

async fn deliver(
    client: &reqwest::Client,
    metrics: &HubMetrics,
    callback: &str,
    notification: &Notification,
) {
    let result = client
        .post(callback)
        .header(CONTENT_TYPE, notification.content_type.as_str())
        .body(notification.body.clone())
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            debug!(callback = %callback, status = %response.status(), "Notification delivered");
            metrics.record_delivery("callback", true);
        }
        Ok(response) => {
            warn!(
                callback = %callback,
                status = %response.status(),
                "Callback rejected notification"
            );
            metrics.record_delivery("callback", false);
        }
        Err(err) => {
            warn!(callback = %callback, error = %err, "Notification delivery failed");
            metrics.record_delivery("callback", false);
        }
    }
}
