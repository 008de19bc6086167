// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Subscription registry shared by the hub, the socket sessions and the
//! dispatcher.
//!
//! Two maps are kept side by side, both keyed by topic:
//! 1. HTTP callbacks (WebSub), keyed by callback URL
//! 2. WebSocket sessions, keyed by session id
//!
//! Every operation is idempotent: putting overwrites, deleting something
//! absent is a no-op.

use crate::socket::PushHandle;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Opaque identifier assigned to each socket connection.
pub type SessionId = Uuid;

/// A verified WebSub subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackSubscription {
    pub topic: String,
    pub callback: String,
    pub lease_secs: u64,
    pub subscribed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CallbackSubscription {
    /// Whether the lease has run out at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

type CallbackMap = HashMap<String, HashMap<String, CallbackSubscription>>;
type SocketMap = HashMap<String, HashMap<SessionId, PushHandle>>;

/// Thread-safe, cheaply cloneable subscription registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    /// Topic -> callback URL -> subscription
    callbacks: Arc<RwLock<CallbackMap>>,
    /// Topic -> session -> push handle
    sockets: Arc<RwLock<SocketMap>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or renew a callback subscription.
    pub async fn put_callback(&self, topic: &str, callback: &str, lease_secs: u64) {
        let now = Utc::now();
        let lease = Duration::try_seconds(i64::try_from(lease_secs).unwrap_or(i64::MAX))
            .unwrap_or(Duration::MAX);
        let subscription = CallbackSubscription {
            topic: topic.to_string(),
            callback: callback.to_string(),
            lease_secs,
            subscribed_at: now,
            expires_at: now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut callbacks = self.callbacks.write().await;
        callbacks
            .entry(topic.to_string())
            .or_default()
            .insert(callback.to_string(), subscription);
        debug!(topic = %topic, callback = %callback, lease_secs, "Callback subscribed");
    }

    /// Remove a callback subscription. Returns whether one existed.
    pub async fn delete_callback(&self, topic: &str, callback: &str) -> bool {
        let mut callbacks = self.callbacks.write().await;
        let Some(by_callback) = callbacks.get_mut(topic) else {
            return false;
        };
        let removed = by_callback.remove(callback).is_some();
        if by_callback.is_empty() {
            callbacks.remove(topic);
        }
        debug!(topic = %topic, callback = %callback, removed, "Callback unsubscribed");
        removed
    }

    /// Register a socket session for a topic.
    pub async fn put_socket(&self, topic: &str, session: SessionId, push: PushHandle) {
        let mut sockets = self.sockets.write().await;
        sockets
            .entry(topic.to_string())
            .or_default()
            .insert(session, push);
        debug!(topic = %topic, %session, "Socket subscribed");
    }

    /// Remove a socket session from a topic. Returns whether it was present.
    pub async fn delete_socket(&self, topic: &str, session: SessionId) -> bool {
        let mut sockets = self.sockets.write().await;
        let Some(by_session) = sockets.get_mut(topic) else {
            return false;
        };
        let removed = by_session.remove(&session).is_some();
        if by_session.is_empty() {
            sockets.remove(topic);
        }
        debug!(topic = %topic, %session, removed, "Socket unsubscribed");
        removed
    }

    /// Remove a session from every topic. Returns the number of entries dropped.
    pub async fn remove_session(&self, session: SessionId) -> usize {
        let mut sockets = self.sockets.write().await;
        let mut removed = 0;
        sockets.retain(|_, by_session| {
            if by_session.remove(&session).is_some() {
                removed += 1;
            }
            !by_session.is_empty()
        });
        removed
    }

    /// Callback subscriptions of a topic whose lease is still running.
    pub async fn list_callbacks(&self, topic: &str) -> Vec<CallbackSubscription> {
        let now = Utc::now();
        let callbacks = self.callbacks.read().await;
        callbacks
            .get(topic)
            .map(|by_callback| {
                by_callback
                    .values()
                    .filter(|s| !s.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Socket sessions subscribed to a topic.
    pub async fn list_sockets(&self, topic: &str) -> Vec<(SessionId, PushHandle)> {
        let sockets = self.sockets.read().await;
        sockets
            .get(topic)
            .map(|by_session| {
                by_session
                    .iter()
                    .map(|(session, push)| (*session, push.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop callback subscriptions whose lease ended at or before `now`.
    ///
    /// Returns the number of subscriptions removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut callbacks = self.callbacks.write().await;
        let mut removed = 0;
        callbacks.retain(|_, by_callback| {
            let before = by_callback.len();
            by_callback.retain(|_, s| !s.is_expired(now));
            removed += before - by_callback.len();
            !by_callback.is_empty()
        });
        removed
    }

    /// Total number of (callback, socket) subscriptions.
    pub async fn counts(&self) -> (usize, usize) {
        let callbacks: usize = self.callbacks.read().await.values().map(HashMap::len).sum();
        let sockets: usize = self.sockets.read().await.values().map(HashMap::len).sum();
        (callbacks, sockets)
    }
}
