// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! WebSocket push channel.
//!
//! A connection acts as its own callback. Clients send
//! `{"mode": "subscribe", "topic": "<url>"}` and receive `confirm` or
//! `reject` frames, followed by `notification` frames for every inbox
//! POST on a subscribed topic.
//!
//! A session ends when the peer closes, when it falls a full queue behind
//! on outbound frames, or when nothing (not even a pong) arrives for the
//! configured idle timeout.

use crate::error::{HubError, Result};
use crate::handlers::{reject, AppState};
use crate::registry::SessionId;
use crate::validator::{require, HubMode};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frame sent by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Frame sent by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ServerMessage {
    Confirm {
        topic: String,
    },
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Notification {
        data: serde_json::Value,
    },
}

/// Work queued for a connection's writer task.
#[derive(Debug)]
pub enum Outgoing {
    Frame(ServerMessage),
    Ping,
    Close,
}

/// A frame could not be queued for a connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("socket session closed")]
    Closed,
    #[error("socket outbound queue full")]
    Full,
}

/// Push capability bound to a single connection.
///
/// Cloning is cheap. The outbound queue is bounded: a push that finds it
/// full fails with [`PushError::Full`] and flags the session as stalled,
/// which ends it. Sending after the connection closed returns
/// [`PushError::Closed`] and has no other effect.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::Sender<Outgoing>,
    stalled: Arc<Notify>,
}

impl PushHandle {
    /// A handle and the receiving end of its queue, holding at most
    /// `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let push = Self {
            tx,
            stalled: Arc::new(Notify::new()),
        };
        (push, rx)
    }

    fn queue(&self, outgoing: Outgoing) -> std::result::Result<(), PushError> {
        self.tx.try_send(outgoing).map_err(|err| match err {
            TrySendError::Full(_) => {
                self.stalled.notify_one();
                PushError::Full
            }
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Queue a frame for the connection.
    pub fn send(&self, message: ServerMessage) -> std::result::Result<(), PushError> {
        self.queue(Outgoing::Frame(message))
    }

    /// Queue a `notification` frame carrying `data`.
    pub fn notify(&self, data: &serde_json::Value) -> std::result::Result<(), PushError> {
        self.send(ServerMessage::Notification { data: data.clone() })
    }

    fn ping(&self) -> std::result::Result<(), PushError> {
        self.queue(Outgoing::Ping)
    }

    /// Ask the writer to close the connection after pending frames.
    pub fn close(&self) {
        let _ = self.queue(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once a push found the queue full.
    pub async fn stalled(&self) {
        self.stalled.notified().await
    }
}

enum Flow {
    Continue,
    Close,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Closed,
    Stalled,
    Idle,
}

impl Exit {
    fn as_str(self) -> &'static str {
        match self {
            Exit::Closed => "closed",
            Exit::Stalled => "stalled",
            Exit::Idle => "idle",
        }
    }
}

impl From<PushError> for Exit {
    fn from(err: PushError) -> Self {
        match err {
            PushError::Closed => Exit::Closed,
            PushError::Full => Exit::Stalled,
        }
    }
}

/// Time the writer gets to flush a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// WebSocket upgrade endpoint.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let public_base = state.public_base(&headers);
    ws.on_upgrade(move |socket| run_session(socket, state, public_base))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>, public_base: String) {
    let session: SessionId = Uuid::new_v4();
    let settings = state.config.socket.clone();
    let (mut sink, mut stream) = socket.split();
    let (push, mut rx) = PushHandle::channel(settings.queue_capacity());
    info!(%session, "Socket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            let frame = match outgoing {
                Outgoing::Frame(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::Text(text.into()),
                    Err(err) => {
                        warn!(%session, error = %err, "Failed to encode frame");
                        continue;
                    }
                },
                Outgoing::Ping => Message::Ping(Default::default()),
                Outgoing::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let idle_timeout = settings.idle_timeout();
    let ping_period = settings.ping_period();
    let mut ping = interval_at(Instant::now() + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut deadline = Instant::now() + idle_timeout;

    // Any inbound frame, pongs included, counts as liveness.
    let exit = loop {
        tokio::select! {
            frame = stream.next() => {
                deadline = Instant::now() + idle_timeout;
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break Exit::Closed,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(%session, error = %err, "Socket read failed");
                        break Exit::Closed;
                    }
                };

                let flow =
                    handle_message(&state, &public_base, session, &push, text.as_str()).await;
                if let Flow::Close = flow {
                    push.close();
                    break Exit::Closed;
                }
            }
            _ = ping.tick() => {
                if let Err(err) = push.ping() {
                    break Exit::from(err);
                }
            }
            () = push.stalled() => break Exit::Stalled,
            () = sleep_until(deadline) => break Exit::Idle,
        }
    };

    // Graceful or not, nothing may keep pushing to this session.
    let removed = state.registry.remove_session(session).await;
    drop(push);
    if exit == Exit::Closed {
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    } else {
        writer.abort();
    }
    info!(%session, removed, reason = exit.as_str(), "Socket disconnected");
}

async fn handle_message(
    state: &AppState,
    public_base: &str,
    session: SessionId,
    push: &PushHandle,
    text: &str,
) -> Flow {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            let err = reject(
                state,
                "socket",
                HubError::InvalidRequest(format!("Malformed message: {err}")),
            );
            let _ = push.send(ServerMessage::Reject {
                topic: None,
                reason: Some(err.to_string()),
            });
            return Flow::Continue;
        }
    };

    let (mode, topic) = match validate_message(state, public_base, &message).await {
        Ok(validated) => validated,
        Err(err) => {
            let err = reject(state, "socket", err);
            let _ = push.send(ServerMessage::Reject {
                topic: message.topic.clone(),
                reason: Some(err.to_string()),
            });
            return Flow::Continue;
        }
    };

    match mode {
        HubMode::Subscribe => {
            state.registry.put_socket(topic, session, push.clone()).await;
            info!(%session, topic = %topic, "Socket subscription confirmed");
            let _ = push.send(ServerMessage::Confirm {
                topic: topic.to_string(),
            });
            Flow::Continue
        }
        HubMode::Unsubscribe => {
            state.registry.delete_socket(topic, session).await;
            info!(%session, topic = %topic, "Socket unsubscribed, closing");
            Flow::Close
        }
    }
}

async fn validate_message<'a>(
    state: &AppState,
    public_base: &str,
    message: &'a ClientMessage,
) -> Result<(HubMode, &'a str)> {
    let mode: HubMode = require("mode", message.mode.as_deref())?.parse()?;
    let topic = require("topic", message.topic.as_deref())?;
    state.validator.validate_topic(public_base, topic).await?;
    Ok((mode, topic))
}
