// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Linked Data Notifications inbox.
//!
//! One virtual inbox exists per target, addressed as
//! `/inbox?target=<url>`. A target opts in by advertising that URL as its
//! inbox; every request re-checks this before doing anything else.

use crate::dispatcher::Notification;
use crate::error::HubError;
use crate::handlers::{reject, AppState};
use crate::validator::inbox_url;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACCEPT_POST: &str = "accept-post";
const ALLOW: &str = "GET, HEAD, OPTIONS, POST";
const LDP_CONTEXT: &str = "http://www.w3.org/ns/ldp";
const LD_JSON: &str = "application/ld+json";

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub target: Option<String>,
}

/// Unwrap the query string, turning a malformed one into a JSON 400.
fn inbox_query(
    state: &AppState,
    query: Result<Query<InboxQuery>, QueryRejection>,
) -> Result<InboxQuery, HubError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| {
            reject(state, "inbox", HubError::InvalidRequest(rejection.body_text()))
        })
}

/// Inbox discovery document.
///
/// Notifications are forwarded, never stored, so `contains` is always empty.
#[derive(Debug, Serialize)]
pub struct InboxDocument {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub contains: Vec<String>,
}

/// `GET /inbox?target=...` (also answers HEAD).
pub async fn get_inbox(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<InboxQuery>, QueryRejection>,
) -> Response {
    let query = match inbox_query(&state, query) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let public_base = state.public_base(&headers);
    let target = match state
        .validator
        .validate_target(&public_base, query.target.as_deref())
        .await
    {
        Ok(target) => target,
        Err(err) => return reject(&state, "inbox", err).into_response(),
    };

    let document = InboxDocument {
        context: LDP_CONTEXT,
        id: inbox_url(&public_base, target),
        kind: "ldp:Container",
        contains: Vec::new(),
    };
    ([(header::CONTENT_TYPE, LD_JSON)], Json(document)).into_response()
}

/// `OPTIONS /inbox?target=...`: advertises accepted notification formats.
pub async fn options_inbox(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<InboxQuery>, QueryRejection>,
) -> Response {
    let query = match inbox_query(&state, query) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let public_base = state.public_base(&headers);
    if let Err(err) = state
        .validator
        .validate_target(&public_base, query.target.as_deref())
        .await
    {
        return reject(&state, "inbox", err).into_response();
    }

    let accept_post = match HeaderValue::from_str(&state.validator.accept_post()) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Configured content types are not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        StatusCode::OK,
        [
            (HeaderName::from_static(ACCEPT_POST), accept_post),
            (header::ALLOW, HeaderValue::from_static(ALLOW)),
        ],
    )
        .into_response()
}

/// `POST /inbox?target=...`: accepts a notification and fans it out.
pub async fn post_inbox(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<InboxQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if let Err(err) = state.validator.validate_inbox_content_type(content_type) {
        return reject(&state, "inbox", err).into_response();
    }

    let data: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(err) => {
            let err = HubError::InvalidRequest(format!("Body is not valid JSON: {err}"));
            return reject(&state, "inbox", err).into_response();
        }
    };

    let query = match inbox_query(&state, query) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let public_base = state.public_base(&headers);
    let target = match state
        .validator
        .validate_target(&public_base, query.target.as_deref())
        .await
    {
        Ok(target) => target.to_string(),
        Err(err) => return reject(&state, "inbox", err).into_response(),
    };

    let notification = Arc::new(Notification {
        body,
        content_type: content_type.unwrap_or(LD_JSON).to_string(),
        data,
    });
    state.metrics.record_notification();
    info!(target_url = %target, bytes = notification.body.len(), "Notification accepted");

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let summary = dispatcher.dispatch(&target, notification).await;
        debug!(target_url = %target, ?summary, "Dispatch finished");
    });

    StatusCode::ACCEPTED.into_response()
}
