// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! WebSub subscription hub.
//!
//! Requests are validated synchronously and acknowledged with 202. The
//! challenge round trip and the registry change happen afterwards in a
//! background task whose outcome the requester never hears about.

use crate::error::HubError;
use crate::handlers::{reject, AppState};
use crate::validator::{HubMode, HubRequest};
use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Form fields of a subscription request.
#[derive(Debug, Default, Deserialize)]
pub struct HubForm {
    #[serde(rename = "hub.callback")]
    pub callback: Option<String>,
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    pub lease_seconds: Option<String>,
}

/// `POST /hub`
pub async fn post_hub(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<HubForm>, FormRejection>,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if let Err(err) = state.validator.validate_hub_content_type(content_type) {
        return reject(&state, "hub", err).into_response();
    }

    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            let err = HubError::InvalidRequest(rejection.body_text());
            return reject(&state, "hub", err).into_response();
        }
    };

    let public_base = state.public_base(&headers);
    let request = match state
        .validator
        .validate_request(
            &public_base,
            form.callback.as_deref(),
            form.mode.as_deref(),
            form.topic.as_deref(),
            form.lease_seconds.as_deref(),
        )
        .await
    {
        Ok(request) => request,
        Err(err) => return reject(&state, "hub", err).into_response(),
    };

    info!(
        topic = %request.topic,
        callback = %request.callback,
        mode = %request.mode,
        lease_secs = request.lease_secs,
        "Subscription request accepted"
    );

    tokio::spawn(complete_request(Arc::clone(&state), request));

    StatusCode::ACCEPTED.into_response()
}

/// Verify intent with the callback, then commit the registry change.
///
/// Returns whether the change was committed.
pub async fn complete_request(state: Arc<AppState>, request: HubRequest) -> bool {
    if let Err(err) = state.verifier.verify(&request).await {
        warn!(
            topic = %request.topic,
            callback = %request.callback,
            mode = %request.mode,
            error = %err,
            "Verification failed, request discarded"
        );
        state.metrics.record_verification(request.mode, false);
        return false;
    }
    state.metrics.record_verification(request.mode, true);

    match request.mode {
        HubMode::Subscribe => {
            state
                .registry
                .put_callback(&request.topic, &request.callback, request.lease_secs)
                .await;
            info!(
                topic = %request.topic,
                callback = %request.callback,
                lease_secs = request.lease_secs,
                "Callback subscribed"
            );
        }
        HubMode::Unsubscribe => {
            let removed = state
                .registry
                .delete_callback(&request.topic, &request.callback)
                .await;
            info!(
                topic = %request.topic,
                callback = %request.callback,
                removed,
                "Callback unsubscribed"
            );
        }
    }
    true
}
