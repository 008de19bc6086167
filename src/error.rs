// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the notification hub.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong while validating or verifying a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Unsupported Content-Type: expected one of {expected:?}, got {actual:?}")]
    UnsupportedContentType {
        expected: Vec<String>,
        actual: Option<String>,
    },

    #[error("Could not fetch link metadata from {url}: {reason}")]
    FetchError { url: String, reason: String },

    #[error("Verification of {callback} failed: {reason}")]
    VerificationFailed { callback: String, reason: String },
}

impl HubError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::InvalidTopic(_) => "INVALID_TOPIC",
            Self::UnsupportedContentType { .. } => "UNSUPPORTED_CONTENT_TYPE",
            Self::FetchError { .. } => "FETCH_ERROR",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
        }
    }

    pub(crate) fn missing(param: &str) -> Self {
        Self::InvalidRequest(format!("Missing required parameter: {param}"))
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HubError>;

/// Failures while assembling the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_error_renders_as_bad_request_with_message() {
        let response = HubError::InvalidTopic("hub link missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "INVALID_TOPIC");
        assert_eq!(json["error"], "Invalid topic: hub link missing");
    }

    #[test]
    fn test_missing_parameter_message() {
        assert_eq!(
            HubError::missing("hub.topic").to_string(),
            "Invalid request: Missing required parameter: hub.topic"
        );
    }
}
