// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared application state and the health endpoint.

use crate::challenge::ChallengeVerifier;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{HubError, StartupError};
use crate::links::LinkFetcher;
use crate::metrics::HubMetrics;
use crate::registry::SubscriptionRegistry;
use crate::validator::Validator;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub validator: Validator,
    pub verifier: ChallengeVerifier,
    pub registry: SubscriptionRegistry,
    pub dispatcher: Dispatcher,
    pub metrics: HubMetrics,
}

impl AppState {
    /// Wire up clients, registry and metrics from `config`.
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let user_agent = config.fetch.user_agent.as_str();
        let fetch_client = client(user_agent, config.fetch.timeout())?;
        let verify_client = client(user_agent, config.hub.verify_timeout())?;
        let delivery_client = client(user_agent, config.delivery.timeout())?;

        let registry = SubscriptionRegistry::new();
        let metrics = HubMetrics::new()?;

        Ok(Self {
            validator: Validator::new(
                config.validation.clone(),
                config.hub.clone(),
                LinkFetcher::new(fetch_client),
            ),
            verifier: ChallengeVerifier::new(verify_client),
            dispatcher: Dispatcher::new(registry.clone(), delivery_client, metrics.clone()),
            registry,
            metrics,
            config,
        })
    }

    /// Base URL under which this hub is reachable for the current request.
    ///
    /// The configured base wins. Otherwise it is rebuilt from
    /// `X-Forwarded-Proto`, `X-Forwarded-Host` and `Host`.
    pub fn public_base(&self, headers: &HeaderMap) -> String {
        if let Some(base) = &self.config.public_base {
            return base.clone();
        }

        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let proto = header_value("x-forwarded-proto").unwrap_or("http");
        let host = header_value("x-forwarded-host")
            .or_else(|| header_value(header::HOST.as_str()))
            .unwrap_or("localhost");
        format!("{proto}://{host}")
    }
}

fn client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Log and count a rejected request, handing the error back for the response.
pub(crate) fn reject(state: &AppState, endpoint: &'static str, err: HubError) -> HubError {
    info!(endpoint, code = err.code(), error = %err, "Request rejected");
    state.metrics.record_rejection(endpoint);
    err
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub callback_subscriptions: usize,
    pub socket_subscriptions: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (callback_subscriptions, socket_subscriptions) = state.registry.counts().await;
    Json(HealthResponse {
        status: "healthy",
        service: "notification-hub",
        version: env!("CARGO_PKG_VERSION"),
        callback_subscriptions,
        socket_subscriptions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn state(public_base: Option<&str>) -> AppState {
        AppState::new(Config {
            public_base: public_base.map(str::to_string),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_configured_public_base_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:3000"));

        assert_eq!(
            state(Some("https://hub.example")).public_base(&headers),
            "https://hub.example"
        );
    }

    #[test]
    fn test_public_base_from_forwarding_headers() {
        let state = state(None);
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:3000"));
        assert_eq!(state.public_base(&headers), "http://internal:3000");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert(
            "x-forwarded-host",
            HeaderValue::from_static("hub.example, proxy.internal"),
        );
        assert_eq!(state.public_base(&headers), "https://hub.example");
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let state = Arc::new(state(None));
        state
            .registry
            .put_callback("https://example.org/res/1", "https://client.example/cb", 60)
            .await;

        let Json(report) = health(State(state)).await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.callback_subscriptions, 1);
        assert_eq!(report.socket_subscriptions, 0);
    }
}
