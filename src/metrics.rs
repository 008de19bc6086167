// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for the hub.

use crate::handlers::AppState;
use crate::validator::HubMode;
use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder, TEXT_FORMAT};
use std::sync::Arc;
use tracing::error;

/// Counters shared by every handler; clones update the same series.
#[derive(Clone)]
pub struct HubMetrics {
    registry: Registry,
    notifications_accepted: IntCounter,
    requests_rejected: IntCounterVec,
    verifications: IntCounterVec,
    deliveries: IntCounterVec,
}

impl HubMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let notifications_accepted = IntCounter::new(
            "hub_notifications_accepted_total",
            "Notifications accepted by an inbox",
        )?;
        let requests_rejected = IntCounterVec::new(
            Opts::new("hub_requests_rejected_total", "Requests rejected during validation"),
            &["endpoint"],
        )?;
        let verifications = IntCounterVec::new(
            Opts::new("hub_verifications_total", "Challenge verifications by mode and outcome"),
            &["mode", "outcome"],
        )?;
        let deliveries = IntCounterVec::new(
            Opts::new("hub_deliveries_total", "Notification deliveries by transport and outcome"),
            &["transport", "outcome"],
        )?;

        registry.register(Box::new(notifications_accepted.clone()))?;
        registry.register(Box::new(requests_rejected.clone()))?;
        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;

        Ok(Self {
            registry,
            notifications_accepted,
            requests_rejected,
            verifications,
            deliveries,
        })
    }

    pub fn record_notification(&self) {
        self.notifications_accepted.inc();
    }

    pub fn record_rejection(&self, endpoint: &str) {
        self.requests_rejected.with_label_values(&[endpoint]).inc();
    }

    pub fn record_verification(&self, mode: HubMode, verified: bool) {
        self.verifications
            .with_label_values(&[mode.as_str(), outcome(verified)])
            .inc();
    }

    /// `transport` is either `callback` or `socket`.
    pub fn record_delivery(&self, transport: &str, delivered: bool) {
        self.deliveries
            .with_label_values(&[transport, outcome(delivered)])
            .inc();
    }

    /// Render all counters in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!(error = %err, "Failed to encode metrics");
            return String::from("# Error encoding metrics\n");
        }
        String::from_utf8(buffer).unwrap_or_else(|err| {
            error!(error = %err, "Metrics are not valid UTF-8");
            String::from("# Error encoding metrics\n")
        })
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Metrics endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], state.metrics.render())
}
