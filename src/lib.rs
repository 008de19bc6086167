// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notification Hub
//!
//! A federated publish-subscribe hub speaking three protocols over one
//! subscription registry:
//!
//! - **Linked Data Notifications**: `/inbox?target=<url>` accepts
//!   notifications for targets that advertise it as their inbox
//! - **WebSub**: `/hub` takes verified subscriptions with HTTP callbacks
//! - **WebSocket**: clients connected at `/` subscribe over the socket
//!
//! Every notification posted to an inbox is fanned out to all subscribers
//! of the target, whichever transport they came through.
//!
//! ## Configuration
//!
//! See [`Config::from_env`] for the recognised environment variables.

pub mod challenge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod inbox;
pub mod links;
pub mod metrics;
pub mod registry;
pub mod socket;
pub mod validator;

pub use config::Config;
pub use dispatcher::{DispatchSummary, Dispatcher, Notification};
pub use error::{HubError, StartupError};
pub use handlers::AppState;
pub use registry::{CallbackSubscription, SessionId, SubscriptionRegistry};
pub use validator::{HubMode, HubRequest, Validator};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the HTTP router for a hub.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(socket::upgrade))
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::health))
        .route(
            "/inbox",
            get(inbox::get_inbox)
                .options(inbox::options_inbox)
                .post(inbox::post_inbox),
        )
        .route("/hub", post(hub::post_hub));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics::metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
