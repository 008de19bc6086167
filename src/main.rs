// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notification Hub service
//!
//! Serves an LDN inbox, a WebSub hub and a WebSocket push channel over
//! one in-memory subscription registry.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:3000)
//! - `PUBLIC_BASE`: Base URL targets and topics must point at
//!   (default: derived from request headers)
//! - `DEFAULT_LEASE_SECS`: Lease when none is requested (default: 7)
//! - `LEASE_SWEEP_SECS`: Expired-lease sweep period (default: 60)
//! - `SOCKET_IDLE_SECS`: Drop silent sockets after this long (default: 60)
//! - `RUST_LOG`: Log filter (default: info)

use chrono::Utc;
use notification_hub::{app, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        public_base = ?config.public_base,
        default_lease_secs = config.hub.default_lease_secs,
        max_lease_secs = config.hub.max_lease_secs,
        metrics = config.metrics.enabled,
        "Starting notification hub"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    // Spawn lease sweep task
    let sweep_state = state.clone();
    let sweep_period = config.hub.lease_sweep_period();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_period);
        loop {
            interval.tick().await;
            let expired = sweep_state.registry.sweep_expired(Utc::now()).await;
            if expired > 0 {
                info!(expired, "Expired subscriptions removed");
            } else {
                debug!("No expired subscriptions");
            }
        }
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
