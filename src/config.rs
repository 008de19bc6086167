// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the notification hub.
//!
//! Every field has a serde default so a partial config file (or none at
//! all) yields a working hub. [`Config::from_env`] layers environment
//! variables on top of the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Externally visible base URL of this hub, without trailing slash.
    ///
    /// When unset the base is derived per request from the forwarding
    /// headers and `Host`.
    #[serde(default)]
    pub public_base: Option<String>,

    /// Subscription handling
    #[serde(default)]
    pub hub: HubConfig,

    /// Link discovery requests
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Notification delivery to HTTP callbacks
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// WebSocket sessions
    #[serde(default)]
    pub socket: SocketConfig,

    /// Content-Type negotiation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// WebSub subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Lease applied when `hub.lease_seconds` is absent (default: 7)
    #[serde(default = "default_lease_secs")]
    pub default_lease_secs: u64,

    /// Upper bound for requested leases; larger values are clamped (default: 10 days)
    #[serde(default = "default_max_lease_secs")]
    pub max_lease_secs: u64,

    /// Timeout for the challenge round trip in milliseconds (default: 5000)
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,

    /// Period of the expired-lease sweep in seconds (default: 60)
    #[serde(default = "default_lease_sweep_secs")]
    pub lease_sweep_secs: u64,
}

/// Outbound link discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for fetching a target or topic in milliseconds (default: 5000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent sent on every outbound request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Outbound delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Timeout for a single callback delivery in milliseconds (default: 10000)
    #[serde(default = "default_delivery_timeout_ms")]
    pub timeout_ms: u64,
}

/// WebSocket session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Frames buffered per session before it counts as stalled (default: 64)
    #[serde(default = "default_socket_queue_capacity")]
    pub queue_capacity: usize,

    /// Period between server pings in seconds (default: 20)
    #[serde(default = "default_socket_ping_secs")]
    pub ping_secs: u64,

    /// Silence after which a session is dropped, in seconds (default: 60)
    #[serde(default = "default_socket_idle_secs")]
    pub idle_secs: u64,
}

/// Accepted request content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Content types accepted by `POST /inbox`, advertised via `Accept-Post`
    #[serde(default = "default_inbox_content_types")]
    pub inbox_content_types: Vec<String>,

    /// Content types accepted by `POST /hub`
    #[serde(default = "default_hub_content_types")]
    pub hub_content_types: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Activity Streams flavoured JSON-LD, the preferred inbox payload.
pub const ACTIVITY_STREAMS_CONTENT_TYPE: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Plain JSON-LD.
pub const LD_JSON_CONTENT_TYPE: &str = "application/ld+json";

/// Form encoding required by WebSub subscription requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_lease_secs() -> u64 {
    7
}

fn default_max_lease_secs() -> u64 {
    864_000
}

fn default_verify_timeout_ms() -> u64 {
    5000
}

fn default_lease_sweep_secs() -> u64 {
    60
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    format!("notification-hub/{}", env!("CARGO_PKG_VERSION"))
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}

fn default_socket_queue_capacity() -> usize {
    64
}

fn default_socket_ping_secs() -> u64 {
    20
}

fn default_socket_idle_secs() -> u64 {
    60
}

fn default_inbox_content_types() -> Vec<String> {
    vec![
        ACTIVITY_STREAMS_CONTENT_TYPE.to_string(),
        LD_JSON_CONTENT_TYPE.to_string(),
    ]
}

fn default_hub_content_types() -> Vec<String> {
    vec![FORM_CONTENT_TYPE.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base: None,
            hub: HubConfig::default(),
            fetch: FetchConfig::default(),
            delivery: DeliveryConfig::default(),
            socket: SocketConfig::default(),
            validation: ValidationConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_lease_secs: default_lease_secs(),
            max_lease_secs: default_max_lease_secs(),
            verify_timeout_ms: default_verify_timeout_ms(),
            lease_sweep_secs: default_lease_sweep_secs(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_socket_queue_capacity(),
            ping_secs: default_socket_ping_secs(),
            idle_secs: default_socket_idle_secs(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            inbox_content_types: default_inbox_content_types(),
            hub_content_types: default_hub_content_types(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `BIND_ADDR`: Server bind address
    /// - `PUBLIC_BASE`: Externally visible base URL
    /// - `DEFAULT_LEASE_SECS`, `MAX_LEASE_SECS`: Lease bounds in seconds
    /// - `VERIFY_TIMEOUT_MS`, `FETCH_TIMEOUT_MS`, `DELIVERY_TIMEOUT_MS`: Outbound timeouts
    /// - `LEASE_SWEEP_SECS`: Expired-lease sweep period
    /// - `SOCKET_QUEUE_CAPACITY`, `SOCKET_PING_SECS`, `SOCKET_IDLE_SECS`: Socket session limits
    /// - `METRICS_ENABLED`: `true` or `false`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Values that fail to parse keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_base: lookup("PUBLIC_BASE")
                .map(|base| base.trim().trim_end_matches('/').to_string())
                .filter(|base| !base.is_empty()),
            hub: HubConfig {
                default_lease_secs: parsed(&lookup, "DEFAULT_LEASE_SECS")
                    .unwrap_or(defaults.hub.default_lease_secs),
                max_lease_secs: parsed(&lookup, "MAX_LEASE_SECS")
                    .unwrap_or(defaults.hub.max_lease_secs),
                verify_timeout_ms: parsed(&lookup, "VERIFY_TIMEOUT_MS")
                    .unwrap_or(defaults.hub.verify_timeout_ms),
                lease_sweep_secs: parsed(&lookup, "LEASE_SWEEP_SECS")
                    .unwrap_or(defaults.hub.lease_sweep_secs),
            },
            fetch: FetchConfig {
                timeout_ms: parsed(&lookup, "FETCH_TIMEOUT_MS")
                    .unwrap_or(defaults.fetch.timeout_ms),
                ..defaults.fetch
            },
            delivery: DeliveryConfig {
                timeout_ms: parsed(&lookup, "DELIVERY_TIMEOUT_MS")
                    .unwrap_or(defaults.delivery.timeout_ms),
            },
            socket: SocketConfig {
                queue_capacity: parsed(&lookup, "SOCKET_QUEUE_CAPACITY")
                    .unwrap_or(defaults.socket.queue_capacity),
                ping_secs: parsed(&lookup, "SOCKET_PING_SECS").unwrap_or(defaults.socket.ping_secs),
                idle_secs: parsed(&lookup, "SOCKET_IDLE_SECS").unwrap_or(defaults.socket.idle_secs),
            },
            validation: defaults.validation,
            metrics: MetricsConfig {
                enabled: parsed(&lookup, "METRICS_ENABLED").unwrap_or(defaults.metrics.enabled),
                ..defaults.metrics
            },
        }
    }
}

impl HubConfig {
    /// Get the challenge verification timeout
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    /// Get the lease sweep period
    pub fn lease_sweep_period(&self) -> Duration {
        Duration::from_secs(self.lease_sweep_secs.max(1))
    }
}

impl SocketConfig {
    /// Outbound frame queue depth per session, at least one
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Get the ping period
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_secs.max(1))
    }

    /// Get the idle timeout
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_secs.max(1))
    }
}

impl FetchConfig {
    /// Get the link discovery timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DeliveryConfig {
    /// Get the delivery timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
