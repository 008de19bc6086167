// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request validation for the inbox and the hub.
//!
//! Two kinds of checks happen here:
//! - structural checks on the request itself (parameters, Content-Type)
//! - link-metadata checks against the target or topic, proving that the
//!   resource designates this hub
//!
//! Neither authenticates the requester; they only establish that the
//! resource owner opted in to this hub.

use crate::config::{HubConfig, ValidationConfig};
use crate::error::{HubError, Result};
use crate::links::LinkFetcher;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Relation LDN receivers use to advertise their inbox.
pub const LDP_INBOX_REL: &str = "http://www.w3.org/ns/ldp#inbox";

/// Short form of the inbox relation.
pub const INBOX_REL: &str = "inbox";

/// WebSub hub relation.
pub const HUB_REL: &str = "hub";

/// WebSub canonical topic relation.
pub const SELF_REL: &str = "self";

/// Inbox URL a target must advertise.
pub fn inbox_url(public_base: &str, target: &str) -> String {
    format!("{public_base}/inbox?target={target}")
}

/// Hub URL a topic must advertise.
pub fn hub_url(public_base: &str) -> String {
    format!("{public_base}/hub")
}

/// Subscription request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubMode {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subscribe" => Ok(Self::Subscribe),
            "unsubscribe" => Ok(Self::Unsubscribe),
            other => Err(HubError::InvalidRequest(format!(
                "Unsupported mode {other:?}, expected \"subscribe\" or \"unsubscribe\""
            ))),
        }
    }
}

/// A structurally valid subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubRequest {
    pub callback: String,
    pub mode: HubMode,
    pub topic: String,
    pub lease_secs: u64,
}

/// Media type reduced to what negotiation compares.
#[derive(Debug, PartialEq, Eq)]
struct MediaType {
    essence: String,
    profile: Option<String>,
}

impl MediaType {
    fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_lowercase();
        let profile = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("profile")
                .then(|| value.trim().trim_matches('"').to_string())
        });
        Self { essence, profile }
    }
}

/// Validator for inbox and hub requests.
pub struct Validator {
    config: ValidationConfig,
    hub: HubConfig,
    links: LinkFetcher,
}

impl Validator {
    /// Create a new validator.
    pub fn new(config: ValidationConfig, hub: HubConfig, links: LinkFetcher) -> Self {
        Self { config, hub, links }
    }

    /// Validate the Content-Type of an inbox POST.
    pub fn validate_inbox_content_type(&self, content_type: Option<&str>) -> Result<()> {
        match_content_type(&self.config.inbox_content_types, content_type)
    }

    /// Validate the Content-Type of a hub POST.
    pub fn validate_hub_content_type(&self, content_type: Option<&str>) -> Result<()> {
        match_content_type(&self.config.hub_content_types, content_type)
    }

    /// Value of the `Accept-Post` header advertised by inboxes.
    pub fn accept_post(&self) -> String {
        self.config.inbox_content_types.join(", ")
    }

    /// Confirm that `target` advertises this hub's inbox for itself.
    ///
    /// Returns the validated target.
    pub async fn validate_target<'a>(
        &self,
        public_base: &str,
        target: Option<&'a str>,
    ) -> Result<&'a str> {
        let target = require("target", target)?;
        let expected = inbox_url(public_base, target);
        let links = self.links.fetch(target).await?;

        if links.contains(LDP_INBOX_REL, &expected) || links.contains(INBOX_REL, &expected) {
            debug!(target_url = %target, "Target valid");
            return Ok(target);
        }

        let mut advertised = links.urls(LDP_INBOX_REL);
        advertised.extend(links.urls(INBOX_REL));
        debug!(
            target_url = %target,
            expected = %expected,
            ?advertised,
            "Target does not name this inbox"
        );
        Err(HubError::InvalidTarget(if advertised.is_empty() {
            format!("{target} does not advertise an inbox")
        } else {
            format!("{target} advertises inbox {advertised:?}, expected {expected}")
        }))
    }

    /// Structural checks of a subscription request.
    ///
    /// A missing lease falls back to the configured default; leases above
    /// the configured maximum are clamped.
    pub fn check_request(
        &self,
        callback: Option<&str>,
        mode: Option<&str>,
        topic: Option<&str>,
        lease: Option<&str>,
    ) -> Result<HubRequest> {
        let callback = require("hub.callback", callback)?;
        let mode: HubMode = require("hub.mode", mode)?.parse()?;
        let topic = require("hub.topic", topic)?;

        let lease_secs = match lease.map(str::trim).filter(|l| !l.is_empty()) {
            None => self.hub.default_lease_secs,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(HubError::InvalidRequest(format!(
                        "hub.lease_seconds must be a positive integer, got {raw:?}"
                    )))
                }
            },
        };

        Ok(HubRequest {
            callback: callback.to_string(),
            mode,
            topic: topic.to_string(),
            lease_secs: lease_secs.min(self.hub.max_lease_secs),
        })
    }

    /// Confirm that `topic` names this hub as its hub and itself as self.
    pub async fn validate_topic(&self, public_base: &str, topic: &str) -> Result<()> {
        let expected_hub = hub_url(public_base);
        let links = self.links.fetch(topic).await?;

        if !links.contains(HUB_REL, &expected_hub) {
            debug!(topic = %topic, hubs = ?links.urls(HUB_REL), "Topic does not name this hub");
            return Err(HubError::InvalidTopic(format!(
                "{topic} does not advertise hub {expected_hub}"
            )));
        }

        if !links.contains(SELF_REL, topic) {
            debug!(topic = %topic, selves = ?links.urls(SELF_REL), "Topic self link mismatch");
            return Err(HubError::InvalidTopic(format!(
                "{topic} does not advertise itself as rel=\"self\""
            )));
        }

        debug!(topic = %topic, "Topic valid");
        Ok(())
    }

    /// Validate a complete subscription request.
    pub async fn validate_request(
        &self,
        public_base: &str,
        callback: Option<&str>,
        mode: Option<&str>,
        topic: Option<&str>,
        lease: Option<&str>,
    ) -> Result<HubRequest> {
        let request = self.check_request(callback, mode, topic, lease)?;
        self.validate_topic(public_base, &request.topic).await?;
        Ok(request)
    }
}

/// Require a present, non-blank parameter.
pub fn require<'a>(param: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => {
            debug!(param = %param, "Missing parameter");
            Err(HubError::missing(param))
        }
    }
}

fn match_content_type(accepted: &[String], content_type: Option<&str>) -> Result<()> {
    let actual = content_type.map(MediaType::parse);

    match &actual {
        Some(actual) if accepted.iter().any(|a| MediaType::parse(a) == *actual) => {
            debug!(content_type = ?content_type, "Content-Type valid");
            Ok(())
        }
        _ => {
            debug!(content_type = ?content_type, expected = ?accepted, "Content-Type invalid");
            Err(HubError::UnsupportedContentType {
                expected: accepted.to_vec(),
                actual: content_type.map(str::to_string),
            })
        }
    }
}
