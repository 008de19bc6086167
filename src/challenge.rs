// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Subscriber intent verification.
//!
//! Before a (un)subscription is committed the hub asks the callback to
//! echo a fresh random challenge. Only a callback that cooperates can be
//! subscribed, so third parties cannot point the hub at a victim.

use crate::error::{HubError, Result};
use crate::validator::HubRequest;
use rand::RngCore;
use tracing::debug;

/// Random bytes per challenge (hex-encoded on the wire).
pub const CHALLENGE_BYTES: usize = 32;

/// Generate a fresh hex-encoded challenge from the OS RNG.
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Performs the challenge round trip against subscriber callbacks.
#[derive(Debug, Clone)]
pub struct ChallengeVerifier {
    client: reqwest::Client,
}

impl ChallengeVerifier {
    /// Create a verifier on top of a configured client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Confirm the callback's intent for `request`.
    ///
    /// Succeeds only on a 2xx response whose body equals the challenge
    /// byte for byte.
    pub async fn verify(&self, request: &HubRequest) -> Result<()> {
        let challenge = generate_challenge();
        let lease = request.lease_secs.to_string();

        let response = self
            .client
            .get(&request.callback)
            .query(&[
                ("hub.mode", request.mode.as_str()),
                ("hub.topic", request.topic.as_str()),
                ("hub.challenge", challenge.as_str()),
                ("hub.lease_seconds", lease.as_str()),
            ])
            .send()
            .await
            .map_err(|e| failed(request, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(request, format!("callback responded with {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| failed(request, e.to_string()))?;

        if body.as_ref() != challenge.as_bytes() {
            debug!(callback = %request.callback, "Challenge not echoed");
            return Err(failed(request, "challenge mismatch"));
        }

        debug!(callback = %request.callback, mode = %request.mode, "Callback verified");
        Ok(())
    }
}

fn failed(request: &HubRequest, reason: impl Into<String>) -> HubError {
    HubError::VerificationFailed {
        callback: request.callback.clone(),
        reason: reason.into(),
    }
}
