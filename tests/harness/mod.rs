// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for end-to-end hub scenarios.
//!
//! Spins up a hub on an ephemeral port and mock servers standing in for
//! the resources (targets and topics) and the subscribers around it.

#![allow(dead_code)]

/// Poll a condition, which may `.await`, until it holds or five seconds pass.
macro_rules! eventually {
    ($condition:expr) => {
        async {
            for _ in 0..100 {
                if $condition {
                    return true;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            false
        }
        .await
    };
}

pub mod hub;
pub mod resources;

use std::time::Duration;

/// Give background tasks a moment to act (or to prove they did not).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
