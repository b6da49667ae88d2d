// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renewal policy: decides, from a snapshot of the session, whether to
//! refresh, silently renew, expire, or leave the token alone.

use std::time::Duration;

use crate::config::SessionConfig;

/// What the coordinator should do with the current token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Nothing to do.
    Hold,
    /// Renew with the refresh token.
    Refresh,
    /// Re-assert the provider session without user interaction.
    SilentRenew,
    /// The token has expired and cannot be renewed.
    Expire,
}

/// Inputs to one policy decision.
#[derive(Debug, Clone, Copy)]
pub struct RenewalInput {
    pub now_ms: u64,
    pub expires_at_ms: Option<u64>,
    pub has_refresh_token: bool,
    pub idle_minutes: f64,
    pub last_attempt_ms: Option<u64>,
    /// Re-sync after a wake: ignore the renewal windows and the debounce.
    pub force: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RenewalPolicy {
    refresh_window: Duration,
    min_validity: Duration,
    idle_ceiling_minutes: f64,
    debounce: Duration,
}

impl RenewalPolicy {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            refresh_window: config.refresh_window(),
            min_validity: config.silent_renew_min_validity(),
            idle_ceiling_minutes: config.idle_ceiling_minutes(),
            debounce: config.renewal_debounce(),
        }
    }

    pub fn decide(&self, input: &RenewalInput) -> Renewal {
        let Some(expires_at_ms) = input.expires_at_ms else {
            return if input.has_refresh_token { Renewal::Refresh } else { Renewal::Hold };
        };
        let remaining = Duration::from_millis(expires_at_ms.saturating_sub(input.now_ms));
        let expired = input.now_ms >= expires_at_ms;

        // A refresh token renews regardless of activity.
        if input.has_refresh_token {
            if input.force || expired || remaining <= self.refresh_window {
                return Renewal::Refresh;
            }
            return Renewal::Hold;
        }

        let in_window = input.force || remaining <= self.min_validity;
        let active = input.idle_minutes < self.idle_ceiling_minutes;
        let debounced = input.force
            || input.last_attempt_ms.is_none_or(|at| {
                input.now_ms.saturating_sub(at) >= self.debounce.as_millis() as u64
            });

        if in_window && active && debounced {
            Renewal::SilentRenew
        } else if expired {
            Renewal::Expire
        } else {
            Renewal::Hold
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
