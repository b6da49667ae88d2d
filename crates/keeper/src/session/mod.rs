// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: state machine, renewal policy, coordinator and checker.

pub mod checker;
pub mod coordinator;
pub mod policy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use coordinator::Coordinator;
pub use policy::{Renewal, RenewalInput, RenewalPolicy};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session: never logged in, logged out, or nothing restorable.
    Idle,
    /// Token held and outside every renewal window.
    Valid,
    /// Token inside a renewal window; the next check renews it.
    Expiring,
    /// A refresh or silent renewal is in flight.
    Refreshing,
    /// The session ended. Terminal until the next login.
    Unauthenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Valid => "valid",
            Self::Expiring => "expiring",
            Self::Refreshing => "refreshing",
            Self::Unauthenticated => "unauthenticated",
        };
        f.write_str(s)
    }
}

/// User preference for what happens when the session would end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionHandlingMode {
    #[default]
    AskAgain,
    /// Keep the refresh token so the session outlives restarts.
    StayLoggedIn,
    NeverAsk,
}

impl SessionHandlingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskAgain => "ask_again",
            Self::StayLoggedIn => "stay_logged_in",
            Self::NeverAsk => "never_ask",
        }
    }

    /// Whether a refresh token may be held and persisted in this mode.
    pub fn retains_refresh_token(&self) -> bool {
        matches!(self, Self::StayLoggedIn)
    }
}

impl FromStr for SessionHandlingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask_again" => Ok(Self::AskAgain),
            "stay_logged_in" => Ok(Self::StayLoggedIn),
            "never_ask" => Ok(Self::NeverAsk),
            other => anyhow::bail!("unknown session handling mode: {other}"),
        }
    }
}

/// The published access token with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: String,
    /// Expiry as milliseconds since Unix epoch.
    pub expires_at_ms: u64,
}

impl TokenSnapshot {
    /// Whole seconds of validity left at `now_ms`.
    pub fn expires_in_secs(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms) / 1000
    }
}

// Token material stays out of logs.
impl fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSnapshot")
            .field("access_token", &"<redacted>")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Lifecycle events broadcast by the [`Coordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { expires_in_secs: u64 },
    Refreshed { expires_in_secs: u64 },
    /// A renewal failed but the session survives until actual expiry.
    RefreshFailed { error: String },
    SessionExpired { reason: String },
    /// The process resumed after a suspend longer than the wake threshold.
    Resumed { elapsed_ms: u64, description: String },
    LoggedOut,
}

/// Serializable session snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
    pub mode: SessionHandlingMode,
}
