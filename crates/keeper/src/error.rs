// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Outcome of a failed refresh or silent renewal.
///
/// Cloneable so one settled single-flight refresh can hand the same error to
/// every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The identity provider rejected the credential deterministically
    /// (`invalid_grant`). Never retried.
    #[error("refresh token revoked: {0}")]
    Revoked(String),
    /// Network failure or unexpected provider response. The next periodic
    /// check retries while the token is still valid.
    #[error("refresh failed: {0}")]
    Transient(String),
    /// Neither a refresh token nor a renewable access token is held.
    #[error("no credentials to renew")]
    NoCredentials,
    /// The session was logged out while the refresh was in flight.
    #[error("session ended during refresh")]
    Cancelled,
}

impl RefreshError {
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked(_))
    }
}

/// Errors surfaced by [`crate::gate::AuthGate::send`].
#[derive(Debug, Error)]
pub enum GateError {
    /// The request could not be dispatched or the response not received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend rejected the call and no recovery applied. The original
    /// response is handed back untouched.
    #[error("unauthorized ({})", .0.status())]
    Unauthorized(reqwest::Response),
    /// The backend rejected the call and interactive login was started.
    #[error("interactive login required")]
    LoginRequired {
        /// Location remembered as the post-login redirect target.
        return_to: String,
    },
}

impl GateError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Unauthorized(resp) => Some(resp.status().as_u16()),
            Self::LoginRequired { .. } => Some(401),
        }
    }
}
