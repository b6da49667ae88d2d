// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity provider boundary: code exchange, refresh, silent renewal, logout.
//!
//! The provider is an opaque remote collaborator. The coordinator only needs
//! the token shape back and a classification of failures into revoked
//! (deterministic) and transient.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::RefreshError;

pub use http::HttpIdentityProvider;

/// Boxed future returned by [`IdentityProvider`] methods.
pub type IdentityFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// OAuth error response from the provider.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for a token pair.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>>;

    /// Obtain a new access token with a refresh token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>>;

    /// Re-assert the existing provider session without user interaction.
    fn silent_renew<'a>(
        &'a self,
        access_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>>;

    /// End the provider session. Best effort.
    fn logout<'a>(&'a self, token: Option<&'a str>) -> IdentityFuture<'a, anyhow::Result<()>>;

    /// Interactive login URL carrying `return_to` as the post-login target.
    fn authorize_url(&self, return_to: &str) -> Option<String>;
}
