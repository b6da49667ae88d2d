// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP identity provider speaking form-encoded OAuth2.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use super::{IdentityFuture, IdentityProvider, TokenErrorResponse, TokenResponse};
use crate::config::SessionConfig;
use crate::error::RefreshError;

/// OAuth error codes that mean the credential will never work again.
const REVOKED_ERRORS: &[&str] = &["invalid_grant", "login_required", "invalid_token"];

pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    token_url: Option<String>,
    silent_renew_url: Option<String>,
    logout_url: Option<String>,
    authorize_url: Option<String>,
    client_id: String,
    redirect_uri: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            http_client: crate::http_client(Duration::from_secs(30)),
            token_url: config.token_url.clone(),
            silent_renew_url: config.silent_renew_url.clone(),
            logout_url: config.logout_url.clone(),
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    async fn post_token_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<TokenResponse, RefreshError> {
        let mut req = self.http_client.post(url).form(form);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp =
            req.send().await.map_err(|e| RefreshError::Transient(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body =
            resp.text().await.map_err(|e| RefreshError::Transient(format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))
    }
}

impl IdentityProvider for HttpIdentityProvider {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        Box::pin(async move {
            let token_url = self
                .token_url
                .as_deref()
                .ok_or_else(|| RefreshError::Transient("no token_url configured".into()))?;
            let mut form = vec![
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code),
            ];
            if let Some(ref redirect_uri) = self.redirect_uri {
                form.push(("redirect_uri", redirect_uri.as_str()));
            }
            self.post_token_form(token_url, &form, None).await
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        Box::pin(async move {
            let token_url = self
                .token_url
                .as_deref()
                .ok_or_else(|| RefreshError::Transient("no token_url configured".into()))?;
            let form = [
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ];
            self.post_token_form(token_url, &form, None).await
        })
    }

    fn silent_renew<'a>(
        &'a self,
        access_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        Box::pin(async move {
            let url = self
                .silent_renew_url
                .as_deref()
                .ok_or_else(|| RefreshError::Transient("no silent_renew_url configured".into()))?;
            let form = [("client_id", self.client_id.as_str()), ("prompt", "none")];
            self.post_token_form(url, &form, Some(access_token)).await
        })
    }

    fn logout<'a>(&'a self, token: Option<&'a str>) -> IdentityFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let Some(ref url) = self.logout_url else {
                debug!("no logout_url configured, skipping provider logout");
                return Ok(());
            };
            let mut form = vec![("client_id", self.client_id.as_str())];
            if let Some(token) = token {
                form.push(("token", token));
            }
            let resp = self.http_client.post(url).form(&form).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                warn!(%status, "provider logout rejected");
                anyhow::bail!("logout failed ({status})");
            }
            Ok(())
        })
    }

    fn authorize_url(&self, return_to: &str) -> Option<String> {
        let base = self.authorize_url.as_deref()?;
        let mut url = match Url::parse(base) {
            Ok(u) => u,
            Err(e) => {
                warn!(err = %e, "invalid authorize_url");
                return None;
            }
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            if let Some(ref redirect_uri) = self.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            query.append_pair("state", return_to);
        }
        Some(url.into())
    }
}

/// Map a non-success token endpoint response onto the refresh error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> RefreshError {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
        if REVOKED_ERRORS.contains(&err.error.as_str()) {
            return RefreshError::Revoked(err.error_description.unwrap_or(err.error));
        }
        return RefreshError::Transient(format!(
            "{}: {}",
            err.error,
            err.error_description.unwrap_or_default()
        ));
    }
    if status == StatusCode::UNAUTHORIZED {
        return RefreshError::Revoked(format!("HTTP {status}"));
    }
    RefreshError::Transient(format!("HTTP {status}"))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
