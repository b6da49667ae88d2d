// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization call gate.
//!
//! Attaches the current token to every protected backend call. A 401 leads
//! to at most one coordinated refresh and at most one retry; if that does not
//! recover, the caller either gets interactive login started for them or the
//! original response back.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{Request, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GateError;
use crate::session::Coordinator;

/// Result of the "who am I" probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// The backend accepted the session.
    Accepted,
    /// The backend rejected the session.
    Rejected,
    /// No answer, an unexpected status, or no backend configured.
    Unreachable,
}

pub struct AuthGate {
    client: reqwest::Client,
    coordinator: Arc<Coordinator>,
    /// Parsed `api_base_url`; `None` protects nothing.
    api_base: Option<Url>,
    /// Location interactive login was last started for.
    login_requested_for: Mutex<Option<String>>,
}

impl AuthGate {
    pub fn new(client: reqwest::Client, coordinator: Arc<Coordinator>) -> Self {
        let api_base = coordinator.config().api_base_url.as_deref().and_then(|base| {
            Url::parse(base)
                .inspect_err(|e| warn!(base, err = %e, "invalid api_base_url, no calls are protected"))
                .ok()
        });
        Self { client, coordinator, api_base, login_requested_for: Mutex::new(None) }
    }

    /// Dispatch `request`, authorizing it if it targets the protected backend.
    pub async fn send(&self, request: Request) -> Result<Response, GateError> {
        let config = self.coordinator.config();
        if !config.auth_enabled || !self.is_protected(request.url()) {
            return Ok(self.client.execute(request).await?);
        }
        let is_probe = self.is_liveness_probe(request.url());
        let retry = request.try_clone();

        let token = self.coordinator.current_token().map(|t| t.access_token);
        let response = self.dispatch(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            self.login_requested_for.lock().take();
            return Ok(response);
        }
        debug!(url = %response.url(), "backend rejected token");

        if self.coordinator.has_refresh_token() {
            match retry {
                Some(retry) => match self.coordinator.refresh_rejected(token.as_deref()).await {
                    Ok(fresh) => {
                        debug!("retrying with renewed token");
                        return Ok(self.dispatch(retry, Some(&fresh.access_token)).await?);
                    }
                    Err(e) => debug!(err = %e, "refresh after rejection failed"),
                },
                None => warn!("request body not replayable, skipping refresh-and-retry"),
            }
        }

        if self.coordinator.is_locally_valid() && !is_probe {
            let return_to = self.coordinator.navigator().current_location();
            self.request_login(&return_to);
            return Err(GateError::LoginRequired { return_to });
        }
        Err(GateError::Unauthorized(response))
    }

    /// GET `url` through the gate.
    pub async fn get(&self, url: &str) -> Result<Response, GateError> {
        let request = self.client.get(url).build()?;
        self.send(request).await
    }

    /// Ask the backend who we are.
    pub async fn probe_liveness(&self) -> Liveness {
        let Some(url) = self.coordinator.config().liveness_url() else {
            debug!("no api_base_url configured, liveness unknown");
            return Liveness::Unreachable;
        };
        match self.get(&url).await {
            Ok(resp) if resp.status().is_success() => Liveness::Accepted,
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => Liveness::Rejected,
            Ok(resp) => {
                debug!(status = %resp.status(), "unexpected liveness status");
                Liveness::Unreachable
            }
            Err(GateError::Unauthorized(_) | GateError::LoginRequired { .. }) => Liveness::Rejected,
            Err(GateError::Transport(e)) => {
                debug!(err = %e, "liveness probe failed");
                Liveness::Unreachable
            }
        }
    }

    async fn dispatch(&self, request: Request, token: Option<&str>) -> Result<Response, GateError> {
        let mut builder = RequestBuilder::from_parts(self.client.clone(), request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }

    /// Start interactive login once per location.
    fn request_login(&self, return_to: &str) {
        let mut last = self.login_requested_for.lock();
        if last.as_deref() == Some(return_to) {
            debug!(return_to, "interactive login already requested");
            return;
        }
        *last = Some(return_to.to_owned());
        drop(last);
        info!(return_to, "starting interactive login");
        self.coordinator.navigator().begin_login(return_to);
    }

    fn is_protected(&self, url: &Url) -> bool {
        self.api_base.as_ref().is_some_and(|base| is_under(base, url))
    }

    fn is_liveness_probe(&self, url: &Url) -> bool {
        let Some(probe) = self.coordinator.config().liveness_url() else {
            return false;
        };
        let mut target = url.clone();
        target.set_query(None);
        target.set_fragment(None);
        target.as_str() == probe
    }
}

/// Whether `url` shares `base`'s origin and sits at or below its path,
/// matching whole path segments.
fn is_under(base: &Url, url: &Url) -> bool {
    if url.origin() != base.origin() {
        return false;
    }
    let base_path = base.path().trim_end_matches('/');
    url.path()
        .strip_prefix(base_path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
