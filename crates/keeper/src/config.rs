// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Command-line entry point for the `keeper` binary.
#[derive(Debug, Parser)]
#[command(name = "keeper", version, about = "Keeps a bearer session alive against an identity provider")]
pub struct Cli {
    #[command(flatten)]
    pub config: SessionConfig,

    /// Log format (json or text).
    #[arg(long, global = true, env = "KEEPER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "KEEPER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Exchange an authorization code for a session and persist it.
    Login {
        /// Authorization code returned by the identity provider.
        #[arg(long)]
        code: String,
        /// Keep the refresh token so the session survives restarts.
        #[arg(long)]
        stay_logged_in: bool,
        /// Location to return to after login.
        #[arg(long)]
        return_to: Option<String>,
    },
    /// Restore (or log in) and keep the session alive until interrupted.
    Run {
        /// Optional authorization code to log in with before running.
        #[arg(long)]
        code: Option<String>,
        /// Keep the refresh token when logging in with `--code`.
        #[arg(long)]
        stay_logged_in: bool,
    },
    /// Print the restored session status and liveness probe result.
    Status,
    /// Log out and clear the persisted session secrets.
    Logout,
    /// Print the interactive login URL.
    AuthorizeUrl {
        /// Location to return to after login.
        #[arg(long)]
        return_to: Option<String>,
    },
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Enable authorization. When disabled the gate passes every call through.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "KEEPER_AUTH_ENABLED")]
    pub auth_enabled: bool,

    /// Persist the session across restarts.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "KEEPER_AUTH_PERSISTENCE")]
    pub auth_persistence: bool,

    /// Session timeout in minutes. Half of it is the idle ceiling for silent renewal.
    #[arg(long, default_value_t = 60, env = "KEEPER_SESSION_TIMEOUT_MINUTES")]
    pub session_timeout_minutes: u64,

    /// Minutes before expiry at which a refresh-token renewal happens.
    #[arg(long, default_value_t = 2, env = "KEEPER_REFRESH_WINDOW_MINUTES")]
    pub refresh_window_minutes: u64,

    /// Silent renewal is only attempted once remaining validity drops to this many minutes.
    #[arg(long, default_value_t = 10, env = "KEEPER_SILENT_RENEW_MIN_VALIDITY_MINUTES")]
    pub silent_renew_min_validity_minutes: u64,

    /// Minimum minutes between two silent renewal attempts.
    #[arg(long, default_value_t = 4, env = "KEEPER_RENEWAL_DEBOUNCE_MINUTES")]
    pub renewal_debounce_minutes: u64,

    /// Periodic liveness check interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "KEEPER_LIVENESS_CHECK_MS")]
    pub liveness_check_ms: u64,

    /// Wake detection tick interval in milliseconds.
    #[arg(long, default_value_t = 10000, env = "KEEPER_WAKE_CHECK_MS")]
    pub wake_check_ms: u64,

    /// Gap beyond the wake tick interval that counts as a suspend/resume.
    #[arg(long, default_value_t = 5000, env = "KEEPER_WAKE_TOLERANCE_MS")]
    pub wake_tolerance_ms: u64,

    /// Restricted (public/embedded) context: activity is never persisted and
    /// idle logout never fires.
    #[arg(long, env = "KEEPER_RESTRICTED")]
    pub restricted: bool,

    /// Base URL of the protected backend. Calls outside it are not authorized.
    #[arg(long, env = "KEEPER_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Path (under the API base URL) of the "who am I" liveness probe.
    #[arg(long, default_value = "/api/v1/users/me", env = "KEEPER_LIVENESS_PATH")]
    pub liveness_path: String,

    /// Identity provider token endpoint (code exchange and refresh).
    #[arg(long, env = "KEEPER_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Identity provider silent renewal endpoint.
    #[arg(long, env = "KEEPER_SILENT_RENEW_URL")]
    pub silent_renew_url: Option<String>,

    /// Identity provider logout endpoint.
    #[arg(long, env = "KEEPER_LOGOUT_URL")]
    pub logout_url: Option<String>,

    /// Identity provider interactive authorization endpoint.
    #[arg(long, env = "KEEPER_AUTHORIZE_URL")]
    pub authorize_url: Option<String>,

    /// OAuth client ID.
    #[arg(long, default_value = "keeper", env = "KEEPER_CLIENT_ID")]
    pub client_id: String,

    /// OAuth redirect URI registered with the identity provider.
    #[arg(long, env = "KEEPER_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Directory for persisted session state.
    #[arg(long, env = "KEEPER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_enabled: true,
            auth_persistence: true,
            session_timeout_minutes: 60,
            refresh_window_minutes: 2,
            silent_renew_min_validity_minutes: 10,
            renewal_debounce_minutes: 4,
            liveness_check_ms: 5000,
            wake_check_ms: 10000,
            wake_tolerance_ms: 5000,
            restricted: false,
            api_base_url: None,
            liveness_path: "/api/v1/users/me".to_owned(),
            token_url: None,
            silent_renew_url: None,
            logout_url: None,
            authorize_url: None,
            client_id: "keeper".to_owned(),
            redirect_uri: None,
            state_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn liveness_check_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_check_ms)
    }

    pub fn wake_check_interval(&self) -> Duration {
        Duration::from_millis(self.wake_check_ms)
    }

    /// Gap between two wake ticks above which a suspend is assumed.
    pub fn wake_threshold(&self) -> Duration {
        Duration::from_millis(self.wake_check_ms + self.wake_tolerance_ms)
    }

    pub fn refresh_window(&self) -> Duration {
        minutes(self.refresh_window_minutes)
    }

    pub fn silent_renew_min_validity(&self) -> Duration {
        minutes(self.silent_renew_min_validity_minutes)
    }

    pub fn renewal_debounce(&self) -> Duration {
        minutes(self.renewal_debounce_minutes)
    }

    /// Idle ceiling for silent renewal: half the session timeout.
    pub fn idle_ceiling_minutes(&self) -> f64 {
        self.session_timeout_minutes as f64 / 2.0
    }

    /// Absolute URL of the liveness probe, if a backend is configured.
    pub fn liveness_url(&self) -> Option<String> {
        let base = self.api_base_url.as_deref()?;
        Some(format!("{}{}", base.trim_end_matches('/'), self.liveness_path))
    }

    /// Resolve the state directory for persisted session data.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/keeper`,
    /// then `$HOME/.local/state/keeper`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("keeper");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/keeper");
        }
        PathBuf::from(".keeper")
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
