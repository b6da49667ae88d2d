// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation boundary: where the user is, and where the session sends them.

use parking_lot::Mutex;
use tracing::{info, warn};

/// Route prefixes that belong to the authentication flow itself.
const AUTH_EXEMPT_PREFIXES: &[&str] =
    &["/login", "/logout", "/session-expired", "/session", "/agreement"];

/// Page routing as seen by the session lifecycle.
pub trait Navigator: Send + Sync {
    /// Current location (path plus query), used as the return target.
    fn current_location(&self) -> String;

    /// Show the session-expired surface, remembering where the user was.
    fn session_expired(&self, return_to: &str);

    /// Start interactive login, returning to `return_to` afterwards.
    fn begin_login(&self, return_to: &str);

    /// Move to `path` (post-login redirect).
    fn navigate(&self, path: &str);
}

/// Whether `location` is part of the authentication flow, where session
/// expiry and wake re-sync must not redirect.
pub fn is_auth_exempt(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    AUTH_EXEMPT_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Navigator for headless use: tracks a location and logs every request.
pub struct LogNavigator {
    location: Mutex<String>,
    authorize_url: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl LogNavigator {
    pub fn new(
        location: impl Into<String>,
        authorize_url: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self { location: Mutex::new(location.into()), authorize_url: Box::new(authorize_url) }
    }
}

impl Navigator for LogNavigator {
    fn current_location(&self) -> String {
        self.location.lock().clone()
    }

    fn session_expired(&self, return_to: &str) {
        warn!(return_to, "session expired, sign in again");
        *self.location.lock() = "/session-expired".to_owned();
    }

    fn begin_login(&self, return_to: &str) {
        match (self.authorize_url)(return_to) {
            Some(url) => info!(return_to, %url, "interactive login required"),
            None => warn!(return_to, "interactive login required but no authorize_url configured"),
        }
    }

    fn navigate(&self, path: &str) {
        info!(path, "navigate");
        *self.location.lock() = path.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        login = { "/login", true },
        login_query = { "/login?next=%2F", true },
        logout = { "/logout", true },
        session = { "/session", true },
        session_sub = { "/session/callback", true },
        session_expired = { "/session-expired", true },
        agreement = { "/agreement", true },
        root = { "/", false },
        project = { "/projects/42", false },
        lookalike = { "/loginhelp", false },
        sessions_list = { "/sessions", false },
    )]
    fn exempt_locations(location: &str, expected: bool) {
        assert_eq!(is_auth_exempt(location), expected);
    }

    #[test]
    fn log_navigator_tracks_location() {
        let nav = LogNavigator::new("/projects/1", |_| None);
        nav.navigate("/projects/2");
        assert_eq!(nav.current_location(), "/projects/2");
        nav.session_expired("/projects/2");
        assert_eq!(nav.current_location(), "/session-expired");
    }
}
