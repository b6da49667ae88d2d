// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod activity;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod navigation;
pub mod run;
pub mod session;
pub mod store;
pub mod wake;

#[cfg(test)]
pub mod test_support;

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::gate::AuthGate;
use crate::identity::{HttpIdentityProvider, IdentityProvider};
use crate::navigation::{LogNavigator, Navigator};
use crate::session::Coordinator;
use crate::store::{CredentialStore, FileBackend, MemoryBackend, StorageBackend};

pub use run::run;

static CRYPTO_INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the shared HTTP client with the given request timeout.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    ensure_crypto_provider();
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// A wired session: coordinator plus the gate that authorizes calls with it.
pub struct Keeper {
    pub coordinator: Arc<Coordinator>,
    pub gate: AuthGate,
}

impl Keeper {
    pub fn new(
        config: SessionConfig,
        store: CredentialStore,
        identity: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let coordinator = Coordinator::new(config, store, identity, navigator, clock);
        let gate = AuthGate::new(http_client(Duration::from_secs(30)), Arc::clone(&coordinator));
        Self { coordinator, gate }
    }

    /// Wire the HTTP identity provider, a logging navigator at `location`,
    /// the system clock, and a file store under the state directory (or an
    /// in-memory store when persistence is off or the context is restricted).
    pub fn from_config(config: SessionConfig, location: &str) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend: Arc<dyn StorageBackend> = if config.auth_persistence && !config.restricted {
            let dir = config.state_dir();
            debug!(dir = %dir.display(), "using file session store");
            Arc::new(
                FileBackend::open(&dir)
                    .with_context(|| format!("open session store at {}", dir.display()))?,
            )
        } else {
            Arc::new(MemoryBackend::new())
        };
        let store = CredentialStore::new(backend, Arc::clone(&clock));

        let identity = Arc::new(HttpIdentityProvider::new(&config));
        let login_urls = Arc::clone(&identity);
        let navigator =
            Arc::new(LogNavigator::new(location, move |return_to| login_urls.authorize_url(return_to)));

        Ok(Self::new(config, store, identity, navigator, clock))
    }
}
