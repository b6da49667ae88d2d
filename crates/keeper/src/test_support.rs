// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock identity provider, recording navigator,
//! in-process HTTP servers.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::clock::ManualClock;
use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::identity::{IdentityFuture, IdentityProvider, TokenResponse};
use crate::navigation::Navigator;
use crate::session::coordinator::Coordinator;
use crate::store::{CredentialStore, MemoryBackend};

/// Fixed test epoch (2023-11-14).
pub const T0: u64 = 1_700_000_000_000;

pub fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

pub fn token(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        expires_in: Some(expires_in),
    }
}

/// Scripted identity provider with call counters.
///
/// Each call pops the next scripted outcome (the last one repeats). When
/// built with [`MockIdentity::held`], refresh and silent renewal block until
/// [`MockIdentity::release`] is called, so tests can pile up concurrent waiters.
#[derive(Default)]
pub struct MockIdentity {
    outcomes: Mutex<VecDeque<Result<TokenResponse, RefreshError>>>,
    last: Mutex<Option<Result<TokenResponse, RefreshError>>>,
    pub exchange_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub silent_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    gate: Option<Semaphore>,
}

impl MockIdentity {
    pub fn new(outcomes: Vec<Result<TokenResponse, RefreshError>>) -> Self {
        Self { outcomes: Mutex::new(outcomes.into()), ..Default::default() }
    }

    pub fn held(outcomes: Vec<Result<TokenResponse, RefreshError>>) -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Self::new(outcomes) }
    }

    /// Let held calls proceed.
    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn renewals(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst) + self.silent_calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<TokenResponse, RefreshError> {
        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let popped = self.outcomes.lock().pop_front();
        match popped {
            Some(outcome) => {
                *self.last.lock() = Some(outcome.clone());
                outcome
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(|| Err(RefreshError::Transient("no scripted outcome".into()))),
        }
    }
}

impl IdentityProvider for MockIdentity {
    fn exchange_code<'a>(
        &'a self,
        _code: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let popped = self.outcomes.lock().pop_front();
            popped.unwrap_or_else(|| Err(RefreshError::Transient("no scripted outcome".into())))
        })
    }

    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(self.next())
    }

    fn silent_renew<'a>(
        &'a self,
        _access_token: &'a str,
    ) -> IdentityFuture<'a, Result<TokenResponse, RefreshError>> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(self.next())
    }

    fn logout<'a>(&'a self, _token: Option<&'a str>) -> IdentityFuture<'a, anyhow::Result<()>> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn authorize_url(&self, return_to: &str) -> Option<String> {
        Some(format!("https://id.example.com/authorize?state={return_to}"))
    }
}

/// Navigator that records every request.
pub struct RecordingNavigator {
    pub location: Mutex<String>,
    pub expired: Mutex<Vec<String>>,
    pub logins: Mutex<Vec<String>>,
    pub visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(location: &str) -> Self {
        Self {
            location: Mutex::new(location.to_owned()),
            expired: Mutex::new(Vec::new()),
            logins: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
        }
    }
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> String {
        self.location.lock().clone()
    }

    fn session_expired(&self, return_to: &str) {
        self.expired.lock().push(return_to.to_owned());
    }

    fn begin_login(&self, return_to: &str) {
        self.logins.lock().push(return_to.to_owned());
    }

    fn navigate(&self, path: &str) {
        self.visited.lock().push(path.to_owned());
        *self.location.lock() = path.to_owned();
    }
}

/// Everything a coordinator test needs, wired to a manual clock.
pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub identity: Arc<MockIdentity>,
    pub navigator: Arc<RecordingNavigator>,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryBackend>,
    pub store: CredentialStore,
}

impl Harness {
    pub fn new(config: SessionConfig, identity: MockIdentity) -> Self {
        Self::with_backend(config, identity, Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(
        config: SessionConfig,
        identity: MockIdentity,
        backend: Arc<MemoryBackend>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let store = CredentialStore::new(Arc::clone(&backend) as _, Arc::clone(&clock) as _);
        let identity = Arc::new(identity);
        let navigator = Arc::new(RecordingNavigator::at("/projects/42"));
        let coordinator = Coordinator::new(
            config,
            store.clone(),
            Arc::clone(&identity) as _,
            Arc::clone(&navigator) as _,
            Arc::clone(&clock) as _,
        );
        Self { coordinator, identity, navigator, clock, backend, store }
    }
}

/// Serve an axum app on an ephemeral local port.
pub async fn spawn_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

/// A mock OAuth token endpoint returning configurable responses.
pub struct MockTokenServer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    pub bodies: Arc<Mutex<Vec<String>>>,
}

impl MockTokenServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Start a mock OAuth server answering `POST /token`, `/renew` and `/logout`
/// from one shared response script (the last response repeats).
pub async fn mock_token_server(responses: Vec<(u16, String)>) -> MockTokenServer {
    let calls = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let responses = Arc::new(responses);

    let handler = {
        let calls = Arc::clone(&calls);
        let bodies = Arc::clone(&bodies);
        move |body: String| {
            let calls = Arc::clone(&calls);
            let bodies = Arc::clone(&bodies);
            let resps = Arc::clone(&responses);
            async move {
                let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                bodies.lock().push(body);
                let (status, body) = resps
                    .get(idx)
                    .or_else(|| resps.last())
                    .cloned()
                    .unwrap_or((500, "{}".to_owned()));
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    body,
                )
            }
        }
    };

    let app = Router::new()
        .route("/token", post(handler.clone()))
        .route("/renew", post(handler.clone()))
        .route("/logout", post(handler));
    let addr = spawn_app(app).await;
    MockTokenServer { addr, calls, bodies }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
