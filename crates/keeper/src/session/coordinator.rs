// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle coordinator.
//!
//! Owns the single in-memory session, commits every token change to the
//! credential store, publishes the current token on a watch channel and
//! lifecycle events on a broadcast channel. Refresh and silent renewal are
//! single-flight: concurrent callers share one spawned provider call and
//! observe the identical outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checker::spawn_checker;
use super::policy::{Renewal, RenewalInput, RenewalPolicy};
use super::{SessionEvent, SessionHandlingMode, SessionState, SessionStatus, TokenSnapshot};
use crate::activity::ActivityTracker;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::identity::{IdentityProvider, TokenResponse};
use crate::navigation::{is_auth_exempt, Navigator};
use crate::store::{CredentialStore, StoreKey};
use crate::wake::spawn_wake_coordinator;

/// Token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 64;

type RefreshOutcome = Result<TokenSnapshot, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Which provider call renews the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    RefreshToken,
    SilentRenew,
}

/// The one pending refresh. Cleared by its own task once it settles.
struct InFlight {
    id: u64,
    outcome: SharedRefresh,
}

enum Join {
    Ready(RefreshOutcome),
    Wait(SharedRefresh),
}

#[derive(Default)]
struct Session {
    access_token: Option<String>,
    expires_at_ms: Option<u64>,
    refresh_token: Option<String>,
    mode: SessionHandlingMode,
}

impl Session {
    fn snapshot(&self) -> Option<TokenSnapshot> {
        Some(TokenSnapshot {
            access_token: self.access_token.clone()?,
            expires_at_ms: self.expires_at_ms?,
        })
    }

    fn clear_secrets(&mut self) {
        self.access_token = None;
        self.expires_at_ms = None;
        self.refresh_token = None;
    }

    /// Install a provider token. The refresh token is kept only when the
    /// mode allows it; a response without one keeps the current one.
    fn apply(&mut self, token: TokenResponse, now_ms: u64) -> TokenSnapshot {
        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at_ms = now_ms + lifetime * 1000;
        if !self.mode.retains_refresh_token() {
            self.refresh_token = None;
        } else if let Some(rt) = token.refresh_token {
            self.refresh_token = Some(rt);
        }
        self.access_token = Some(token.access_token.clone());
        self.expires_at_ms = Some(expires_at_ms);
        TokenSnapshot { access_token: token.access_token, expires_at_ms }
    }
}

struct Inner {
    session: Session,
    state: SessionState,
    /// Bumped whenever the session is replaced or ended. A refresh started
    /// under an older epoch discards its result.
    epoch: u64,
    last_attempt_ms: Option<u64>,
}

pub struct Coordinator {
    config: SessionConfig,
    policy: RenewalPolicy,
    store: CredentialStore,
    identity: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    activity: ActivityTracker,
    inner: Mutex<Inner>,
    in_flight: Mutex<Option<InFlight>>,
    next_flight_id: AtomicU64,
    token_tx: watch::Sender<Option<TokenSnapshot>>,
    event_tx: broadcast::Sender<SessionEvent>,
    timers: Mutex<Option<CancellationToken>>,
}

impl Coordinator {
    pub fn new(
        config: SessionConfig,
        store: CredentialStore,
        identity: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let activity = ActivityTracker::new(store.clone(), Arc::clone(&clock), config.restricted);
        let (token_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            policy: RenewalPolicy::new(&config),
            config,
            store,
            identity,
            navigator,
            clock,
            activity,
            inner: Mutex::new(Inner {
                session: Session::default(),
                state: SessionState::Idle,
                epoch: 0,
                last_attempt_ms: None,
            }),
            in_flight: Mutex::new(None),
            next_flight_id: AtomicU64::new(1),
            token_tx,
            event_tx,
            timers: Mutex::new(None),
        })
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Exchange an authorization code for a session, persist and publish it,
    /// then navigate to `return_to` if given.
    pub async fn login(
        &self,
        code: &str,
        mode: SessionHandlingMode,
        return_to: Option<&str>,
    ) -> anyhow::Result<TokenSnapshot> {
        let token = self.identity.exchange_code(code).await.context("code exchange failed")?;
        let now = self.clock.now_ms();

        let snapshot = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.last_attempt_ms = None;
            inner.session = Session { mode, ..Session::default() };
            let snapshot = inner.session.apply(token, now);
            inner.state = SessionState::Valid;
            self.persist(&inner.session);
            self.publish(Some(snapshot.clone()));
            snapshot
        };
        self.in_flight.lock().take();
        self.activity.touch();

        let expires_in_secs = snapshot.expires_in_secs(now);
        info!(expires_in_secs, mode = mode.as_str(), "logged in");
        self.emit(SessionEvent::LoggedIn { expires_in_secs });

        if let Some(path) = return_to {
            self.navigator.navigate(path);
        }
        Ok(snapshot)
    }

    /// Load the persisted session at startup.
    ///
    /// A non-expired token restores as `Valid`. An expired token with a
    /// refresh token restores as `Expiring` so the next check refreshes it.
    /// Anything else restores as `Idle` and the stale secrets are removed.
    pub fn restore(&self) -> SessionState {
        if !self.config.auth_persistence {
            debug!("persistence disabled, nothing to restore");
            return self.state();
        }
        let now = self.clock.now_ms();

        let mode = self
            .store
            .get(StoreKey::SessionHandlingMode)
            .and_then(|raw| match raw.parse::<SessionHandlingMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!(err = %e, "ignoring stored session handling mode");
                    None
                }
            })
            .unwrap_or_default();
        let access_token = self.store.get(StoreKey::AccessToken);
        let expires_at_ms = self.store.get(StoreKey::Expiry).and_then(|v| v.parse::<u64>().ok());
        let stored_refresh = self.store.get(StoreKey::RefreshToken);
        let refresh_token = stored_refresh.clone().filter(|_| mode.retains_refresh_token());

        let (access_token, expires_at_ms) = match (access_token, expires_at_ms) {
            (Some(at), Some(exp)) => (Some(at), Some(exp)),
            _ => (None, None),
        };
        let state = if expires_at_ms.is_some_and(|exp| now < exp) {
            SessionState::Valid
        } else if refresh_token.is_some() {
            SessionState::Expiring
        } else {
            SessionState::Idle
        };

        let mut session = Session { access_token, expires_at_ms, refresh_token, mode };
        if state == SessionState::Idle {
            session.clear_secrets();
            if let Err(e) = self.store.clear_secrets() {
                warn!(err = %e, "failed to remove stale session secrets");
            }
        } else if stored_refresh.is_some() && session.refresh_token.is_none() {
            if let Err(e) = self.store.remove(StoreKey::RefreshToken) {
                warn!(err = %e, "failed to remove refresh token");
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.last_attempt_ms = None;
            inner.session = session;
            inner.state = state;
            self.publish(inner.session.snapshot());
        }
        info!(%state, mode = mode.as_str(), "session restored");
        state
    }

    /// End the session: stop timers, discard any in-flight refresh, clear
    /// memory and store, and tell the provider (best effort).
    pub async fn logout(&self) {
        self.stop();
        let token = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.last_attempt_ms = None;
            inner.state = SessionState::Idle;
            let token = inner.session.access_token.take();
            inner.session.clear_secrets();
            if let Err(e) = self.store.clear_secrets() {
                warn!(err = %e, "failed to clear stored session");
            }
            self.publish(None);
            token
        };
        self.in_flight.lock().take();

        if let Err(e) = self.identity.logout(token.as_deref()).await {
            warn!(err = %e, "provider logout failed");
        }
        info!("logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    /// Forget the session-handling preference, in memory and in the store.
    pub fn reset_session_handling(&self) {
        {
            let mut inner = self.inner.lock();
            inner.session.mode = SessionHandlingMode::AskAgain;
            inner.session.refresh_token = None;
        }
        if let Err(e) = self.store.clear_all() {
            warn!(err = %e, "failed to clear stored session");
        }
        info!("session handling preference reset");
    }

    // -- Renewal --------------------------------------------------------------

    /// Single-flight refresh with the refresh token.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        self.renew(Grant::RefreshToken, None).await
    }

    /// Refresh after the backend rejected `rejected`. If the session already
    /// moved past that token, the current one is returned without a new
    /// provider call. `None` (no token was attached) always refreshes.
    pub async fn refresh_rejected(self: &Arc<Self>, rejected: Option<&str>) -> RefreshOutcome {
        self.renew(Grant::RefreshToken, rejected).await
    }

    /// Periodic check: apply the renewal policy to the current session.
    pub async fn check(self: &Arc<Self>) {
        self.evaluate(false).await;
    }

    /// Immediate re-sync after a wake, bypassing renewal windows and debounce.
    pub async fn resync(self: &Arc<Self>) {
        self.evaluate(true).await;
    }

    async fn evaluate(self: &Arc<Self>, force: bool) {
        let decision = {
            let mut inner = self.inner.lock();
            if matches!(
                inner.state,
                SessionState::Idle | SessionState::Refreshing | SessionState::Unauthenticated
            ) {
                return;
            }
            let input = RenewalInput {
                now_ms: self.clock.now_ms(),
                expires_at_ms: inner.session.expires_at_ms,
                has_refresh_token: inner.session.refresh_token.is_some(),
                idle_minutes: self.activity.minutes_since_last_activity(),
                last_attempt_ms: inner.last_attempt_ms,
                force,
            };
            let decision = self.policy.decide(&input);
            if matches!(decision, Renewal::Refresh | Renewal::SilentRenew) {
                inner.state = SessionState::Expiring;
            }
            decision
        };

        match decision {
            Renewal::Hold => {}
            Renewal::Refresh => {
                debug!(force, "token inside refresh window");
                let _ = self.renew(Grant::RefreshToken, None).await;
            }
            Renewal::SilentRenew => {
                debug!(force, "token inside silent renewal window");
                let _ = self.renew(Grant::SilentRenew, None).await;
            }
            Renewal::Expire => self.expire("token expired"),
        }
    }

    async fn renew(self: &Arc<Self>, grant: Grant, rejected: Option<&str>) -> RefreshOutcome {
        match self.join_flight(grant, rejected) {
            Join::Ready(outcome) => outcome,
            Join::Wait(flight) => flight.await,
        }
    }

    /// Join the pending refresh, or start one.
    fn join_flight(self: &Arc<Self>, grant: Grant, rejected: Option<&str>) -> Join {
        let mut slot = self.in_flight.lock();
        if let Some(ref flight) = *slot {
            return Join::Wait(flight.outcome.clone());
        }

        let (epoch, credential) = {
            let mut inner = self.inner.lock();
            if let (Some(rejected), Some(current)) = (rejected, inner.session.snapshot()) {
                if current.access_token != rejected {
                    debug!("token already renewed since rejection");
                    return Join::Ready(Ok(current));
                }
            }
            let credential = match grant {
                Grant::RefreshToken => inner.session.refresh_token.clone(),
                Grant::SilentRenew => inner.session.access_token.clone(),
            };
            let Some(credential) = credential else {
                return Join::Ready(Err(RefreshError::NoCredentials));
            };
            inner.state = SessionState::Refreshing;
            inner.last_attempt_ms = Some(self.clock.now_ms());
            (inner.epoch, credential)
        };

        let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = match grant {
                Grant::RefreshToken => this.identity.refresh(&credential).await,
                Grant::SilentRenew => this.identity.silent_renew(&credential).await,
            };
            let outcome = this.settle(epoch, result);
            this.finish_flight(id);
            outcome
        });
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                Err(RefreshError::Transient(format!("refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        *slot = Some(InFlight { id, outcome: outcome.clone() });
        Join::Wait(outcome)
    }

    fn finish_flight(&self, id: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }
    }

    /// Commit a provider result, unless the session changed meanwhile.
    fn settle(&self, epoch: u64, result: Result<TokenResponse, RefreshError>) -> RefreshOutcome {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("session changed during refresh, discarding result");
            return Err(RefreshError::Cancelled);
        }

        match result {
            Ok(token) => {
                let snapshot = inner.session.apply(token, now);
                inner.state = SessionState::Valid;
                self.persist(&inner.session);
                self.publish(Some(snapshot.clone()));
                drop(inner);

                let expires_in_secs = snapshot.expires_in_secs(now);
                info!(expires_in_secs, "session renewed");
                self.emit(SessionEvent::Refreshed { expires_in_secs });
                Ok(snapshot)
            }
            Err(e) => {
                let expired = inner.session.expires_at_ms.is_none_or(|exp| now >= exp);
                if !e.is_revoked() && !expired {
                    inner.state = SessionState::Expiring;
                }
                drop(inner);

                warn!(err = %e, expired, "session renewal failed");
                self.emit(SessionEvent::RefreshFailed { error: e.to_string() });
                if e.is_revoked() || expired {
                    self.expire(&e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Transition to `Unauthenticated`: drop secrets, stop timers, and send
    /// the user to the session-expired surface unless already in the auth
    /// flow. Runs its side effects once per session.
    fn expire(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Unauthenticated {
                return;
            }
            inner.state = SessionState::Unauthenticated;
            inner.epoch += 1;
            inner.last_attempt_ms = None;
            inner.session.clear_secrets();
            if let Err(e) = self.store.clear_secrets() {
                warn!(err = %e, "failed to remove session secrets");
            }
            self.publish(None);
        }
        self.stop();

        let location = self.navigator.current_location();
        if is_auth_exempt(&location) {
            debug!(%location, "session expired inside auth flow, not redirecting");
        } else {
            self.navigator.session_expired(&location);
        }
        warn!(reason, "session expired");
        self.emit(SessionEvent::SessionExpired { reason: reason.to_owned() });
    }

    // -- Timers ---------------------------------------------------------------

    /// Start the periodic checker and the wake coordinator. Replaces (and
    /// stops) any previously started pair.
    pub fn start(self: &Arc<Self>) -> CancellationToken {
        let shutdown = CancellationToken::new();
        if let Some(previous) = self.timers.lock().replace(shutdown.clone()) {
            previous.cancel();
        }
        spawn_checker(Arc::clone(self), shutdown.clone());
        spawn_wake_coordinator(Arc::clone(self), shutdown.clone());
        shutdown
    }

    pub fn stop(&self) {
        if let Some(shutdown) = self.timers.lock().take() {
            shutdown.cancel();
        }
    }

    // -- Persistence and publication ------------------------------------------

    fn persist(&self, session: &Session) {
        if !self.config.auth_persistence {
            return;
        }
        if let Err(e) = self.write_session(session) {
            warn!(err = %e, "failed to persist session");
        }
    }

    fn write_session(&self, session: &Session) -> anyhow::Result<()> {
        self.store.set(StoreKey::SessionHandlingMode, session.mode.as_str())?;
        match (&session.access_token, session.expires_at_ms) {
            (Some(token), Some(expires_at_ms)) => {
                self.store.set_secure(StoreKey::AccessToken, token.as_str())?;
                self.store.set(StoreKey::Expiry, expires_at_ms.to_string())?;
            }
            _ => {
                self.store.remove(StoreKey::AccessToken)?;
                self.store.remove(StoreKey::Expiry)?;
            }
        }
        match session.refresh_token {
            Some(ref token) if session.mode.retains_refresh_token() => {
                self.store.set_secure(StoreKey::RefreshToken, token.as_str())?;
            }
            _ => self.store.remove(StoreKey::RefreshToken)?,
        }
        Ok(())
    }

    /// Callers hold `inner`, so publication follows commit order.
    fn publish(&self, snapshot: Option<TokenSnapshot>) {
        self.token_tx.send_replace(snapshot);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    // -- Accessors ------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The currently published token.
    pub fn current_token(&self) -> Option<TokenSnapshot> {
        self.token_tx.borrow().clone()
    }

    /// Receiver that observes the current token and every later change.
    pub fn watch_token(&self) -> watch::Receiver<Option<TokenSnapshot>> {
        self.token_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.lock().session.refresh_token.is_some()
    }

    /// Whether the held access token has not yet expired by the local clock.
    pub fn is_locally_valid(&self) -> bool {
        let now = self.clock.now_ms();
        self.inner.lock().session.expires_at_ms.is_some_and(|exp| now < exp)
    }

    /// A locally valid token or a refresh token is held.
    pub fn is_plausibly_authenticated(&self) -> bool {
        self.is_locally_valid() || self.has_refresh_token()
    }

    pub fn status(&self) -> SessionStatus {
        let now = self.clock.now_ms();
        let inner = self.inner.lock();
        SessionStatus {
            state: inner.state,
            expires_in_secs: inner.session.expires_at_ms.map(|exp| exp.saturating_sub(now) / 1000),
            has_refresh_token: inner.session.refresh_token.is_some(),
            mode: inner.session.mode,
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
