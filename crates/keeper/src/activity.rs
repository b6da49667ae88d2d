// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity tracker: recency of the last user interaction.
//!
//! Only feeds the renewal policy. In restricted (public/embedded) contexts it
//! always reports "just active" so idle logout never fires there.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::store::{CredentialStore, StoreKey};

pub struct ActivityTracker {
    last_activity_ms: AtomicU64,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    restricted: bool,
}

impl ActivityTracker {
    /// Create a tracker, seeding the last activity from the store when a
    /// previous run persisted one. Without a stored sample, "now" is used.
    pub fn new(store: CredentialStore, clock: Arc<dyn Clock>, restricted: bool) -> Self {
        let now = clock.now_ms();
        let last = if restricted {
            now
        } else {
            store
                .get(StoreKey::LastActivity)
                .and_then(|v| v.parse::<u64>().ok())
                .map(|stored| stored.min(now))
                .unwrap_or(now)
        };
        Self { last_activity_ms: AtomicU64::new(last), store, clock, restricted }
    }

    /// Record a qualifying user interaction.
    pub fn touch(&self) {
        let now = self.clock.now_ms();
        self.last_activity_ms.fetch_max(now, Ordering::SeqCst);
        if self.restricted || !self.store.is_durable() {
            return;
        }
        if let Err(e) = self.store.set(StoreKey::LastActivity, now.to_string()) {
            debug!(err = %e, "activity not persisted");
        }
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }

    /// Fractional minutes since the last interaction. Always 0 when restricted.
    pub fn minutes_since_last_activity(&self) -> f64 {
        if self.restricted {
            return 0.0;
        }
        let elapsed = self.clock.now_ms().saturating_sub(self.last_activity_ms());
        elapsed as f64 / 60_000.0
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
