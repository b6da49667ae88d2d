// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wake coordinator: detects suspend/resume gaps and forces a re-sync.
//!
//! The ticker runs on the runtime's timer, but the gap is measured on the
//! wall clock, which keeps advancing while the machine sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::navigation::is_auth_exempt;
use crate::session::{Coordinator, SessionEvent};

pub struct WakeCoordinator {
    coordinator: Arc<Coordinator>,
    threshold_ms: u64,
    last_tick_ms: AtomicU64,
}

impl WakeCoordinator {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let threshold_ms = coordinator.config().wake_threshold().as_millis() as u64;
        let last_tick_ms = AtomicU64::new(coordinator.clock().now_ms());
        Self { coordinator, threshold_ms, last_tick_ms }
    }

    /// Handle one tick. Returns the suspend gap when it triggered a re-sync.
    pub async fn tick(&self) -> Option<Duration> {
        let now = self.coordinator.clock().now_ms();
        let last = self.last_tick_ms.swap(now, Ordering::SeqCst);
        let gap_ms = now.saturating_sub(last);
        if gap_ms <= self.threshold_ms {
            return None;
        }

        let description = humanize(Duration::from_millis(gap_ms));
        if !self.coordinator.is_plausibly_authenticated() {
            debug!(elapsed = %description, "wake detected without a session");
            return None;
        }
        let location = self.coordinator.navigator().current_location();
        if is_auth_exempt(&location) {
            debug!(elapsed = %description, %location, "wake detected inside auth flow");
            return None;
        }

        info!(elapsed = %description, "resumed after suspend, re-syncing session");
        self.coordinator.emit(SessionEvent::Resumed { elapsed_ms: gap_ms, description });
        self.coordinator.resync().await;
        Some(Duration::from_millis(gap_ms))
    }
}

/// Spawn the wake ticker on the configured interval.
pub fn spawn_wake_coordinator(
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = coordinator.config().wake_check_interval();
    let wake = WakeCoordinator::new(coordinator);

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            wake.tick().await;
        }
        debug!("wake coordinator stopped");
    })
}

/// Render a duration as "3 hours and 12 minutes", "1 day, 2 hours and 5 minutes"
/// or, below a minute, "45 seconds".
pub fn humanize(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let units = [(secs / 86_400, "day"), (secs % 86_400 / 3600, "hour"), (secs % 3600 / 60, "minute")];
    let parts: Vec<String> =
        units.iter().filter(|(n, _)| *n > 0).map(|(n, unit)| plural(*n, unit)).collect();

    let Some((last, rest)) = parts.split_last() else {
        return plural(secs, "second");
    };
    if rest.is_empty() {
        last.clone()
    } else {
        format!("{} and {last}", rest.join(", "))
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
#[path = "wake_tests.rs"]
mod tests;
