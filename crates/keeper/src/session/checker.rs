// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background liveness checker for the session token.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Coordinator;

/// Spawn the periodic checker. Each tick applies the renewal policy; a
/// renewal in progress delays the next tick rather than stacking up.
pub fn spawn_checker(coordinator: Arc<Coordinator>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = coordinator.config().liveness_check_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            coordinator.check().await;
        }
        debug!("session checker stopped");
    })
}
