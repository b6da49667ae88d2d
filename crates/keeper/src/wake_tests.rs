// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;

use super::*;
use crate::config::SessionConfig;
use crate::session::{SessionHandlingMode, SessionState};
use crate::test_support::{minutes, token, Harness, MockIdentity};

#[yare::parameterized(
    seconds = { 45, "45 seconds" },
    one_second = { 1, "1 second" },
    one_minute = { 60, "1 minute" },
    minutes_only = { 17 * 60 + 30, "17 minutes" },
    hours_only = { 2 * 3600, "2 hours" },
    hours_and_minutes = { 3 * 3600 + 12 * 60, "3 hours and 12 minutes" },
    singular_units = { 3600 + 60, "1 hour and 1 minute" },
    days_hours_minutes = { 86_400 + 2 * 3600 + 5 * 60, "1 day, 2 hours and 5 minutes" },
    days_and_minutes = { 2 * 86_400 + 60, "2 days and 1 minute" },
)]
fn humanized_durations(secs: u64, expected: &str) {
    assert_eq!(humanize(Duration::from_secs(secs)), expected);
}

async fn logged_in(mode: SessionHandlingMode, expires_in: u64) -> anyhow::Result<Harness> {
    let h = Harness::new(
        SessionConfig::default(),
        MockIdentity::new(vec![
            Ok(token("at-1", Some("rt-1"), expires_in)),
            Ok(token("at-2", Some("rt-2"), expires_in)),
        ]),
    );
    h.coordinator.login("code", mode, None).await?;
    Ok(h)
}

#[tokio::test]
async fn regular_ticks_do_not_resync() -> anyhow::Result<()> {
    let h = logged_in(SessionHandlingMode::StayLoggedIn, 36_000).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));

    for _ in 0..5 {
        h.clock.advance(Duration::from_secs(11));
        assert_eq!(wake.tick().await, None);
    }
    assert_eq!(h.identity.renewals(), 0);
    Ok(())
}

#[tokio::test]
async fn wake_after_long_suspend_resyncs_immediately() -> anyhow::Result<()> {
    let h = logged_in(SessionHandlingMode::StayLoggedIn, 36_000).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));
    let mut events = h.coordinator.subscribe();

    h.clock.advance(Duration::from_secs(3 * 3600 + 12 * 60));
    let gap = wake.tick().await;

    assert_eq!(gap, Some(Duration::from_secs(3 * 3600 + 12 * 60)));
    assert_eq!(h.identity.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.coordinator.current_token().map(|t| t.access_token).as_deref(), Some("at-2"));

    let resumed = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, SessionEvent::Resumed { .. }));
    assert_eq!(
        resumed,
        Some(SessionEvent::Resumed {
            elapsed_ms: (3 * 3600 + 12 * 60) * 1000,
            description: "3 hours and 12 minutes".to_owned(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn gap_just_past_threshold_counts_as_wake() -> anyhow::Result<()> {
    let h = logged_in(SessionHandlingMode::StayLoggedIn, 36_000).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));

    h.clock.advance(Duration::from_millis(15_000));
    assert_eq!(wake.tick().await, None);
    h.clock.advance(Duration::from_millis(15_001));
    assert!(wake.tick().await.is_some());
    Ok(())
}

#[tokio::test]
async fn wake_without_session_does_nothing() {
    let h = Harness::new(SessionConfig::default(), MockIdentity::default());
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));

    h.clock.advance(minutes(120));
    assert_eq!(wake.tick().await, None);
    assert_eq!(h.identity.renewals(), 0);
}

#[tokio::test]
async fn wake_inside_auth_flow_does_nothing() -> anyhow::Result<()> {
    let h = logged_in(SessionHandlingMode::StayLoggedIn, 36_000).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));
    *h.navigator.location.lock() = "/agreement".to_owned();

    h.clock.advance(minutes(120));
    assert_eq!(wake.tick().await, None);
    assert_eq!(h.identity.renewals(), 0);
    Ok(())
}

#[tokio::test]
async fn wake_after_idle_past_expiry_ends_session() -> anyhow::Result<()> {
    // No refresh token: a suspend long enough to expire the token and pass
    // the idle ceiling is an idle logout.
    let h = logged_in(SessionHandlingMode::AskAgain, 3600).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));

    h.clock.advance(minutes(50));
    assert!(wake.tick().await.is_some());
    assert_eq!(h.identity.silent_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.coordinator.state(), SessionState::Valid);

    h.clock.advance(minutes(20));
    assert!(wake.tick().await.is_none(), "token expired, nothing plausible to re-sync");
    h.coordinator.check().await;
    assert_eq!(h.coordinator.state(), SessionState::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn wake_while_active_silently_renews() -> anyhow::Result<()> {
    let h = logged_in(SessionHandlingMode::AskAgain, 3600).await?;
    let wake = WakeCoordinator::new(Arc::clone(&h.coordinator));

    h.clock.advance(minutes(20));
    h.coordinator.activity().touch();
    h.clock.advance(Duration::from_secs(30));
    assert!(wake.tick().await.is_some());
    assert_eq!(h.identity.silent_calls.load(Ordering::SeqCst), 1);
    Ok(())
}
