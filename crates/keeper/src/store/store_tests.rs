// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::clock::ManualClock;

const T0: u64 = 1_700_000_000_000;

fn memory_store() -> (CredentialStore, Arc<MemoryBackend>, Arc<ManualClock>) {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::new(T0));
    let store = CredentialStore::new(Arc::clone(&backend) as _, Arc::clone(&clock) as _);
    (store, backend, clock)
}

#[test]
fn set_then_get_returns_value() -> anyhow::Result<()> {
    let (store, _, _) = memory_store();
    store.set(StoreKey::SessionHandlingMode, "stay_logged_in")?;
    assert_eq!(store.get(StoreKey::SessionHandlingMode).as_deref(), Some("stay_logged_in"));
    Ok(())
}

#[test]
fn writes_carry_six_month_expiry() -> anyhow::Result<()> {
    let (store, backend, _) = memory_store();
    store.set(StoreKey::Expiry, "123")?;
    let raw = backend.raw("expiry").expect("record");
    assert_eq!(raw.expires_at_ms, T0 + RETENTION.as_millis() as u64);
    assert!(!raw.secure);
    Ok(())
}

#[test]
fn set_secure_marks_record_restricted() -> anyhow::Result<()> {
    let (store, backend, _) = memory_store();
    store.set_secure(StoreKey::AccessToken, "tok")?;
    assert!(backend.raw("access-token").expect("record").secure);
    Ok(())
}

#[test]
fn reads_past_retention_behave_as_absent() -> anyhow::Result<()> {
    let (store, backend, clock) = memory_store();
    store.set_secure(StoreKey::RefreshToken, "rt")?;
    clock.advance(RETENTION - Duration::from_secs(1));
    assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("rt"));

    clock.advance(Duration::from_secs(1));
    assert!(store.get(StoreKey::RefreshToken).is_none());
    // Expired record is dropped from the backend on read.
    assert!(backend.raw("refresh-token").is_none());
    Ok(())
}

#[test]
fn rewrite_extends_retention() -> anyhow::Result<()> {
    let (store, _, clock) = memory_store();
    store.set(StoreKey::LastActivity, "1")?;
    clock.advance(RETENTION - Duration::from_secs(10));
    store.set(StoreKey::LastActivity, "2")?;
    clock.advance(Duration::from_secs(20));
    assert_eq!(store.get(StoreKey::LastActivity).as_deref(), Some("2"));
    Ok(())
}

#[test]
fn clear_secrets_keeps_preferences() -> anyhow::Result<()> {
    let (store, _, _) = memory_store();
    store.set_secure(StoreKey::AccessToken, "a")?;
    store.set_secure(StoreKey::RefreshToken, "r")?;
    store.set(StoreKey::Expiry, "1")?;
    store.set(StoreKey::SessionHandlingMode, "never_ask")?;

    store.clear_secrets()?;
    assert!(store.get(StoreKey::AccessToken).is_none());
    assert!(store.get(StoreKey::RefreshToken).is_none());
    assert!(store.get(StoreKey::Expiry).is_none());
    assert_eq!(store.get(StoreKey::SessionHandlingMode).as_deref(), Some("never_ask"));

    store.clear_all()?;
    assert!(store.get(StoreKey::SessionHandlingMode).is_none());
    Ok(())
}

#[test]
fn file_backend_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(T0));
    let expires_at = T0 + 10 * 60 * 1000;
    {
        let backend = Arc::new(FileBackend::open(dir.path())?);
        let store = CredentialStore::new(backend, Arc::clone(&clock) as _);
        store.set_secure(StoreKey::AccessToken, "access-1")?;
        store.set(StoreKey::Expiry, expires_at.to_string())?;
    }

    let backend = Arc::new(FileBackend::open(dir.path())?);
    let store = CredentialStore::new(backend, clock as _);
    assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("access-1"));
    let restored: u64 = store.get(StoreKey::Expiry).expect("expiry").parse()?;
    assert_eq!(restored, expires_at);
    Ok(())
}

#[test]
fn file_backend_separates_tiers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = Arc::new(FileBackend::open(dir.path())?);
    let store = CredentialStore::new(backend, Arc::new(ManualClock::new(T0)) as _);
    store.set_secure(StoreKey::RefreshToken, "secret-rt")?;
    store.set(StoreKey::SessionHandlingMode, "stay_logged_in")?;

    let secrets = std::fs::read_to_string(dir.path().join("secrets.json"))?;
    let plain = std::fs::read_to_string(dir.path().join("session.json"))?;
    assert!(secrets.contains("secret-rt"));
    assert!(!plain.contains("secret-rt"));
    assert!(plain.contains("stay_logged_in"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.path().join("secrets.json"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
    Ok(())
}

#[test]
fn file_backend_moves_key_between_tiers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = Arc::new(FileBackend::open(dir.path())?);
    let store = CredentialStore::new(backend, Arc::new(ManualClock::new(T0)) as _);
    store.set(StoreKey::AccessToken, "plain-first")?;
    store.set_secure(StoreKey::AccessToken, "now-secure")?;

    let plain = std::fs::read_to_string(dir.path().join("session.json"))?;
    assert!(!plain.contains("plain-first"));
    assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("now-secure"));
    Ok(())
}

#[test]
fn durability_reflects_backend() -> anyhow::Result<()> {
    let (store, _, _) = memory_store();
    assert!(!store.is_durable());

    let dir = tempfile::tempdir()?;
    let file = CredentialStore::new(
        Arc::new(FileBackend::open(dir.path())?),
        Arc::new(ManualClock::new(T0)) as _,
    );
    assert!(file.is_durable());
    Ok(())
}
