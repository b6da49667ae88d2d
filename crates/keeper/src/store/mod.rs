// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: expiring key/value persistence with a secure and a plain tier.
//!
//! Every write carries an absolute expiry [`RETENTION`] after the write time;
//! reads past that expiry behave as absent. Secure writes are marked
//! transmission-restricted and the backend keeps them apart from plain
//! records. There is no coordination here: the session coordinator is the
//! only writer, so the last write wins.

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Fixed retention window for every stored record (six months).
pub const RETENTION: Duration = Duration::from_secs(183 * 24 * 60 * 60);

/// Logical names of the persisted session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    AccessToken,
    Expiry,
    RefreshToken,
    SessionHandlingMode,
    LastActivity,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access-token",
            Self::Expiry => "expiry",
            Self::RefreshToken => "refresh-token",
            Self::SessionHandlingMode => "session-handling-mode",
            Self::LastActivity => "last-activity",
        }
    }

    /// Keys that hold session secrets or describe them.
    pub const SECRETS: [StoreKey; 3] = [Self::AccessToken, Self::Expiry, Self::RefreshToken];

    pub const ALL: [StoreKey; 5] = [
        Self::AccessToken,
        Self::Expiry,
        Self::RefreshToken,
        Self::SessionHandlingMode,
        Self::LastActivity,
    ];
}

/// A single stored value with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub value: String,
    /// Expiry as milliseconds since Unix epoch.
    pub expires_at_ms: u64,
    /// Transmission-restricted record (secure tier).
    #[serde(default)]
    pub secure: bool,
}

/// Raw storage underneath the [`CredentialStore`].
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> anyhow::Result<Option<StoredRecord>>;

    fn write(&self, key: &str, record: StoredRecord) -> anyhow::Result<()>;

    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Whether values survive a restart. Best-effort writers (activity
    /// tracking) skip non-durable backends.
    fn is_durable(&self) -> bool;
}

/// Expiring key/value façade over a [`StorageBackend`].
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Read a value. Expired or unreadable records are treated as absent.
    pub fn get(&self, key: StoreKey) -> Option<String> {
        let record = match self.backend.read(key.as_str()) {
            Ok(r) => r?,
            Err(e) => {
                warn!(key = key.as_str(), err = %e, "failed to read stored record");
                return None;
            }
        };
        if record.expires_at_ms <= self.clock.now_ms() {
            debug!(key = key.as_str(), "stored record past retention, dropping");
            if let Err(e) = self.backend.delete(key.as_str()) {
                warn!(key = key.as_str(), err = %e, "failed to drop expired record");
            }
            return None;
        }
        Some(record.value)
    }

    /// Write a plain-tier value.
    pub fn set(&self, key: StoreKey, value: impl Into<String>) -> anyhow::Result<()> {
        self.write(key, value.into(), false)
    }

    /// Write a secure-tier (transmission-restricted) value.
    pub fn set_secure(&self, key: StoreKey, value: impl Into<String>) -> anyhow::Result<()> {
        self.write(key, value.into(), true)
    }

    pub fn remove(&self, key: StoreKey) -> anyhow::Result<()> {
        self.backend.delete(key.as_str())
    }

    /// Remove the token secrets and their expiry, keeping preferences.
    pub fn clear_secrets(&self) -> anyhow::Result<()> {
        for key in StoreKey::SECRETS {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Remove every session record, preferences included.
    pub fn clear_all(&self) -> anyhow::Result<()> {
        for key in StoreKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }

    pub fn is_durable(&self) -> bool {
        self.backend.is_durable()
    }

    fn write(&self, key: StoreKey, value: String, secure: bool) -> anyhow::Result<()> {
        let expires_at_ms = self.clock.now_ms() + RETENTION.as_millis() as u64;
        self.backend.write(key.as_str(), StoredRecord { value, expires_at_ms, secure })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
