// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backend for restricted contexts and tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{StorageBackend, StoredRecord};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record lookup, bypassing expiry. Used to inspect tiers.
    pub fn raw(&self, key: &str) -> Option<StoredRecord> {
        self.records.lock().get(key).cloned()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<StoredRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn write(&self, key: &str, record: StoredRecord) -> anyhow::Result<()> {
        self.records.lock().insert(key.to_owned(), record);
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.records.lock().remove(key);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
