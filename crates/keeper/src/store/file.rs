// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File backend: two JSON files with atomic writes.
//!
//! Plain records live in `session.json`. Secure records live in
//! `secrets.json`, which on Unix is created with mode `0600`. A key is only
//! ever present in one of the two files.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{StorageBackend, StoredRecord};

const PLAIN_FILE: &str = "session.json";
const SECURE_FILE: &str = "secrets.json";

/// On-disk layout of one tier.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedRecords {
    #[serde(default)]
    records: HashMap<String, StoredRecord>,
}

struct Tiers {
    plain: PersistedRecords,
    secure: PersistedRecords,
}

pub struct FileBackend {
    dir: PathBuf,
    tiers: Mutex<Tiers>,
}

impl FileBackend {
    /// Open (or create) the backend in `dir`, loading both tiers.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create state dir {}", dir.display()))?;
        let plain = load(&dir.join(PLAIN_FILE))?;
        let secure = load(&dir.join(SECURE_FILE))?;
        debug!(
            dir = %dir.display(),
            plain = plain.records.len(),
            secure = secure.records.len(),
            "opened session store"
        );
        Ok(Self { dir, tiers: Mutex::new(Tiers { plain, secure }) })
    }

    fn flush(&self, tiers: &Tiers, secure: bool) -> anyhow::Result<()> {
        if secure {
            save(&self.dir.join(SECURE_FILE), &tiers.secure, true)
        } else {
            save(&self.dir.join(PLAIN_FILE), &tiers.plain, false)
        }
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<StoredRecord>> {
        let tiers = self.tiers.lock();
        Ok(tiers.secure.records.get(key).or_else(|| tiers.plain.records.get(key)).cloned())
    }

    fn write(&self, key: &str, record: StoredRecord) -> anyhow::Result<()> {
        let mut tiers = self.tiers.lock();
        let secure = record.secure;
        // A key moving between tiers must not linger in the other file.
        let stale = if secure {
            tiers.plain.records.remove(key).is_some()
        } else {
            tiers.secure.records.remove(key).is_some()
        };
        if secure {
            tiers.secure.records.insert(key.to_owned(), record);
        } else {
            tiers.plain.records.insert(key.to_owned(), record);
        }
        self.flush(&tiers, secure)?;
        if stale {
            self.flush(&tiers, !secure)?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut tiers = self.tiers.lock();
        if tiers.secure.records.remove(key).is_some() {
            self.flush(&tiers, true)?;
        }
        if tiers.plain.records.remove(key).is_some() {
            self.flush(&tiers, false)?;
        }
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

fn load(path: &Path) -> anyhow::Result<PersistedRecords> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PersistedRecords::default())
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Save records atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never share
/// a `.tmp` file.
fn save(path: &Path, records: &PersistedRecords, restricted: bool) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(records)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    restrict_permissions(&mut options, restricted);

    let mut file =
        options.open(&tmp_path).with_context(|| format!("create {}", tmp_path.display()))?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(options: &mut std::fs::OpenOptions, restricted: bool) {
    use std::os::unix::fs::OpenOptionsExt;
    if restricted {
        options.mode(0o600);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_options: &mut std::fs::OpenOptions, _restricted: bool) {}
