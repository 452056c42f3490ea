use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Sidecar metadata for one cached file. The payload at `local_path` is
/// exactly the bytes fetched when `last_modified_remote` was recorded; the
/// store never leaves it partially written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub local_path: PathBuf,
    pub last_modified_remote: Option<DateTime<Utc>>,
    pub last_fetched_at: DateTime<Utc>,
}

/// One payload file plus one JSON sidecar per cache key under a single root
/// directory. Also hands out per-key async locks so two concurrent fetches
/// of the same key cannot race on one file; distinct keys stay independent.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    locks: StdMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

/// FNV-1a, stable across processes so cache files survive restarts.
fn key_digest(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in key.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cache keys become file names; anything path-hostile is replaced. When
/// sanitizing altered the key, a digest of the original is appended so that
/// distinct keys (`a/b` vs `a_b`) can never alias one payload file.
fn safe_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized == key {
        sanitized
    } else {
        format!("{sanitized}-{:08x}", key_digest(key) as u32)
    }
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheStore {
            root: root.into(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self, cache_key: &str) -> PathBuf {
        self.root.join(format!("{}.data", safe_key(cache_key)))
    }

    fn meta_path(&self, cache_key: &str) -> PathBuf {
        self.root.join(format!("{}.meta.json", safe_key(cache_key)))
    }

    /// The async lock guarding this key. Callers hold it across the whole
    /// freshness-check / fetch / persist sequence.
    pub fn key_lock(&self, cache_key: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Load the sidecar for `cache_key`, or `None` when either the sidecar
    /// or the payload is absent or unreadable.
    pub fn entry(&self, cache_key: &str) -> Option<CacheEntry> {
        let raw = fs::read(self.meta_path(cache_key)).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&raw).ok()?;
        if entry.local_path.is_file() {
            Some(entry)
        } else {
            debug!(cache_key, "sidecar present but payload missing");
            None
        }
    }

    /// Read the cached payload for `cache_key`.
    pub fn read(&self, cache_key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.data_path(cache_key))
    }

    /// Atomically install `bytes` as the payload for `cache_key` and update
    /// the sidecar. The payload is written to a temp file in the cache root
    /// and renamed into place only once the write completed, so a crash can
    /// never corrupt a previously valid entry.
    pub fn persist(
        &self,
        cache_key: &str,
        bytes: &[u8],
        last_modified_remote: Option<DateTime<Utc>>,
    ) -> Result<CacheEntry> {
        let write = |source: io::Error| Error::CacheWrite {
            cache_key: cache_key.to_string(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(write)?;

        let data_path = self.data_path(cache_key);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write)?;
        tmp.write_all(bytes).map_err(write)?;
        tmp.flush().map_err(write)?;
        tmp.persist(&data_path).map_err(|e| write(e.error))?;

        let entry = CacheEntry {
            local_path: data_path,
            last_modified_remote,
            last_fetched_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| write(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(self.meta_path(cache_key), json).map_err(write)?;

        debug!(
            cache_key,
            size = bytes.len(),
            "persisted cache entry"
        );
        Ok(entry)
    }
}
