//! Two-tier result cache: a process-wide map in front of one JSON file per
//! key under the cache directory.
//!
//! Every record carries its write time. A record is servable only while
//! `now - timestamp < ttl`; stale records are dropped lazily on access.
//! Disk I/O is best effort: unreadable, unparseable or unwritable files
//! are logged and treated as misses, never as errors.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    data: Value,
    /// Seconds since the Unix epoch.
    timestamp: f64,
}

pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
    memory: Mutex<HashMap<String, CacheRecord>>,
}

impl Cache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path, ttl: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|_| Error::DataDir(dir.to_path_buf()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ttl,
            memory: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stable digest of `data`, used to turn request parameters into keys.
    pub fn derive_key(data: &str) -> String {
        blake3::hash(data.as_bytes()).to_hex().to_string()
    }

    /// Look up `key`, deserializing the stored value into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Look up `key` as raw JSON. Memory first, then disk; a fresh disk
    /// record is promoted into memory.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let now = now_secs();

        {
            let mut memory = self.lock();
            if let Some(record) = memory.get(key) {
                if self.is_fresh(record, now) {
                    return Some(record.data.clone());
                }
                memory.remove(key);
            }
        }

        let record = self.read_disk(key)?;
        if !self.is_fresh(&record, now) {
            return None;
        }

        let data = record.data.clone();
        self.lock().insert(key.to_string(), record);
        Some(data)
    }

    /// Store `value` under `key`. The memory copy is always written; the
    /// disk copy is best effort.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_value(value)?;
        self.store(key, data, now_secs());
        Ok(())
    }

    pub(crate) fn store(&self, key: &str, data: Value, timestamp: f64) {
        let record = CacheRecord { data, timestamp };

        if let Err(e) = self.write_disk(key, &record) {
            tracing::error!(key, error = %e, "cache write error");
        }

        self.lock().insert(key.to_string(), record);
    }

    fn is_fresh(&self, record: &CacheRecord, now: f64) -> bool {
        now - record.timestamp < self.ttl.as_secs_f64()
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_disk(&self, key: &str) -> Option<CacheRecord> {
        let path = self.file_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache read error");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache file");
                None
            }
        }
    }

    fn write_disk(&self, key: &str, record: &CacheRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(record)?;
        std::fs::write(self.file_for(key), bytes)?;
        Ok(())
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, CacheRecord>> {
        // The map holds plain data; a panic mid-insert cannot leave a
        // half-written record behind.
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
