//! On-disk package cache with a time-to-live
//!
//! Fetched package manifests and source files are kept under the cache root so
//! repeated installs avoid the network. Each entry lives in its own directory,
//! named by the SHA256 of the entry key:
//!
//! ```text
//! <root>/<sha256(key)>/entry.json    {"key": "...", "fetched_at": "<RFC3339>"}
//! <root>/<sha256(key)>/files/...     cached file content
//! ```
//!
//! Keys are `owner/name@version#manifest` for a package manifest and
//! `owner/name@version` for its source files. Entries older than the TTL are
//! treated as misses. Writes are staged in a sibling directory and renamed into
//! place under a per-key lock, so readers never observe a half-written entry.
//!
//! # Examples
//!
//! ```no_run
//! use clib_install::cache::{CacheLookup, PackageCache};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = PackageCache::new("/tmp/clib-cache", chrono::Duration::days(30));
//! cache.put("clibs/list@0.2.0", &[("list.c".to_string(), b"/* list */".to_vec())])?;
//!
//! if let CacheLookup::Hit(entry) = cache.get("clibs/list@0.2.0") {
//!     let content = entry.read("list.c")?;
//!     assert_eq!(content, b"/* list */");
//! }
//! # Ok(())
//! # }
//! ```

use crate::package::PackageIdentifier;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Default entry lifetime
pub const CACHE_TTL_DAYS: i64 = 30;

const ENTRY_FILE: &str = "entry.json";
const FILES_DIR: &str = "files";
const STAGING_DIR: &str = "staging";

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    fetched_at: String,
}

/// A cached entry as found on disk
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    /// Directory holding the cached files
    pub path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry is younger than the TTL at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < self.ttl
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path.join(name).is_file()
    }

    /// Content of one cached file
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path.join(name))?)
    }
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
}

/// Shared on-disk cache; safe to use from several install workers at once
pub struct PackageCache {
    root: PathBuf,
    ttl: Duration,
    skip_reads: bool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    staging_seq: AtomicU64,
}

impl PackageCache {
    pub fn new<P: AsRef<Path>>(root: P, ttl: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ttl,
            skip_reads: false,
            locks: Mutex::new(HashMap::new()),
            staging_seq: AtomicU64::new(0),
        }
    }

    /// Treat every lookup as a miss; fetched content is still written back
    pub fn skip_reads(mut self, skip: bool) -> Self {
        self.skip_reads = skip;
        self
    }

    /// Look up `key` as of now
    pub fn get(&self, key: &str) -> CacheLookup {
        self.lookup_at(key, Utc::now())
    }

    /// Look up `key`, judging freshness against `now`
    ///
    /// Missing, stale and unreadable entries are all misses.
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> CacheLookup {
        if self.skip_reads {
            return CacheLookup::Miss;
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = match self.read_entry(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unreadable cache entry");
                return CacheLookup::Miss;
            }
        };

        if entry.is_fresh(now) {
            tracing::debug!(key, "cache hit");
            CacheLookup::Hit(entry)
        } else {
            tracing::debug!(key, fetched_at = %entry.fetched_at, "cache entry expired");
            CacheLookup::Miss
        }
    }

    /// Store `files` under `key`, replacing any previous entry
    pub fn put(&self, key: &str, files: &[(String, Vec<u8>)]) -> Result<CacheEntry> {
        self.put_at(key, files, Utc::now())
    }

    /// Store `files` under `key` with an explicit fetch time
    pub fn put_at(
        &self,
        key: &str,
        files: &[(String, Vec<u8>)],
        fetched_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        for (name, _) in files {
            validate_file_name(name)?;
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let final_dir = self.entry_dir(key);
        let staging = self.root.join(format!(
            ".{}.{}-{}.partial",
            entry_hash(key),
            std::process::id(),
            self.staging_seq.fetch_add(1, Ordering::Relaxed)
        ));

        let result = self.write_staged(&staging, key, files, fetched_at);
        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        if let Err(e) = fs::rename(&staging, &final_dir) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        tracing::debug!(key, files = files.len(), "cached");
        Ok(CacheEntry {
            key: key.to_string(),
            path: final_dir.join(FILES_DIR),
            fetched_at,
            ttl: self.ttl,
        })
    }

    /// Working directory for a global install of `id@version`
    pub fn staging_dir(&self, id: &PackageIdentifier, version: &str) -> PathBuf {
        self.root
            .join(STAGING_DIR)
            .join(format!("{}_{}@{}", id.owner(), id.name(), version))
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(entry_hash(key))
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let dir = self.entry_dir(key);
        let record_path = dir.join(ENTRY_FILE);
        if !record_path.exists() {
            return Ok(None);
        }

        let record: EntryRecord = serde_json::from_slice(&fs::read(&record_path)?)?;
        if record.key != key {
            return Err(Error::Other(format!(
                "cache entry {} belongs to '{}'",
                dir.display(),
                record.key
            )));
        }

        let fetched_at = DateTime::parse_from_rfc3339(&record.fetched_at)
            .map_err(|e| Error::Other(format!("invalid fetch time '{}': {}", record.fetched_at, e)))?
            .with_timezone(&Utc);

        Ok(Some(CacheEntry {
            key: record.key,
            path: dir.join(FILES_DIR),
            fetched_at,
            ttl: self.ttl,
        }))
    }

    fn write_staged(
        &self,
        staging: &Path,
        key: &str,
        files: &[(String, Vec<u8>)],
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let files_dir = staging.join(FILES_DIR);
        fs::create_dir_all(&files_dir)?;

        for (name, content) in files {
            let target = files_dir.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }

        let record = EntryRecord {
            key: key.to_string(),
            fetched_at: fetched_at.to_rfc3339(),
        };
        fs::write(staging.join(ENTRY_FILE), serde_json::to_vec_pretty(&record)?)?;
        Ok(())
    }
}

fn entry_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn validate_file_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(Error::Other(format!("Refusing to cache file '{}'", name)))
    }
}
