//! Persistent on-disk kernel store.
//!
//! Layout under the store root: an append-only JSON-lines index
//! (`index.jsonl`) plus one blob file per record, grouped by capability
//! (`sm_XY/<source-hash>.ptx`). The index is read wholesale at process start
//! and appended after each successful compile, so a crash mid-write loses at
//! most the newest record's caching benefit.
//!
//! Environment overrides: `ISKRA_CACHE_DIR` relocates the store,
//! `ISKRA_NO_DISK_CACHE=1` disables it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, warn};

use iskra_device::DeviceCapability;

use crate::error::{IoSnafu, Result, StoreSnafu};
use crate::key::CompileKey;

/// One line of the persistent index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentRecord {
    pub capability: DeviceCapability,
    pub source_hash: u64,
    pub entry: String,
    /// Blob path relative to the store root.
    pub blob: String,
}

/// A record rehydrated from disk.
pub struct StoredBinary {
    pub key: CompileKey,
    pub entry: String,
    pub image: Vec<u8>,
}

/// Append-only persistent mirror of the compilation cache.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Store rooted at an explicit directory, created if missing.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).context(IoSnafu { path: root.clone() })?;
        Ok(Self { root })
    }

    /// Default store location, or `None` when persistence is disabled or
    /// the platform has no cache directory.
    pub fn default_dir() -> Option<PathBuf> {
        if std::env::var_os("ISKRA_NO_DISK_CACHE").is_some() {
            return None;
        }
        if let Some(dir) = std::env::var_os("ISKRA_CACHE_DIR") {
            return Some(PathBuf::from(dir).join("kernels"));
        }
        directories::ProjectDirs::from("", "", "iskra").map(|dirs| dirs.cache_dir().join("kernels"))
    }

    /// Store at the default location; `None` when persistence is disabled
    /// or the directory cannot be created. The latter is logged, never
    /// fatal: the cache degrades to in-memory only.
    pub fn open_default() -> Option<Self> {
        let root = Self::default_dir()?;
        match Self::at(root) {
            Ok(store) => Some(store),
            Err(error) => {
                warn!(%error, "persistent kernel store unavailable");
                None
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.jsonl")
    }

    /// Read the whole index, admitting only records for `live` capabilities.
    ///
    /// Corrupt lines and records with missing blobs are skipped with a
    /// warning; a record for a capability not in `live` stays on disk for
    /// future processes and is not loaded.
    pub fn load(&self, live: &[DeviceCapability]) -> Vec<StoredBinary> {
        let text = match fs::read_to_string(self.index_path()) {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };

        let mut loaded = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let record: PersistentRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(error) => {
                    warn!(%error, "skipping corrupt kernel index record");
                    continue;
                }
            };
            if !live.contains(&record.capability) {
                continue;
            }

            let blob_path = self.root.join(&record.blob);
            match fs::read(&blob_path) {
                Ok(image) => loaded.push(StoredBinary {
                    key: CompileKey { capability: record.capability, source_hash: record.source_hash },
                    entry: record.entry,
                    image,
                }),
                Err(error) => {
                    warn!(blob = %blob_path.display(), %error, "skipping kernel record with unreadable blob")
                }
            }
        }

        debug!(records = loaded.len(), "loaded persistent kernel index");
        loaded
    }

    /// Persist one successfully compiled binary: blob first, then the index
    /// line, so a torn write can only produce an orphan blob, never an index
    /// entry without its blob.
    pub fn insert(&self, key: CompileKey, entry: &str, image: &[u8]) -> Result<()> {
        let dir = self.root.join(key.capability.to_string());
        fs::create_dir_all(&dir).context(IoSnafu { path: dir })?;

        let blob_rel = format!("{}/{:016x}.ptx", key.capability, key.source_hash);
        let blob_path = self.root.join(&blob_rel);
        fs::write(&blob_path, image).context(IoSnafu { path: blob_path })?;

        let record = PersistentRecord {
            capability: key.capability,
            source_hash: key.source_hash,
            entry: entry.to_string(),
            blob: blob_rel,
        };
        let line = serde_json::to_string(&record).map_err(|e| StoreSnafu { reason: e.to_string() }.build())?;

        let index = self.index_path();
        let mut file =
            OpenOptions::new().create(true).append(true).open(&index).context(IoSnafu { path: index.clone() })?;
        writeln!(file, "{line}").context(IoSnafu { path: index })?;

        debug!(key = %key, bytes = image.len(), "persisted compiled binary");
        Ok(())
    }
}
