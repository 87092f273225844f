//! Metadata records persisted beside cached trees and at the cache root

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Schema version written into every record
pub const SCHEMA_VERSION: u32 = 1;
/// File name of the per-entry record
pub const ENTRY_METADATA_FILE: &str = ".metadata";

/// Per-entry metadata record stored at `<entry>/.metadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Display form of the cache key
    pub cache_key: String,
    /// Type name recorded at store time
    pub cache_type: String,
    /// Caller-supplied identifier
    pub identifier: String,
    /// Unix timestamp (seconds) of the store
    pub created_at: i64,
    /// Byte size of the source tree measured before copying
    pub size_bytes: u64,
    /// Record schema version
    pub schema_version: u32,
}

impl EntryMetadata {
    /// Path of the record inside an entry directory
    #[must_use]
    pub fn path_in(entry_dir: &Path) -> PathBuf {
        entry_dir.join(ENTRY_METADATA_FILE)
    }

    /// Read and check the record of `entry_dir`.
    ///
    /// Missing, unparseable and future-schema records all surface as
    /// [`Error::CorruptMetadata`].
    pub fn read(entry_dir: &Path) -> Result<Self> {
        let path = Self::path_in(entry_dir);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::corrupt(&path, format!("unreadable: {e}")))?;
        let meta: Self = serde_json::from_str(&content)
            .map_err(|e| Error::corrupt(&path, format!("malformed: {e}")))?;
        if meta.schema_version == 0 || meta.schema_version > SCHEMA_VERSION {
            return Err(Error::corrupt(
                &path,
                format!("unsupported schema version {}", meta.schema_version),
            ));
        }
        Ok(meta)
    }

    /// Write the record into `entry_dir`
    pub fn write(&self, entry_dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize metadata: {e}")))?;
        write_atomic(&Self::path_in(entry_dir), &json)
    }

    /// Seconds elapsed between `created_at` and `now`
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.created_at
    }
}

/// Root record stored at `<root>/.cache-metadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    /// Layout schema version
    pub schema_version: u32,
    /// When `init` first created the root
    pub initialized_at: DateTime<Utc>,
}

impl RootMetadata {
    /// A fresh record stamped with `now`
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            initialized_at: now,
        }
    }

    /// Read the record at `path`
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::corrupt(path, format!("malformed: {e}")))
    }

    /// Write the record to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            Error::serialization(format!("Failed to serialize root metadata: {e}"))
        })?;
        write_atomic(path, &json)
    }
}

/// Write `bytes` to a uniquely named sibling temp file, then rename it over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".write-")
        .tempfile_in(parent)
        .map_err(|e| Error::io(e, parent, "create temp file"))?;
    tmp.write_all(bytes)
        .map_err(|e| Error::io(e, tmp.path(), "write"))?;
    tmp.persist(path)
        .map_err(|e| Error::io(e.error, path, "rename"))?;
    Ok(())
}
