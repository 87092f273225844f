//! Deterministic cache key derivation

use crate::types::CacheType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier used when the caller does not supply one
pub const DEFAULT_IDENTIFIER: &str = "default";
/// Fingerprint used when the config file is absent or unreadable
pub const NO_CONFIG: &str = "no-config";

/// Identity of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Kind of artifact
    pub cache_type: CacheType,
    /// Caller-supplied identifier, `default` when omitted
    pub identifier: String,
    /// SHA-256 of the config file, or [`NO_CONFIG`]
    pub fingerprint: String,
}

impl CacheKey {
    /// Hex SHA-256 of the canonical JSON form of this key.
    ///
    /// Hashing the structured form rather than a delimited string keeps
    /// `("a-b", "c")` and `("a", "b-c")` apart.
    #[must_use]
    pub fn hash(&self) -> String {
        // Field order is fixed by the struct, so the encoding is canonical
        let bytes = serde_json::to_vec(self).unwrap_or_else(|_| self.to_string().into_bytes());
        hex::encode(Sha256::digest(bytes))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.cache_type, self.identifier, self.fingerprint
        )
    }
}

/// SHA-256 of the config file's bytes, degrading to [`NO_CONFIG`] when unreadable
#[must_use]
pub fn config_fingerprint(config_file: &Path) -> String {
    match fs::read(config_file) {
        Ok(bytes) => hex::encode(Sha256::digest(bytes)),
        Err(e) => {
            tracing::debug!(
                path = %config_file.display(),
                error = %e,
                "Config file unreadable; using no-config fingerprint"
            );
            NO_CONFIG.to_string()
        }
    }
}

/// Derive the key for `(cache_type, identifier)` under the given config file
#[must_use]
pub fn derive_key(cache_type: CacheType, identifier: Option<&str>, config_file: &Path) -> CacheKey {
    let identifier = identifier
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_IDENTIFIER);
    CacheKey {
        cache_type,
        identifier: identifier.to_string(),
        fingerprint: config_fingerprint(config_file),
    }
}

/// `<root>/<type>/<sha256(key)>`
#[must_use]
pub fn key_to_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(key.cache_type.name()).join(key.hash())
}
