//! Error types for the cache engine

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The tree handed to `store` does not exist or cannot be read
    #[error("Source path not found: {}", path.display())]
    #[diagnostic(
        code(treecache::source_not_found),
        help("Make sure the directory exists before storing it")
    )]
    SourceNotFound {
        /// The missing source path
        path: PathBuf,
    },

    /// Mirroring a tree into or out of the cache failed
    #[error("Copy from {} to {} failed", from.display(), to.display())]
    #[diagnostic(
        code(treecache::copy_failed),
        help("Check free space and permissions on both sides of the copy")
    )]
    CopyFailed {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Copy source
        from: PathBuf,
        /// Copy destination
        to: PathBuf,
    },

    /// No valid entry exists for the requested key
    #[error("Cache miss for {cache_type}:{identifier}")]
    #[diagnostic(
        code(treecache::miss),
        help("The entry may have expired, been evicted or never been stored")
    )]
    CacheMiss {
        /// Cache type that was looked up
        cache_type: String,
        /// Identifier that was looked up
        identifier: String,
    },

    /// An entry's metadata record is missing, unreadable or malformed
    #[error("Corrupt metadata at {}: {reason}", path.display())]
    #[diagnostic(code(treecache::corrupt_metadata))]
    CorruptMetadata {
        /// Path of the metadata file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// An entry's metadata names a different type than the directory it lives in
    #[error("Entry {} records type {recorded} but lives under {expected}", path.display())]
    #[diagnostic(
        code(treecache::type_mismatch),
        help("Remove the entry or clear the type; mismatched entries are never restored")
    )]
    TypeMismatch {
        /// Entry directory
        path: PathBuf,
        /// Type of the directory containing the entry
        expected: String,
        /// Type recorded in the metadata
        recorded: String,
    },

    /// The archive passed to `import` does not exist
    #[error("Archive not found: {}", path.display())]
    #[diagnostic(code(treecache::archive_not_found))]
    ArchiveNotFound {
        /// The missing archive path
        path: PathBuf,
    },

    /// A type name that is not in the type table
    #[error("Unknown cache type: {name}")]
    #[diagnostic(
        code(treecache::unknown_type),
        help("Valid types are: dl, build_dir, staging_dir, tmp, ccache, feeds")
    )]
    UnknownCacheType {
        /// The rejected name
        name: String,
    },

    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(treecache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(treecache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(treecache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Failed to acquire or release the cache root lock
    #[error("Lock error on {}: {message}", path.display())]
    #[diagnostic(
        code(treecache::lock),
        help("Another process may hold the cache lock")
    )]
    Lock {
        /// Lock file path
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a copy failure error
    #[must_use]
    pub fn copy_failed(source: std::io::Error, from: &Path, to: &Path) -> Self {
        Self::CopyFailed {
            source,
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        }
    }

    /// Create a corrupt metadata error
    #[must_use]
    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a cache miss error
    #[must_use]
    pub fn miss(cache_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::CacheMiss {
            cache_type: cache_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a lock error
    #[must_use]
    pub fn lock(path: &Path, message: impl Into<String>) -> Self {
        Self::Lock {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether this is the routine "nothing cached" outcome rather than a failure
    #[must_use]
    pub const fn is_miss(&self) -> bool {
        matches!(self, Self::CacheMiss { .. })
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
