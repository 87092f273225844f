//! Typed, expiring, size-bounded cache for large filesystem trees
//!
//! This crate stores and restores whole directory trees (downloads, build
//! output, toolchains, compiler caches) under a single cache root:
//! - Deterministic keys derived from type, identifier and a config file hash
//! - Mirror copies with replace-on-success semantics
//! - Per-type expiry evaluated on access
//! - Size-budget eviction restricted to entries past half their lifetime
//! - A persistent statistics ledger and append-only operation log
//! - Whole-root export and import
//!
//! # Layout
//!
//! ```text
//! <root>/.cache-metadata        schema version + init timestamp
//! <root>/.cache-stats           counter=value lines
//! <root>/cache.log              append-only operation log
//! <root>/<type>/<hash>/.metadata
//! <root>/<type>/<hash>/...      mirrored artifact content
//! ```
//!
//! # Concurrency
//!
//! The engine is synchronous and assumes serialized invocations unless a
//! [`FileLock`] is configured (`CACHE_LOCK=file`), in which case mutating
//! operations and statistics updates hold an exclusive lock on
//! `<root>/.cache-lock`.

// TODO(cache-docs): Add # Errors documentation to all fallible public functions
#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod archive;
pub mod config;
pub mod engine;
mod error;
pub mod fsutil;
pub mod journal;
pub mod key;
pub mod lock;
pub mod metadata;
pub mod stats;
pub mod types;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use archive::{ExportReport, ImportReport};
pub use config::{CacheConfig, LockMode};
pub use engine::{
    CacheEngine, CacheReport, CleanupReport, EntryStatus, EntrySummary, EvictionReport,
    IssueKind, RestoreOutcome, StoreOutcome, TypeUsage, ValidationIssue, ValidationReport,
};
pub use key::{CacheKey, derive_key, key_to_path};
pub use lock::{CacheLock, FileLock, LockGuard, NoopLock};
pub use metadata::EntryMetadata;
pub use stats::{Stat, StatUpdate, StatisticsStore, StatsSnapshot};
pub use types::{CacheType, CacheTypeDescriptor, TypeScope};
