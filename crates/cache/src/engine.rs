//! The cache engine: store, restore, expiry, eviction and reporting
//!
//! Expiry is evaluated lazily. `restore` treats an expired entry as a miss but
//! leaves it on disk; only `validate`, `cleanup_expired` and eviction delete
//! entries. Reports taken between a restore and the next cleanup therefore still
//! count expired entries in their usage figures.

use crate::config::CacheConfig;
use crate::fsutil::{self, dir_size, mirror, remove_tree};
use crate::journal::Journal;
use crate::key::{CacheKey, derive_key, key_to_path};
use crate::lock::{CacheLock, LockGuard, lock_for};
use crate::metadata::{ENTRY_METADATA_FILE, EntryMetadata, RootMetadata, SCHEMA_VERSION};
use crate::stats::{Stat, StatisticsStore, StatsSnapshot};
use crate::types::{CacheType, SECS_PER_DAY, TypeScope};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Marker in the name of a store's staging directory
const STAGING_MARKER: &str = ".tmp-";

/// What `check_entry` found at an entry path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Valid and restorable
    Valid(EntryMetadata),
    /// No entry directory
    Missing,
    /// Metadata missing, unreadable or malformed
    Corrupt {
        /// What was wrong with the record
        reason: String,
    },
    /// Metadata names another type than the directory it is in
    TypeMismatch {
        /// The recorded type
        recorded: String,
    },
    /// Older than its type's maximum age
    Expired(EntryMetadata),
}

impl EntryStatus {
    /// Short label for listings
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Missing => "missing",
            Self::Corrupt { .. } => "corrupt",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::Expired(_) => "expired",
        }
    }

    /// The validation error this status represents for the entry at `path`, if any
    #[must_use]
    pub fn to_error(&self, path: &Path, cache_type: CacheType) -> Option<Error> {
        match self {
            Self::Corrupt { reason } => Some(Error::corrupt(path, reason.clone())),
            Self::TypeMismatch { recorded } => Some(Error::TypeMismatch {
                path: path.to_path_buf(),
                expected: cache_type.name().to_string(),
                recorded: recorded.clone(),
            }),
            Self::Valid(_) | Self::Missing | Self::Expired(_) => None,
        }
    }
}

/// Result of a successful `store`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOutcome {
    /// Key the tree was stored under
    pub key: CacheKey,
    /// Entry directory
    pub path: PathBuf,
    /// Measured size of the source tree
    pub size_bytes: u64,
    /// Eviction pass that ran after the store
    pub eviction: EvictionReport,
}

/// Result of a successful `restore`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Key that was hit
    pub key: CacheKey,
    /// Size recorded at store time
    pub size_bytes: u64,
    /// Files and links written into the destination
    pub files_copied: usize,
    /// Destination paths removed because the entry lacks them
    pub files_pruned: usize,
}

/// One entry removed by eviction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictedEntry {
    /// Type directory the entry was in
    pub cache_type: CacheType,
    /// Identifier recorded in its metadata
    pub identifier: String,
    /// Unix timestamp of its creation
    pub created_at: i64,
    /// Bytes it occupied
    pub size_bytes: u64,
}

/// Outcome of an eviction pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Root size when the pass started
    pub size_before: u64,
    /// Root size when the pass ended
    pub size_after: u64,
    /// Budget the pass enforced
    pub budget: u64,
    /// Entries removed, in removal order
    pub evicted: Vec<EvictedEntry>,
}

/// Kind of problem found by `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// Metadata missing, unreadable or malformed
    CorruptMetadata {
        /// What was wrong with the record
        reason: String,
    },
    /// Metadata names another type than the directory
    TypeMismatch {
        /// Recorded type
        recorded: String,
    },
}

/// One problem found by `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Type directory being checked
    pub cache_type: CacheType,
    /// Entry directory
    pub path: PathBuf,
    /// What is wrong
    #[serde(flatten)]
    pub kind: IssueKind,
}

/// Outcome of `validate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Entry directories examined
    pub checked: usize,
    /// Problems left in place for the operator
    pub issues: Vec<ValidationIssue>,
    /// Expired entries deleted during the walk
    pub expired_removed: usize,
}

impl ValidationReport {
    /// Number of errors; zero is a pass
    #[must_use]
    pub fn errors(&self) -> usize {
        self.issues.len()
    }

    /// Whether no errors were found
    #[must_use]
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.checked += other.checked;
        self.issues.extend(other.issues);
        self.expired_removed += other.expired_removed;
    }
}

/// Outcome of `cleanup_expired`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Expired or unreadable entries removed
    pub removed: usize,
    /// Bytes those entries occupied
    pub bytes_freed: u64,
    /// Abandoned staging directories removed
    pub staging_removed: usize,
}

/// Per-type usage figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeUsage {
    /// The type
    pub cache_type: CacheType,
    /// Its description
    pub description: String,
    /// Its maximum age
    pub max_age_days: u32,
    /// Directories holding a metadata file
    pub entries: usize,
    /// Bytes on disk under the type directory
    pub size_bytes: u64,
}

/// Everything `stats` prints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    /// Cache root
    pub root: PathBuf,
    /// Usage by type, in table order
    pub types: Vec<TypeUsage>,
    /// Ledger counters
    pub stats: StatsSnapshot,
    /// Hit percentage, absent before any lookup
    pub hit_rate: Option<f64>,
    /// Bytes on disk under the root
    pub total_size_bytes: u64,
    /// Configured budget
    pub max_size_bytes: u64,
}

/// One row of `list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySummary {
    /// Type directory
    pub cache_type: CacheType,
    /// Directory name (hash of the key)
    pub hash: String,
    /// Recorded identifier, when the metadata is readable
    pub identifier: Option<String>,
    /// Recorded creation time, when the metadata is readable
    pub created_at: Option<i64>,
    /// Bytes on disk
    pub size_bytes: u64,
    /// Status label (`valid`, `expired`, `corrupt`, `type-mismatch`)
    pub status: String,
}

/// A candidate considered by the eviction pass
struct Candidate {
    path: PathBuf,
    cache_type: CacheType,
    meta: EntryMetadata,
}

/// Whether an entry of `cache_type` with `meta` is past its maximum age.
///
/// Ages are compared in whole days, so an entry exactly `max_age_days` old is
/// still valid.
#[must_use]
pub fn is_expired(meta: &EntryMetadata, cache_type: CacheType, now: DateTime<Utc>) -> bool {
    meta.age_secs(now).div_euclid(SECS_PER_DAY) > i64::from(cache_type.max_age_days())
}

/// Whether an entry is old enough to be removed under size pressure
#[must_use]
pub fn is_evictable(meta: &EntryMetadata, cache_type: CacheType, now: DateTime<Utc>) -> bool {
    meta.age_secs(now) > cache_type.max_age_secs() / 2
}

/// The cache engine bound to one cache root
#[derive(Debug, Clone)]
pub struct CacheEngine {
    config: CacheConfig,
    lock: Arc<dyn CacheLock>,
    stats: StatisticsStore,
    journal: Journal,
}

impl CacheEngine {
    /// Engine for `config`, locking according to `config.lock`
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let lock = lock_for(config.lock, &config.lock_path());
        Self::with_lock(config, lock)
    }

    /// Engine using a caller-provided lock implementation
    #[must_use]
    pub fn with_lock(config: CacheConfig, lock: Arc<dyn CacheLock>) -> Self {
        let stats = StatisticsStore::new(config.stats_path(), Arc::clone(&lock));
        let journal = Journal::new(config.log_path());
        Self {
            config,
            lock,
            stats,
            journal,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Statistics ledger
    #[must_use]
    pub const fn stats(&self) -> &StatisticsStore {
        &self.stats
    }

    /// Operation log
    #[must_use]
    pub const fn journal(&self) -> &Journal {
        &self.journal
    }

    pub(crate) fn guard(&self) -> Result<LockGuard<'_>> {
        LockGuard::acquire(self.lock.as_ref())
    }

    /// Directory of one type
    #[must_use]
    pub fn type_dir(&self, cache_type: CacheType) -> PathBuf {
        self.config.root.join(cache_type.name())
    }

    /// Create the root, every type directory, the root record and the ledger if absent
    pub fn init(&self) -> Result<()> {
        let root = &self.config.root;
        let fresh = !root.join(".cache-metadata").exists();
        fs::create_dir_all(root).map_err(|e| Error::io(e, root, "create_dir_all"))?;
        for cache_type in CacheType::ALL {
            let dir = self.type_dir(cache_type);
            fs::create_dir_all(&dir).map_err(|e| Error::io(e, &dir, "create_dir_all"))?;
        }
        if fresh {
            RootMetadata::new(Utc::now()).write(&self.config.root_metadata_path())?;
        }
        self.stats.ensure()?;
        if fresh {
            tracing::info!(root = %root.display(), "Initialized cache root");
            self.journal.info(format!(
                "initialized cache root {} (schema {SCHEMA_VERSION})",
                root.display()
            ));
        }
        Ok(())
    }

    /// Key for `(cache_type, identifier)` under the configured config file
    #[must_use]
    pub fn derive_key(&self, cache_type: CacheType, identifier: Option<&str>) -> CacheKey {
        derive_key(cache_type, identifier, &self.config.config_file)
    }

    /// Entry directory for `key`
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        key_to_path(&self.config.root, key)
    }

    /// Copy `source` into the cache under `(cache_type, identifier)`.
    ///
    /// The tree is mirrored into a staging directory and renamed into place, so a
    /// failed copy never leaves a partial entry. Any previous entry under the same
    /// key is replaced; on failure it is removed as well. Eviction runs after every
    /// successful store. A top-level `.metadata` in `source` is not cached and is
    /// reported as a warning.
    pub fn store(
        &self,
        cache_type: CacheType,
        source: &Path,
        identifier: Option<&str>,
    ) -> Result<StoreOutcome> {
        let result = self.store_inner(cache_type, source, identifier);
        if let Err(e) = &result {
            tracing::error!(cache_type = %cache_type, source = %source.display(), "Store failed: {e}");
            self.journal.error(format!(
                "store {cache_type} from {} failed: {e}",
                source.display()
            ));
        }
        result
    }

    fn store_inner(
        &self,
        cache_type: CacheType,
        source: &Path,
        identifier: Option<&str>,
    ) -> Result<StoreOutcome> {
        if !source.is_dir() || fs::read_dir(source).is_err() {
            return Err(Error::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let _guard = self.guard()?;
        self.init()?;

        let key = self.derive_key(cache_type, identifier);
        let entry = self.entry_path(&key);
        let size_bytes = dir_size(source)?;
        let staging = staging_path(&entry);

        tracing::debug!(
            key = %key,
            entry = %entry.display(),
            size_bytes,
            "Storing tree"
        );

        // The entry record owns this name, so the source's copy is left behind
        if fs::symlink_metadata(source.join(ENTRY_METADATA_FILE)).is_ok() {
            tracing::warn!(
                source = %source.display(),
                "Source has a top-level {ENTRY_METADATA_FILE} that will not be cached"
            );
            self.journal.warn(format!(
                "store {cache_type}:{}: top-level {ENTRY_METADATA_FILE} in {} is not cached",
                key.identifier,
                source.display()
            ));
        }

        remove_tree(&staging)?;
        if let Err(e) = mirror(source, &staging, &[ENTRY_METADATA_FILE]) {
            let _ = remove_tree(&staging);
            let _ = remove_tree(&entry);
            return Err(Error::copy_failed(e, source, &entry));
        }

        if let Err(e) = remove_tree(&entry) {
            let _ = remove_tree(&staging);
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, &entry) {
            let _ = remove_tree(&staging);
            return Err(Error::copy_failed(e, &staging, &entry));
        }

        let meta = EntryMetadata {
            cache_key: key.to_string(),
            cache_type: cache_type.name().to_string(),
            identifier: key.identifier.clone(),
            created_at: Utc::now().timestamp(),
            size_bytes,
            schema_version: SCHEMA_VERSION,
        };
        if let Err(e) = meta.write(&entry) {
            let _ = remove_tree(&entry);
            return Err(e);
        }

        self.stats.add(Stat::CacheSaves, 1)?;
        self.stats.add(Stat::TotalBytesStored, size_bytes)?;

        tracing::info!(key = %key, size_bytes, "Stored cache entry");
        self.journal.info(format!(
            "stored {cache_type}:{} ({}) from {}",
            key.identifier,
            fsutil::human_size(size_bytes),
            source.display()
        ));

        let eviction = match self.evict() {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Eviction after store failed: {e}");
                self.journal.warn(format!("eviction after store failed: {e}"));
                EvictionReport::default()
            }
        };

        Ok(StoreOutcome {
            key,
            path: entry,
            size_bytes,
            eviction,
        })
    }

    /// Mirror the entry for `(cache_type, identifier)` into `dest`.
    ///
    /// `dest` is created if needed, even on a miss. A missing, corrupt, mismatched
    /// or expired entry yields [`Error::CacheMiss`]; expired entries stay on disk.
    pub fn restore(
        &self,
        cache_type: CacheType,
        dest: &Path,
        identifier: Option<&str>,
    ) -> Result<RestoreOutcome> {
        fs::create_dir_all(dest).map_err(|e| Error::io(e, dest, "create_dir_all"))?;
        self.init()?;

        let key = self.derive_key(cache_type, identifier);
        let entry = self.entry_path(&key);

        let meta = match self.check_entry_at(&entry, cache_type, Utc::now()) {
            EntryStatus::Valid(meta) => meta,
            status => {
                self.stats.add(Stat::CacheMisses, 1)?;
                tracing::info!(key = %key, status = status.label(), "Cache miss");
                self.journal.info(format!(
                    "miss {cache_type}:{} ({})",
                    key.identifier,
                    status.label()
                ));
                return Err(Error::miss(cache_type.name(), &key.identifier));
            }
        };

        let report = mirror(&entry, dest, &[ENTRY_METADATA_FILE]).map_err(|e| {
            let err = Error::copy_failed(e, &entry, dest);
            self.journal.error(format!("restore {cache_type}:{} failed: {err}", key.identifier));
            err
        })?;

        self.stats.add(Stat::CacheHits, 1)?;
        self.stats.add(Stat::TotalBytesSaved, meta.size_bytes)?;

        tracing::info!(key = %key, size_bytes = meta.size_bytes, "Cache hit");
        self.journal.info(format!(
            "hit {cache_type}:{} ({}) restored to {}",
            key.identifier,
            fsutil::human_size(meta.size_bytes),
            dest.display()
        ));

        Ok(RestoreOutcome {
            key,
            size_bytes: meta.size_bytes,
            files_copied: report.copied,
            files_pruned: report.pruned,
        })
    }

    /// Remove one type's entries, or everything under the root for [`TypeScope::All`].
    ///
    /// Clearing everything also zeroes the statistics ledger. Idempotent.
    pub fn clear(&self, scope: TypeScope) -> Result<()> {
        let _guard = self.guard()?;
        match scope {
            TypeScope::All => {
                if self.config.root.exists() {
                    let lock_path = self.config.lock_path();
                    let children = fs::read_dir(&self.config.root)
                        .map_err(|e| Error::io(e, &self.config.root, "read_dir"))?;
                    for child in children {
                        let child =
                            child.map_err(|e| Error::io(e, &self.config.root, "read_dir"))?;
                        let path = child.path();
                        if path == lock_path {
                            continue;
                        }
                        if path.is_dir() {
                            remove_tree(&path)?;
                        } else {
                            fs::remove_file(&path).map_err(|e| Error::io(e, &path, "remove"))?;
                        }
                    }
                }
                self.init()?;
                self.stats.reset()?;
            }
            TypeScope::One(cache_type) => {
                let dir = self.type_dir(cache_type);
                remove_tree(&dir)?;
                self.init()?;
            }
        }
        tracing::info!(scope = %scope, "Cleared cache");
        self.journal.info(format!("cleared {scope}"));
        Ok(())
    }

    /// Classify the entry directory `entry_dir` as seen from `cache_type`
    #[must_use]
    pub fn check_entry(&self, entry_dir: &Path, cache_type: CacheType) -> EntryStatus {
        self.check_entry_at(entry_dir, cache_type, Utc::now())
    }

    pub(crate) fn check_entry_at(
        &self,
        entry_dir: &Path,
        cache_type: CacheType,
        now: DateTime<Utc>,
    ) -> EntryStatus {
        if !entry_dir.is_dir() {
            return EntryStatus::Missing;
        }
        let meta = match EntryMetadata::read(entry_dir) {
            Ok(meta) => meta,
            Err(Error::CorruptMetadata { reason, .. }) => return EntryStatus::Corrupt { reason },
            Err(e) => {
                return EntryStatus::Corrupt {
                    reason: e.to_string(),
                };
            }
        };
        if meta.cache_type != cache_type.name() {
            return EntryStatus::TypeMismatch {
                recorded: meta.cache_type,
            };
        }
        if is_expired(&meta, cache_type, now) {
            return EntryStatus::Expired(meta);
        }
        EntryStatus::Valid(meta)
    }

    /// Whether `entry_dir` holds a restorable entry of `cache_type`
    #[must_use]
    pub fn is_valid(&self, entry_dir: &Path, cache_type: CacheType) -> bool {
        matches!(self.check_entry(entry_dir, cache_type), EntryStatus::Valid(_))
    }

    /// Entry directories of one type, excluding staging directories
    pub fn entry_dirs(&self, cache_type: CacheType) -> Result<Vec<PathBuf>> {
        Ok(self
            .type_children(cache_type)?
            .into_iter()
            .filter(|p| !is_staging(p))
            .collect())
    }

    fn type_children(&self, cache_type: CacheType) -> Result<Vec<PathBuf>> {
        let dir = self.type_dir(cache_type);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &dir, "read_dir")),
        };
        let mut dirs = Vec::new();
        for child in read {
            let child = child.map_err(|e| Error::io(e, &dir, "read_dir"))?;
            let path = child.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Check every entry in `scope`.
    ///
    /// Corrupt and mismatched entries are reported and left in place; expired
    /// entries are deleted.
    pub fn validate(&self, scope: TypeScope) -> Result<ValidationReport> {
        let _guard = self.guard()?;
        let now = Utc::now();
        let mut report = ValidationReport::default();
        for cache_type in scope.types() {
            report.merge(self.validate_type(cache_type, now)?);
        }

        if report.passed() {
            tracing::info!(scope = %scope, checked = report.checked, "Validation passed");
            self.journal.info(format!(
                "validate {scope}: {} entries ok, {} expired removed",
                report.checked, report.expired_removed
            ));
        } else {
            tracing::warn!(scope = %scope, errors = report.errors(), "Validation found errors");
            self.journal.warn(format!(
                "validate {scope}: {} errors in {} entries",
                report.errors(),
                report.checked
            ));
        }
        Ok(report)
    }

    fn validate_type(&self, cache_type: CacheType, now: DateTime<Utc>) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        for entry in self.entry_dirs(cache_type)? {
            report.checked += 1;
            let status = self.check_entry_at(&entry, cache_type, now);
            if let Some(err) = status.to_error(&entry, cache_type) {
                tracing::warn!(entry = %entry.display(), "{err}");
                self.journal.warn(err.to_string());
            }
            match status {
                EntryStatus::Valid(_) | EntryStatus::Missing => {}
                EntryStatus::Corrupt { reason } => {
                    report.issues.push(ValidationIssue {
                        cache_type,
                        path: entry,
                        kind: IssueKind::CorruptMetadata { reason },
                    });
                }
                EntryStatus::TypeMismatch { recorded } => {
                    report.issues.push(ValidationIssue {
                        cache_type,
                        path: entry,
                        kind: IssueKind::TypeMismatch { recorded },
                    });
                }
                EntryStatus::Expired(meta) => {
                    remove_tree(&entry)?;
                    tracing::debug!(
                        entry = %entry.display(),
                        identifier = %meta.identifier,
                        "Removed expired entry"
                    );
                    report.expired_removed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Remove every expired or unreadable entry and abandoned staging directory
    pub fn cleanup_expired(&self) -> Result<CleanupReport> {
        self.cleanup_expired_at(Utc::now())
    }

    pub(crate) fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let _guard = self.guard()?;
        let mut report = CleanupReport::default();
        for cache_type in CacheType::ALL {
            for path in self.type_children(cache_type)? {
                if is_staging(&path) {
                    remove_tree(&path)?;
                    report.staging_removed += 1;
                    continue;
                }
                match self.check_entry_at(&path, cache_type, now) {
                    EntryStatus::Expired(_) | EntryStatus::Corrupt { .. } => {
                        let size = dir_size(&path)?;
                        remove_tree(&path)?;
                        report.removed += 1;
                        report.bytes_freed += size;
                        tracing::debug!(entry = %path.display(), size, "Removed stale entry");
                    }
                    _ => {}
                }
            }
        }
        tracing::info!(
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            "Cleanup finished"
        );
        self.journal.info(format!(
            "cleanup removed {} entries ({})",
            report.removed,
            fsutil::human_size(report.bytes_freed)
        ));
        Ok(report)
    }

    /// Bring the root back under the size budget.
    ///
    /// Only entries older than half their type's maximum age are candidates; the
    /// oldest go first and the pass stops as soon as the budget is met.
    pub fn evict(&self) -> Result<EvictionReport> {
        self.evict_at(Utc::now())
    }

    pub(crate) fn evict_at(&self, now: DateTime<Utc>) -> Result<EvictionReport> {
        let _guard = self.guard()?;
        let budget = self.config.max_size_bytes;
        let mut total = dir_size(&self.config.root)?;
        let mut report = EvictionReport {
            size_before: total,
            size_after: total,
            budget,
            evicted: Vec::new(),
        };
        if total <= budget {
            return Ok(report);
        }

        let mut candidates = self.eviction_candidates()?;
        candidates.sort_by_key(|c| c.meta.created_at);

        for candidate in candidates {
            if total <= budget {
                break;
            }
            if !is_evictable(&candidate.meta, candidate.cache_type, now) {
                continue;
            }
            let size_bytes = dir_size(&candidate.path)?;
            remove_tree(&candidate.path)?;
            self.stats.add(Stat::CacheEvictions, 1)?;
            total = dir_size(&self.config.root)?;

            tracing::info!(
                entry = %candidate.path.display(),
                identifier = %candidate.meta.identifier,
                size_bytes,
                "Evicted cache entry"
            );
            self.journal.info(format!(
                "evicted {}:{} ({})",
                candidate.cache_type,
                candidate.meta.identifier,
                fsutil::human_size(size_bytes)
            ));
            report.evicted.push(EvictedEntry {
                cache_type: candidate.cache_type,
                identifier: candidate.meta.identifier,
                created_at: candidate.meta.created_at,
                size_bytes,
            });
        }

        report.size_after = total;
        if total > budget {
            tracing::warn!(
                total,
                budget,
                "Cache still over budget; remaining entries are too young to evict"
            );
        }
        Ok(report)
    }

    fn eviction_candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for cache_type in CacheType::ALL {
            for path in self.entry_dirs(cache_type)? {
                if let Ok(meta) = EntryMetadata::read(&path) {
                    candidates.push(Candidate {
                        path,
                        cache_type,
                        meta,
                    });
                }
            }
        }
        Ok(candidates)
    }

    /// Usage per type plus the ledger and derived hit rate
    pub fn report(&self) -> Result<CacheReport> {
        let mut types = Vec::with_capacity(CacheType::ALL.len());
        for cache_type in CacheType::ALL {
            let entries = self
                .entry_dirs(cache_type)?
                .iter()
                .filter(|p| EntryMetadata::path_in(p).is_file())
                .count();
            let descriptor = cache_type.descriptor();
            types.push(TypeUsage {
                cache_type,
                description: descriptor.description.to_string(),
                max_age_days: descriptor.max_age_days,
                entries,
                size_bytes: dir_size(&self.type_dir(cache_type))?,
            });
        }
        let stats = self.stats.snapshot()?;
        Ok(CacheReport {
            root: self.config.root.clone(),
            types,
            hit_rate: stats.hit_rate(),
            stats,
            total_size_bytes: dir_size(&self.config.root)?,
            max_size_bytes: self.config.max_size_bytes,
        })
    }

    /// Describe every entry in `scope`
    pub fn list(&self, scope: TypeScope) -> Result<Vec<EntrySummary>> {
        let now = Utc::now();
        let mut rows = Vec::new();
        for cache_type in scope.types() {
            for path in self.entry_dirs(cache_type)? {
                let status = self.check_entry_at(&path, cache_type, now);
                let meta = EntryMetadata::read(&path).ok();
                rows.push(EntrySummary {
                    cache_type,
                    hash: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    identifier: meta.as_ref().map(|m| m.identifier.clone()),
                    created_at: meta.as_ref().map(|m| m.created_at),
                    size_bytes: dir_size(&path)?,
                    status: status.label().to_string(),
                });
            }
        }
        Ok(rows)
    }
}

fn staging_path(entry: &Path) -> PathBuf {
    let name = entry
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    entry.with_file_name(format!("{name}{STAGING_MARKER}{}", std::process::id()))
}

fn is_staging(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().contains(STAGING_MARKER))
}
