//! Integration tests for the cache engine
//!
//! Covers the behavioral contracts callers rely on: round trips, hit/miss
//! accounting, expiry boundaries, the eviction floor, idempotent clearing and
//! whole-root export/import. Ages are simulated by backdating metadata.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treecache_cache::fsutil::dir_size;
use treecache_cache::types::SECS_PER_DAY;
use treecache_cache::{
    CacheConfig, CacheEngine, CacheType, EntryMetadata, Error, IssueKind, LockMode, Stat,
    StatsSnapshot, TypeScope,
};

struct Fixture {
    temp: TempDir,
    engine: CacheEngine,
}

impl Fixture {
    fn new() -> Self {
        Self::with_budget(u64::MAX)
    }

    fn with_budget(max_size_bytes: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = CacheConfig::with_root(temp.path().join("cache"));
        config.config_file = temp.path().join(".config");
        config.max_size_bytes = max_size_bytes;
        fs::write(&config.config_file, "CONFIG_TARGET_x86=y\n").unwrap();
        let engine = CacheEngine::new(config);
        engine.init().unwrap();
        Self { temp, engine }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp.path().join(rel)
    }

    /// A tree with one payload file of `bytes` bytes plus a small nested file
    fn tree(&self, name: &str, bytes: usize) -> PathBuf {
        let dir = self.path(name);
        fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        fs::write(dir.join("payload.bin"), vec![0xA5u8; bytes]).unwrap();
        fs::write(dir.join("nested/deeper/note.txt"), name).unwrap();
        dir
    }

    fn snapshot(&self) -> StatsSnapshot {
        self.engine.stats().snapshot().unwrap()
    }
}

fn backdate(entry: &Path, secs: i64) {
    let mut meta = EntryMetadata::read(entry).unwrap();
    meta.created_at -= secs;
    meta.write(entry).unwrap();
}

fn files_under(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn test_store_restore_round_trip() {
    let fx = Fixture::new();
    let src = fx.tree("src", 10_000);
    let expected_size = dir_size(&src).unwrap();

    let stored = fx.engine.store(CacheType::BuildDir, &src, Some("fw")).unwrap();
    assert_eq!(stored.size_bytes, expected_size);
    let meta = EntryMetadata::read(&stored.path).unwrap();
    assert_eq!(meta.size_bytes, expected_size);
    assert_eq!(meta.cache_type, "build_dir");
    assert_eq!(meta.identifier, "fw");

    let dest = fx.path("dest");
    let restored = fx.engine.restore(CacheType::BuildDir, &dest, Some("fw")).unwrap();
    assert_eq!(restored.size_bytes, expected_size);
    assert_eq!(files_under(&src), files_under(&dest));
    assert!(!dest.join(".metadata").exists());
}

#[test]
fn test_restore_mirrors_and_prunes_destination() {
    let fx = Fixture::new();
    let src = fx.tree("src", 100);
    fx.engine.store(CacheType::Dl, &src, None).unwrap();

    let dest = fx.path("dest");
    fs::create_dir_all(dest.join("leftover")).unwrap();
    fs::write(dest.join("leftover/old.o"), "stale").unwrap();
    fs::write(dest.join("payload.bin"), "overwritten").unwrap();

    let restored = fx.engine.restore(CacheType::Dl, &dest, None).unwrap();
    assert!(restored.files_pruned >= 2);
    assert!(!dest.join("leftover").exists());
    assert_eq!(files_under(&src), files_under(&dest));
}

#[test]
fn test_restore_creates_destination_and_does_not_share_content() {
    let fx = Fixture::new();
    let src = fx.tree("src", 10);
    let stored = fx.engine.store(CacheType::Ccache, &src, None).unwrap();

    let dest = fx.path("a/b/c");
    fx.engine.restore(CacheType::Ccache, &dest, None).unwrap();
    fs::write(dest.join("payload.bin"), "mutated by caller").unwrap();

    assert_eq!(fs::read(stored.path.join("payload.bin")).unwrap(), vec![0xA5u8; 10]);
}

#[test]
fn test_restore_creates_destination_even_on_miss() {
    let fx = Fixture::new();
    let dest = fx.path("fresh/dest");
    let err = fx.engine.restore(CacheType::Tmp, &dest, None).unwrap_err();
    assert!(err.is_miss());
    assert!(dest.is_dir());
}

#[test]
fn test_restore_does_not_fall_back_to_other_identifier() {
    let fx = Fixture::new();
    fx.engine.store(CacheType::Dl, &fx.tree("src", 10), Some("a")).unwrap();
    assert!(fx.engine.restore(CacheType::Dl, &fx.path("d"), Some("b")).is_err());
    assert!(fx.engine.restore(CacheType::Dl, &fx.path("d"), None).is_err());
}

// =============================================================================
// Store failure handling and re-store
// =============================================================================

#[test]
fn test_store_missing_source_fails_without_entry() {
    let fx = Fixture::new();
    let err = fx
        .engine
        .store(CacheType::Dl, &fx.path("does-not-exist"), None)
        .unwrap_err();
    assert!(matches!(err, Error::SourceNotFound { .. }));
    assert!(fx.engine.entry_dirs(CacheType::Dl).unwrap().is_empty());
    assert_eq!(fx.snapshot().cache_saves, 0);

    let log = fs::read_to_string(fx.engine.config().log_path()).unwrap();
    assert!(log.contains("[ERROR]"));
}

#[test]
fn test_store_replaces_stale_content() {
    let fx = Fixture::new();
    let src = fx.tree("src", 10);
    fs::write(src.join("only-in-first.txt"), "x").unwrap();
    let first = fx.engine.store(CacheType::StagingDir, &src, None).unwrap();
    assert!(first.path.join("only-in-first.txt").exists());

    fs::remove_file(src.join("only-in-first.txt")).unwrap();
    let second = fx.engine.store(CacheType::StagingDir, &src, None).unwrap();
    assert_eq!(first.path, second.path);
    assert!(!second.path.join("only-in-first.txt").exists());
    assert_eq!(fx.engine.entry_dirs(CacheType::StagingDir).unwrap().len(), 1);
}

fn staging_dirs(fx: &Fixture, cache_type: CacheType) -> Vec<PathBuf> {
    fs::read_dir(fx.engine.type_dir(cache_type))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains(".tmp-"))
        .collect()
}

#[cfg(unix)]
#[test]
fn test_copy_failure_removes_staging_and_previous_entry() {
    let fx = Fixture::new();
    let stored = fx.engine.store(CacheType::BuildDir, &fx.tree("v1", 64), Some("fw")).unwrap();
    assert!(stored.path.is_dir());
    let saves = fx.snapshot().cache_saves;

    // Regular files copy fine, the socket cannot be opened for reading
    let src = fx.tree("v2", 64);
    let _listener = std::os::unix::net::UnixListener::bind(src.join("agent.sock")).unwrap();

    let err = fx
        .engine
        .store(CacheType::BuildDir, &src, Some("fw"))
        .unwrap_err();
    assert!(matches!(err, Error::CopyFailed { .. }), "got {err:?}");
    assert!(!stored.path.exists());
    assert!(staging_dirs(&fx, CacheType::BuildDir).is_empty());
    assert!(fx.engine.entry_dirs(CacheType::BuildDir).unwrap().is_empty());
    assert_eq!(fx.snapshot().cache_saves, saves);
}

#[test]
fn test_failed_replace_removes_staging() {
    let fx = Fixture::new();
    let key = fx.engine.derive_key(CacheType::Dl, Some("blocked"));
    let entry = fx.engine.entry_path(&key);
    fs::create_dir_all(entry.parent().unwrap()).unwrap();
    fs::write(&entry, "not a directory").unwrap();

    let err = fx
        .engine
        .store(CacheType::Dl, &fx.tree("src", 16), Some("blocked"))
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "got {err:?}");
    assert!(staging_dirs(&fx, CacheType::Dl).is_empty());
    assert_eq!(fx.snapshot().cache_saves, 0);
}

#[test]
fn test_source_metadata_file_is_not_cached_and_warns() {
    let fx = Fixture::new();
    let src = fx.tree("src", 16);
    fs::write(src.join(".metadata"), "belongs to the source").unwrap();

    let stored = fx.engine.store(CacheType::Dl, &src, None).unwrap();
    assert!(EntryMetadata::read(&stored.path).is_ok());

    let dest = fx.path("dest");
    fx.engine.restore(CacheType::Dl, &dest, None).unwrap();
    assert!(!dest.join(".metadata").exists());
    assert!(dest.join("payload.bin").is_file());

    let log = fs::read_to_string(fx.engine.config().log_path()).unwrap();
    assert!(log.contains("[WARN] store dl:default: top-level .metadata"));
}

// =============================================================================
// Hit / miss accounting
// =============================================================================

#[test]
fn test_miss_then_hit() {
    let fx = Fixture::new();
    let dest = fx.path("dest");

    let before = fx.snapshot();
    let err = fx.engine.restore(CacheType::Feeds, &dest, Some("pkgs")).unwrap_err();
    assert!(err.is_miss());
    let after_miss = fx.snapshot();
    assert_eq!(after_miss.cache_misses, before.cache_misses + 1);
    assert_eq!(after_miss.cache_hits, before.cache_hits);

    let src = fx.tree("src", 321);
    let stored = fx.engine.store(CacheType::Feeds, &src, Some("pkgs")).unwrap();
    fx.engine.restore(CacheType::Feeds, &dest, Some("pkgs")).unwrap();

    let after_hit = fx.snapshot();
    assert_eq!(after_hit.cache_hits, after_miss.cache_hits + 1);
    assert_eq!(after_hit.cache_misses, after_miss.cache_misses);
    assert_eq!(after_hit.cache_saves, 1);
    assert_eq!(after_hit.total_bytes_stored, stored.size_bytes);
    assert_eq!(after_hit.total_bytes_saved, stored.size_bytes);
    assert!((after_hit.hit_rate().unwrap() - 50.0).abs() < f64::EPSILON);
}

#[test]
fn test_miss_is_logged_as_info() {
    let fx = Fixture::new();
    let _ = fx.engine.restore(CacheType::Dl, &fx.path("d"), None);
    let log = fs::read_to_string(fx.engine.config().log_path()).unwrap();
    let last = log.lines().last().unwrap();
    assert!(last.contains("[INFO] miss dl:default"));
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn test_expiry_boundary() {
    let fx = Fixture::new();
    let src = fx.tree("src", 64);
    let stored = fx.engine.store(CacheType::BuildDir, &src, None).unwrap();
    let dest = fx.path("dest");

    // Exactly the max age: still a hit
    backdate(&stored.path, 7 * SECS_PER_DAY);
    assert!(fx.engine.is_valid(&stored.path, CacheType::BuildDir));
    fx.engine.restore(CacheType::BuildDir, &dest, None).unwrap();

    // One day further: a miss, but the entry stays on disk
    backdate(&stored.path, SECS_PER_DAY);
    assert!(!fx.engine.is_valid(&stored.path, CacheType::BuildDir));
    let err = fx.engine.restore(CacheType::BuildDir, &dest, None).unwrap_err();
    assert!(err.is_miss());
    assert!(stored.path.exists());
    let err = fx.engine.restore(CacheType::BuildDir, &dest, None).unwrap_err();
    assert!(err.is_miss());
    assert!(stored.path.exists());

    let report = fx.engine.cleanup_expired().unwrap();
    assert_eq!(report.removed, 1);
    assert!(!stored.path.exists());
}

#[test]
fn test_validate_removes_expired_entries() {
    let fx = Fixture::new();
    let stored = fx.engine.store(CacheType::Tmp, &fx.tree("src", 8), None).unwrap();
    backdate(&stored.path, 2 * SECS_PER_DAY);

    let report = fx.engine.validate(TypeScope::All).unwrap();
    assert!(report.passed());
    assert_eq!(report.expired_removed, 1);
    assert!(!stored.path.exists());
}

#[test]
fn test_cleanup_is_idempotent_and_spares_fresh_entries() {
    let fx = Fixture::new();
    let old = fx.engine.store(CacheType::Dl, &fx.tree("old", 8), Some("old")).unwrap();
    let fresh = fx.engine.store(CacheType::Dl, &fx.tree("new", 8), Some("new")).unwrap();
    backdate(&old.path, 31 * SECS_PER_DAY);

    assert_eq!(fx.engine.cleanup_expired().unwrap().removed, 1);
    assert_eq!(fx.engine.cleanup_expired().unwrap().removed, 0);
    assert!(fresh.path.exists());
}

// =============================================================================
// Validation errors
// =============================================================================

#[test]
fn test_validate_reports_type_mismatch_without_fixing() {
    let fx = Fixture::new();
    let stored = fx.engine.store(CacheType::Tmp, &fx.tree("src", 8), None).unwrap();
    let misplaced = fx
        .engine
        .type_dir(CacheType::Dl)
        .join(stored.path.file_name().unwrap());
    fs::rename(&stored.path, &misplaced).unwrap();

    let report = fx.engine.validate(TypeScope::One(CacheType::Dl)).unwrap();
    assert_eq!(report.errors(), 1);
    assert!(matches!(
        &report.issues[0].kind,
        IssueKind::TypeMismatch { recorded } if recorded == "tmp"
    ));
    assert!(misplaced.exists());

    let log = fs::read_to_string(fx.engine.config().log_path()).unwrap();
    assert!(log.contains(&format!(
        "[WARN] Entry {} records type tmp but lives under dl",
        misplaced.display()
    )));

    // Validating another type does not see it
    assert!(fx.engine.validate(TypeScope::One(CacheType::Tmp)).unwrap().passed());
}

#[test]
fn test_corrupt_metadata_is_a_miss_and_a_validation_error() {
    let fx = Fixture::new();
    let stored = fx.engine.store(CacheType::Ccache, &fx.tree("src", 8), None).unwrap();
    fs::write(EntryMetadata::path_in(&stored.path), "{not json").unwrap();

    let err = fx.engine.restore(CacheType::Ccache, &fx.path("d"), None).unwrap_err();
    assert!(err.is_miss());

    let report = fx.engine.validate(TypeScope::All).unwrap();
    assert_eq!(report.errors(), 1);
    assert!(matches!(report.issues[0].kind, IssueKind::CorruptMetadata { .. }));
    assert!(stored.path.exists());

    // Cleanup purges unreadable entries
    assert_eq!(fx.engine.cleanup_expired().unwrap().removed, 1);
    assert!(!stored.path.exists());
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_eviction_floor_protects_young_entries() {
    let fx = Fixture::with_budget(1024);
    let stored = fx
        .engine
        .store(CacheType::BuildDir, &fx.tree("big", 64 * 1024), None)
        .unwrap();

    assert!(stored.eviction.evicted.is_empty());
    assert!(stored.eviction.size_after > 1024);
    assert!(stored.path.exists());
    assert_eq!(fx.snapshot().cache_evictions, 0);
}

#[test]
fn test_eviction_removes_oldest_eligible_until_under_budget() {
    const TREE: usize = 40 * 1024;
    let fx = Fixture::with_budget(100 * 1024);

    let a = fx.engine.store(CacheType::BuildDir, &fx.tree("a", TREE), Some("a")).unwrap();
    backdate(&a.path, 5 * SECS_PER_DAY);
    let b = fx.engine.store(CacheType::BuildDir, &fx.tree("b", TREE), Some("b")).unwrap();
    backdate(&b.path, 4 * SECS_PER_DAY);
    let c = fx.engine.store(CacheType::BuildDir, &fx.tree("c", TREE), Some("c")).unwrap();

    assert_eq!(c.eviction.evicted.len(), 1);
    assert_eq!(c.eviction.evicted[0].identifier, "a");
    assert!(!a.path.exists());
    assert!(b.path.exists());
    assert!(c.path.exists());
    assert!(dir_size(fx.engine.root()).unwrap() <= 100 * 1024);
    assert_eq!(fx.snapshot().cache_evictions, 1);
}

#[test]
fn test_eviction_skips_young_entry_even_if_oldest() {
    const TREE: usize = 40 * 1024;
    let fx = Fixture::with_budget(70 * 1024);

    // Young ccache entry (30 day lifetime) stored first
    let young = fx
        .engine
        .store(CacheType::Ccache, &fx.tree("young", TREE), Some("young"))
        .unwrap();
    backdate(&young.path, 10 * SECS_PER_DAY);
    // Older-than-half tmp entry (1 day lifetime) stored second
    let old = fx.engine.store(CacheType::Tmp, &fx.tree("old", TREE), Some("old")).unwrap();
    backdate(&old.path, 13 * 3600);

    let report = fx.engine.evict().unwrap();
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].cache_type, CacheType::Tmp);
    assert!(young.path.exists());
}

// =============================================================================
// Clear
// =============================================================================

#[test]
fn test_clear_type_is_idempotent() {
    let fx = Fixture::new();
    fx.engine.store(CacheType::Dl, &fx.tree("src", 8), None).unwrap();
    fx.engine.store(CacheType::Tmp, &fx.tree("src2", 8), None).unwrap();

    fx.engine.clear(TypeScope::One(CacheType::Dl)).unwrap();
    fx.engine.clear(TypeScope::One(CacheType::Dl)).unwrap();

    let dl = fx.engine.type_dir(CacheType::Dl);
    assert!(dl.is_dir());
    assert_eq!(fs::read_dir(&dl).unwrap().count(), 0);
    assert_eq!(fx.engine.entry_dirs(CacheType::Tmp).unwrap().len(), 1);
    assert_eq!(fx.snapshot().cache_saves, 2);
}

#[test]
fn test_clear_all_resets_everything() {
    let fx = Fixture::new();
    fx.engine.store(CacheType::Dl, &fx.tree("src", 8), None).unwrap();
    fx.engine.clear(TypeScope::All).unwrap();
    fx.engine.clear(TypeScope::All).unwrap();

    assert_eq!(fx.snapshot(), StatsSnapshot::default());
    for t in CacheType::ALL {
        assert!(fx.engine.entry_dirs(t).unwrap().is_empty());
    }
    assert!(fx.engine.config().root_metadata_path().is_file());
}

// =============================================================================
// Statistics monotonicity
// =============================================================================

#[test]
fn test_counters_never_decrease_without_clear() {
    let fx = Fixture::with_budget(16 * 1024);
    let mut last = fx.snapshot();
    let check = |last: &mut StatsSnapshot, fx: &Fixture| {
        let now = fx.snapshot();
        for stat in Stat::ALL {
            assert!(now.get(stat) >= last.get(stat), "{stat} decreased");
        }
        *last = now;
    };

    for i in 0..4 {
        let id = format!("id{i}");
        let _ = fx.engine.restore(CacheType::Dl, &fx.path("d"), Some(id.as_str()));
        check(&mut last, &fx);
        let stored = fx.engine.store(CacheType::Dl, &fx.tree(&id, 8 * 1024), Some(id.as_str())).unwrap();
        backdate(&stored.path, 20 * SECS_PER_DAY);
        check(&mut last, &fx);
        fx.engine.restore(CacheType::Dl, &fx.path("d"), Some(id.as_str())).ok();
        check(&mut last, &fx);
    }
    fx.engine.validate(TypeScope::All).unwrap();
    check(&mut last, &fx);
    fx.engine.cleanup_expired().unwrap();
    check(&mut last, &fx);
    assert!(last.cache_evictions >= 1);
}

// =============================================================================
// Reporting
// =============================================================================

#[test]
fn test_report_counts_entries_with_metadata() {
    let fx = Fixture::new();
    fx.engine.store(CacheType::Dl, &fx.tree("a", 100), Some("a")).unwrap();
    fx.engine.store(CacheType::Dl, &fx.tree("b", 100), Some("b")).unwrap();
    fs::create_dir_all(fx.engine.type_dir(CacheType::Dl).join("no-metadata")).unwrap();

    let report = fx.engine.report().unwrap();
    let dl = report
        .types
        .iter()
        .find(|u| u.cache_type == CacheType::Dl)
        .unwrap();
    assert_eq!(dl.entries, 2);
    assert!(dl.size_bytes >= 200);
    assert_eq!(report.hit_rate, None);
    assert!(report.total_size_bytes >= dl.size_bytes);
    assert_eq!(report.types.len(), 6);
}

// =============================================================================
// Export / import
// =============================================================================

#[test]
fn test_export_then_import_into_fresh_root() {
    let fx = Fixture::new();
    let src = fx.tree("src", 2048);
    fx.engine.store(CacheType::Dl, &src, Some("pkg")).unwrap();
    let archive = fx.path("bundle/cache.tar.gz");
    let exported = fx.engine.export(&archive).unwrap();
    assert!(exported.archive_bytes > 0);

    let mut config = fx.engine.config().clone();
    config.root = fx.path("other-root");
    let other = CacheEngine::new(config);
    let imported = other.import(&archive).unwrap();
    assert!(imported.validation.passed());

    let dest = fx.path("dest");
    other.restore(CacheType::Dl, &dest, Some("pkg")).unwrap();
    assert_eq!(files_under(&src), files_under(&dest));
    assert_eq!(other.stats().get(Stat::CacheSaves).unwrap(), 1);
}

#[test]
fn test_export_validates_before_packing() {
    let fx = Fixture::new();
    let expired = fx.engine.store(CacheType::Tmp, &fx.tree("src", 8), None).unwrap();
    backdate(&expired.path, 3 * SECS_PER_DAY);
    fx.engine.store(CacheType::Dl, &fx.tree("src2", 8), None).unwrap();

    let archive = fx.path("cache.tar.gz");
    let exported = fx.engine.export(&archive).unwrap();
    assert_eq!(exported.validation.expired_removed, 1);

    fx.engine.clear(TypeScope::All).unwrap();
    let imported = fx.engine.import(&archive).unwrap();
    assert!(imported.validation.passed());
    assert!(fx.engine.entry_dirs(CacheType::Tmp).unwrap().is_empty());
    assert_eq!(fx.engine.entry_dirs(CacheType::Dl).unwrap().len(), 1);
}

#[test]
fn test_import_missing_archive_fails() {
    let fx = Fixture::new();
    let err = fx.engine.import(&fx.path("missing.tar.gz")).unwrap_err();
    assert!(matches!(err, Error::ArchiveNotFound { .. }));
}

// =============================================================================
// Locking
// =============================================================================

#[test]
fn test_file_lock_mode_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut config = CacheConfig::with_root(temp.path().join("cache"));
    config.config_file = temp.path().join(".config");
    config.lock = LockMode::File;
    let engine = CacheEngine::new(config);

    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("f"), "locked").unwrap();

    engine.store(CacheType::Dl, &src, None).unwrap();
    engine.restore(CacheType::Dl, &temp.path().join("dest"), None).unwrap();
    engine.clear(TypeScope::All).unwrap();
    assert!(engine.config().lock_path().exists());
    assert_eq!(engine.stats().get(Stat::CacheHits).unwrap(), 0);
}

#[test]
fn test_file_lock_serializes_concurrent_stat_updates() {
    let temp = TempDir::new().unwrap();
    let mut config = CacheConfig::with_root(temp.path().join("cache"));
    config.config_file = temp.path().join(".config");
    config.lock = LockMode::File;
    let engine = CacheEngine::new(config);
    engine.init().unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let engine = engine.clone();
            s.spawn(move || {
                for _ in 0..200 {
                    engine.stats().add(Stat::CacheHits, 1).unwrap();
                }
            });
        }
    });

    assert_eq!(engine.stats().get(Stat::CacheHits).unwrap(), 800);
}
