//! Entry commands: init, store, restore, clear and list

use super::emit;
use crate::cli::CliError;
use chrono::Utc;
use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use treecache_cache::fsutil::human_size;
use treecache_cache::types::SECS_PER_DAY;
use treecache_cache::{
    CacheEngine, CacheType, EntrySummary, RestoreOutcome, StoreOutcome, TypeScope,
};

#[derive(Debug, Serialize)]
struct InitOutput {
    root: PathBuf,
    types: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ClearOutput {
    cleared: String,
}

/// Create the cache layout
pub fn init(engine: &CacheEngine, json: bool) -> Result<(), CliError> {
    engine.init()?;
    let output = InitOutput {
        root: engine.root().to_path_buf(),
        types: CacheType::ALL.iter().map(|t| t.name()).collect(),
    };
    emit(json, &output, |o| {
        format!("Initialized cache at {}", o.root.display())
    })
}

/// Store `source` and report eviction triggered by the store
pub fn store(
    engine: &CacheEngine,
    cache_type: CacheType,
    source: &Path,
    identifier: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let outcome = engine.store(cache_type, source, identifier)?;
    emit(json, &outcome, render_store)
}

/// Restore into `dest`; a miss is returned as [`CliError::Miss`]
pub fn restore(
    engine: &CacheEngine,
    cache_type: CacheType,
    dest: &Path,
    identifier: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let outcome = engine.restore(cache_type, dest, identifier)?;
    emit(json, &outcome, |o| render_restore(o, dest))
}

/// Clear one type or everything
pub fn clear(engine: &CacheEngine, scope: TypeScope, json: bool) -> Result<(), CliError> {
    engine.clear(scope)?;
    let output = ClearOutput {
        cleared: scope.to_string(),
    };
    emit(json, &output, |o| match scope {
        TypeScope::All => "Cleared all cache entries and statistics".to_string(),
        TypeScope::One(_) => format!("Cleared {} cache", o.cleared),
    })
}

/// List entries in `scope`
pub fn list(engine: &CacheEngine, scope: TypeScope, json: bool) -> Result<(), CliError> {
    let rows = engine.list(scope)?;
    emit(json, &rows, |rows| render_list(rows, Utc::now().timestamp()))
}

fn render_store(outcome: &StoreOutcome) -> String {
    let mut out = format!(
        "Stored {} ({}) {} at {}",
        outcome.key.cache_type,
        outcome.key.identifier,
        human_size(outcome.size_bytes),
        outcome.path.display()
    );
    let evicted = &outcome.eviction.evicted;
    if !evicted.is_empty() {
        let freed: u64 = evicted.iter().map(|e| e.size_bytes).sum();
        let _ = write!(
            out,
            "\nEvicted {} entries ({}) to fit the {} budget",
            evicted.len(),
            human_size(freed),
            human_size(outcome.eviction.budget)
        );
    }
    out
}

fn render_restore(outcome: &RestoreOutcome, dest: &Path) -> String {
    format!(
        "Restored {} ({}) {} into {} ({} files, {} pruned)",
        outcome.key.cache_type,
        outcome.key.identifier,
        human_size(outcome.size_bytes),
        dest.display(),
        outcome.files_copied,
        outcome.files_pruned
    )
}

fn render_list(rows: &[EntrySummary], now: i64) -> String {
    if rows.is_empty() {
        return "No cache entries".to_string();
    }
    let mut out = format!(
        "{:<12} {:<12} {:<24} {:>6} {:>10}  STATUS",
        "TYPE", "HASH", "IDENTIFIER", "AGE", "SIZE"
    );
    for row in rows {
        let hash: String = row.hash.chars().take(12).collect();
        let age = row.created_at.map_or_else(
            || "-".to_string(),
            |created| format!("{}d", (now - created).max(0) / SECS_PER_DAY),
        );
        let _ = write!(
            out,
            "\n{:<12} {:<12} {:<24} {:>6} {:>10}  {}",
            row.cache_type.name(),
            hash,
            row.identifier.as_deref().unwrap_or("-"),
            age,
            human_size(row.size_bytes),
            row.status
        );
    }
    out
}
