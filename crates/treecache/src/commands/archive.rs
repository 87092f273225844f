//! Export and import commands

use super::emit;
use crate::cli::CliError;
use std::path::{Path, PathBuf};
use treecache_cache::fsutil::human_size;
use treecache_cache::CacheEngine;

/// Export the root to `path`, or `<root>/export.tar.gz`
pub fn export(engine: &CacheEngine, path: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let archive = path.unwrap_or_else(|| engine.config().default_export_path());
    let report = engine.export(&archive)?;
    emit(json, &report, |r| {
        let mut text = format!(
            "Exported {} paths to {} ({})",
            r.entries,
            r.archive.display(),
            human_size(r.archive_bytes)
        );
        if !r.validation.passed() {
            text.push_str(&format!(
                "\nWarning: {} invalid entries were exported; run `treecache validate` for details",
                r.validation.errors()
            ));
        }
        text
    })
}

/// Import `path` over the root
pub fn import(engine: &CacheEngine, path: &Path, json: bool) -> Result<(), CliError> {
    let report = engine.import(path)?;
    emit(json, &report, |r| {
        format!(
            "Imported {}: {} entries checked, {} expired entries removed, {} error(s)",
            r.archive.display(),
            r.validation.checked,
            r.validation.expired_removed,
            r.validation.errors()
        )
    })
}
