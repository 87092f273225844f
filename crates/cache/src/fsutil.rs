//! Filesystem helpers: tree sizing, mirror copies and removal

use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sum of the byte lengths of every regular file under `path`
pub fn dir_size(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| walk_error(e, path))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .map_err(|e| walk_error(e, entry.path()))?;
            total += meta.len();
        }
    }
    Ok(total)
}

fn walk_error(e: walkdir::Error, fallback: &Path) -> Error {
    let path = e.path().unwrap_or(fallback).to_path_buf();
    Error::io(io::Error::from(e), path, "walk")
}

/// What a mirror copy did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Regular files and symlinks written
    pub copied: usize,
    /// Destination paths deleted because the source lacks them
    pub pruned: usize,
}

/// Make `dst` an exact replica of `src`.
///
/// Files, directories and symlinks are copied; anything under `dst` that is not
/// present in `src` is deleted afterwards. Top-level names in `skip` are neither
/// copied from `src` nor pruned from `dst`.
pub fn mirror(src: &Path, dst: &Path, skip: &[&str]) -> io::Result<MirrorReport> {
    let mut report = MirrorReport::default();
    fs::create_dir_all(dst)?;

    let mut expected: HashSet<PathBuf> = HashSet::new();
    let mut walker = WalkDir::new(src).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        let rel = relative(entry.path(), src)?;
        if is_skipped(&rel, skip) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let target = dst.join(&rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            if let Ok(meta) = fs::symlink_metadata(&target)
                && !meta.is_dir()
            {
                fs::remove_file(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else {
            remove_existing(&target)?;
            if file_type.is_symlink() {
                copy_symlink(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
            report.copied += 1;
        }
        expected.insert(rel);
    }

    for entry in WalkDir::new(dst).min_depth(1).contents_first(true) {
        let entry = entry?;
        let rel = relative(entry.path(), dst)?;
        if is_skipped_subtree(&rel, skip) || expected.contains(&rel) {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        tracing::trace!(path = %entry.path().display(), "Pruned stale path");
        report.pruned += 1;
    }

    Ok(report)
}

fn relative(path: &Path, base: &Path) -> io::Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| {
            io::Error::other(format!(
                "path {} is not under {}",
                path.display(),
                base.display()
            ))
        })
}

fn is_skipped(rel: &Path, skip: &[&str]) -> bool {
    let mut components = rel.components();
    match (components.next(), components.next()) {
        (Some(first), None) => skip.iter().any(|s| first.as_os_str() == *s),
        _ => false,
    }
}

fn is_skipped_subtree(rel: &Path, skip: &[&str]) -> bool {
    rel.components()
        .next()
        .is_some_and(|first| skip.iter().any(|s| first.as_os_str() == *s))
}

/// Remove whatever sits at `target` so a file or link can take its place
fn remove_existing(target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Remove a directory tree, treating "already gone" as success
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(e, path, "remove_dir_all")),
    }
}

/// Render a byte count with a binary unit suffix
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
