//! Whole-root export and import as a gzip-compressed tar bundle

use crate::engine::{CacheEngine, ValidationReport};
use crate::types::TypeScope;
use crate::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of `export`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    /// Where the bundle was written
    pub archive: PathBuf,
    /// Size of the bundle
    pub archive_bytes: u64,
    /// Paths packed into the bundle
    pub entries: usize,
    /// Validation pass run before packing
    pub validation: ValidationReport,
}

/// Outcome of `import`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    /// Bundle that was unpacked
    pub archive: PathBuf,
    /// Validation pass run after unpacking
    pub validation: ValidationReport,
}

impl CacheEngine {
    /// Validate the whole cache, then pack the root into `archive`.
    ///
    /// The bundle is written to a `.partial` sibling and renamed on completion.
    /// The archive itself and the lock file are never packed, so exporting into
    /// the root is safe.
    pub fn export(&self, archive: &Path) -> Result<ExportReport> {
        let _guard = self.guard()?;
        self.init()?;
        let validation = self.validate(TypeScope::All)?;

        // The skip list is compared against walked paths, so everything must be absolute
        let archive = absolute(archive)?;
        let archive = archive.as_path();
        let root = absolute(self.root())?;
        let partial = partial_path(archive);
        if let Some(parent) = archive.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        let skip = [
            archive.to_path_buf(),
            partial.clone(),
            absolute(&self.config().lock_path())?,
        ];
        let entries = match pack_root(&root, &partial, &skip) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                self.journal()
                    .error(format!("export to {} failed: {e}", archive.display()));
                return Err(e);
            }
        };
        fs::rename(&partial, archive).map_err(|e| Error::io(e, archive, "rename"))?;

        let archive_bytes = fs::metadata(archive)
            .map_err(|e| Error::io(e, archive, "metadata"))?
            .len();
        tracing::info!(archive = %archive.display(), entries, archive_bytes, "Exported cache");
        self.journal().info(format!(
            "exported {entries} paths to {}",
            archive.display()
        ));

        Ok(ExportReport {
            archive: archive.to_path_buf(),
            archive_bytes,
            entries,
            validation,
        })
    }

    /// Unpack `archive` over the root, then validate (dropping anything now expired)
    pub fn import(&self, archive: &Path) -> Result<ImportReport> {
        if !archive.is_file() {
            self.journal()
                .error(format!("import failed: archive {} not found", archive.display()));
            return Err(Error::ArchiveNotFound {
                path: archive.to_path_buf(),
            });
        }

        let _guard = self.guard()?;
        self.init()?;
        if let Err(e) = unpack_root(archive, self.root()) {
            self.journal()
                .error(format!("import from {} failed: {e}", archive.display()));
            return Err(e);
        }
        tracing::info!(archive = %archive.display(), "Imported cache archive");
        self.journal()
            .info(format!("imported {}", archive.display()));

        // The bundle may predate the current layout; make sure it is complete
        self.init()?;
        let validation = self.validate(TypeScope::All)?;
        Ok(ImportReport {
            archive: archive.to_path_buf(),
            validation,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::io(e, path, "absolute"))
}

fn partial_path(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

/// Write every path under `root` (except `skip`) into a `.tar.gz` at `dst`
fn pack_root(root: &Path, dst: &Path, skip: &[PathBuf]) -> Result<usize> {
    let file = fs::File::create(dst).map_err(|e| Error::io(e, dst, "create"))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0usize;
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(std::io::Error::from(e), path, "walk")
        })?;
        let path = entry.path();
        if skip.iter().any(|s| s == path) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|_| Error::configuration(format!("{} is outside the root", path.display())))?;
        if entry.file_type().is_dir() {
            builder
                .append_dir(rel, path)
                .map_err(|e| Error::io(e, path, "tar append_dir"))?;
        } else {
            builder
                .append_path_with_name(path, rel)
                .map_err(|e| Error::io(e, path, "tar append"))?;
        }
        count += 1;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io(e, dst, "tar finish"))?;
    encoder
        .finish()
        .map_err(|e| Error::io(e, dst, "gzip finish"))?;
    Ok(count)
}

/// Extract a `.tar.gz` bundle into `root`
fn unpack_root(archive: &Path, root: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(root)
        .map_err(|e| Error::io(e, archive, "unpack"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::types::CacheType;
    use tempfile::TempDir;

    fn engine_at(root: PathBuf, config_file: PathBuf) -> CacheEngine {
        let mut config = CacheConfig::with_root(root);
        config.config_file = config_file;
        CacheEngine::new(config)
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/c/export.tar.gz")),
            PathBuf::from("/c/export.tar.gz.partial")
        );
    }

    #[test]
    fn test_export_into_root_skips_itself() {
        let temp = TempDir::new().unwrap();
        let engine = engine_at(temp.path().join("cache"), temp.path().join(".config"));
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("f"), "data").unwrap();
        engine.store(CacheType::Dl, &src, None).unwrap();

        let archive = engine.config().default_export_path();
        let report = engine.export(&archive).unwrap();
        assert!(archive.is_file());
        assert!(!partial_path(&archive).exists());
        assert!(report.validation.passed());

        let file = fs::File::open(&archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.trim_end_matches('/') == ".cache-stats"));
        assert!(!names.iter().any(|n| n.contains("export.tar.gz")));
    }

    #[test]
    fn test_import_missing_archive() {
        let temp = TempDir::new().unwrap();
        let engine = engine_at(temp.path().join("cache"), temp.path().join(".config"));
        let err = engine.import(&temp.path().join("nope.tar.gz")).unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound { .. }));
    }
}
