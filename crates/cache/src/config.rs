//! Cache root configuration and environment resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default cache root when `CACHE_ROOT` is unset
pub const DEFAULT_ROOT: &str = "/mnt/cache";
/// Default informational maximum age in days
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;
/// Default size budget in gigabytes
pub const DEFAULT_MAX_SIZE_GB: u64 = 50;
/// Default config file whose content participates in every key
pub const DEFAULT_CONFIG_FILE: &str = ".config";

/// Bytes in one gigabyte as used by the size budget
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// How the engine serializes mutating operations across processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// No locking; callers serialize invocations themselves
    #[default]
    None,
    /// Exclusive advisory lock on `<root>/.cache-lock`
    File,
}

impl FromStr for LockMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "file" => Ok(Self::File),
            other => Err(Error::configuration(format!(
                "unknown lock mode '{other}' (expected 'none' or 'file')"
            ))),
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::File => f.write_str("file"),
        }
    }
}

/// Process-wide cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory everything lives under
    pub root: PathBuf,
    /// Informational default age; per-type ages come from the type table
    pub max_age_days: u32,
    /// Total size budget enforced by eviction
    pub max_size_bytes: u64,
    /// File whose content hash participates in every cache key
    pub config_file: PathBuf,
    /// Cross-process locking strategy
    pub lock: LockMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            max_size_bytes: DEFAULT_MAX_SIZE_GB * BYTES_PER_GB,
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            lock: LockMode::None,
        }
    }
}

/// Raw values read from the environment before validation
#[derive(Debug, Clone, Default)]
struct ConfigInputs {
    root: Option<String>,
    max_age_days: Option<String>,
    max_size_gb: Option<String>,
    config_file: Option<String>,
    lock: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn config_from_inputs(inputs: ConfigInputs) -> Result<CacheConfig> {
    let mut config = CacheConfig::default();

    if let Some(root) = non_empty(inputs.root) {
        config.root = PathBuf::from(root);
    }
    if let Some(days) = non_empty(inputs.max_age_days) {
        config.max_age_days = days.trim().parse().map_err(|_| {
            Error::configuration(format!("MAX_CACHE_AGE_DAYS is not a number: {days}"))
        })?;
    }
    if let Some(gb) = non_empty(inputs.max_size_gb) {
        let gb: u64 = gb.trim().parse().map_err(|_| {
            Error::configuration(format!("MAX_CACHE_SIZE_GB is not a number: {gb}"))
        })?;
        config.max_size_bytes = gb_to_bytes(gb);
    }
    if let Some(file) = non_empty(inputs.config_file) {
        config.config_file = PathBuf::from(file);
    }
    if let Some(lock) = non_empty(inputs.lock) {
        config.lock = lock.parse()?;
    }

    Ok(config)
}

/// Convert a gigabyte budget to bytes, saturating on overflow
#[must_use]
pub const fn gb_to_bytes(gb: u64) -> u64 {
    gb.saturating_mul(BYTES_PER_GB)
}

impl CacheConfig {
    /// Build a configuration from the process environment.
    ///
    /// Reads `CACHE_ROOT`, `MAX_CACHE_AGE_DAYS`, `MAX_CACHE_SIZE_GB`,
    /// `CACHE_CONFIG_FILE` and `CACHE_LOCK`; unset or blank values keep the defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a numeric value does not parse or the
    /// lock mode is unknown.
    pub fn from_env() -> Result<Self> {
        config_from_inputs(ConfigInputs {
            root: std::env::var("CACHE_ROOT").ok(),
            max_age_days: std::env::var("MAX_CACHE_AGE_DAYS").ok(),
            max_size_gb: std::env::var("MAX_CACHE_SIZE_GB").ok(),
            config_file: std::env::var("CACHE_CONFIG_FILE").ok(),
            lock: std::env::var("CACHE_LOCK").ok(),
        })
    }

    /// Configuration rooted at `root` with every other field defaulted
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Path of the root metadata record
    #[must_use]
    pub fn root_metadata_path(&self) -> PathBuf {
        self.root.join(".cache-metadata")
    }

    /// Path of the statistics ledger
    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.root.join(".cache-stats")
    }

    /// Path of the append-only operation log
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join("cache.log")
    }

    /// Path of the cross-process lock file
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".cache-lock")
    }

    /// Default destination for `export`
    #[must_use]
    pub fn default_export_path(&self) -> PathBuf {
        self.root.join("export.tar.gz")
    }
}
