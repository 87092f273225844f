//! Statistics ledger persisted as `name=value` lines in `<root>/.cache-stats`

use crate::lock::{CacheLock, LockGuard};
use crate::metadata::write_atomic;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// The six counters the engine maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Restores that found a valid entry
    CacheHits,
    /// Restores that found nothing valid
    CacheMisses,
    /// Successful stores
    CacheSaves,
    /// Entries removed by eviction
    CacheEvictions,
    /// Bytes handed back to callers by restores
    TotalBytesSaved,
    /// Bytes accepted by stores
    TotalBytesStored,
}

impl Stat {
    /// Every counter, in ledger order
    pub const ALL: [Self; 6] = [
        Self::CacheHits,
        Self::CacheMisses,
        Self::CacheSaves,
        Self::CacheEvictions,
        Self::TotalBytesSaved,
        Self::TotalBytesStored,
    ];

    /// Counter name as written in the ledger file
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheHits => "cache_hits",
            Self::CacheMisses => "cache_misses",
            Self::CacheSaves => "cache_saves",
            Self::CacheEvictions => "cache_evictions",
            Self::TotalBytesSaved => "total_bytes_saved",
            Self::TotalBytesStored => "total_bytes_stored",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stat| stat.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("unknown statistic: {s}")))
    }
}

/// How a counter changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatUpdate {
    /// Add to the current value
    Add(u64),
    /// Replace the current value
    Set(u64),
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Restores that found a valid entry
    pub cache_hits: u64,
    /// Restores that found nothing valid
    pub cache_misses: u64,
    /// Successful stores
    pub cache_saves: u64,
    /// Entries removed by eviction
    pub cache_evictions: u64,
    /// Bytes handed back to callers by restores
    pub total_bytes_saved: u64,
    /// Bytes accepted by stores
    pub total_bytes_stored: u64,
}

impl StatsSnapshot {
    /// Value of one counter
    #[must_use]
    pub const fn get(&self, stat: Stat) -> u64 {
        match stat {
            Stat::CacheHits => self.cache_hits,
            Stat::CacheMisses => self.cache_misses,
            Stat::CacheSaves => self.cache_saves,
            Stat::CacheEvictions => self.cache_evictions,
            Stat::TotalBytesSaved => self.total_bytes_saved,
            Stat::TotalBytesStored => self.total_bytes_stored,
        }
    }

    /// `hits / (hits + misses) * 100`, or `None` before any lookup
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            None
        } else {
            Some(self.cache_hits as f64 / total as f64 * 100.0)
        }
    }

    fn from_map(map: &BTreeMap<String, u64>) -> Self {
        let get = |stat: Stat| map.get(stat.as_str()).copied().unwrap_or(0);
        Self {
            cache_hits: get(Stat::CacheHits),
            cache_misses: get(Stat::CacheMisses),
            cache_saves: get(Stat::CacheSaves),
            cache_evictions: get(Stat::CacheEvictions),
            total_bytes_saved: get(Stat::TotalBytesSaved),
            total_bytes_stored: get(Stat::TotalBytesStored),
        }
    }
}

/// Read-modify-write access to the ledger file
#[derive(Debug, Clone)]
pub struct StatisticsStore {
    path: PathBuf,
    lock: Arc<dyn CacheLock>,
}

impl StatisticsStore {
    /// Ledger at `path`, serialized through `lock`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, lock: Arc<dyn CacheLock>) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// Path of the ledger file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an all-zero ledger if none exists yet
    pub fn ensure(&self) -> Result<()> {
        let _guard = LockGuard::acquire(self.lock.as_ref())?;
        if !self.path.exists() {
            self.write_map(&zeroed())?;
        }
        Ok(())
    }

    /// Current value of `stat`, 0 when absent
    pub fn get(&self, stat: Stat) -> Result<u64> {
        Ok(self.snapshot()?.get(stat))
    }

    /// All counters at once
    pub fn snapshot(&self) -> Result<StatsSnapshot> {
        Ok(StatsSnapshot::from_map(&self.read_map()?))
    }

    /// Apply one update atomically with respect to other lock holders
    pub fn record(&self, stat: Stat, update: StatUpdate) -> Result<u64> {
        let _guard = LockGuard::acquire(self.lock.as_ref())?;
        let mut map = self.read_map()?;
        let slot = map.entry(stat.as_str().to_string()).or_insert(0);
        *slot = match update {
            StatUpdate::Add(delta) => slot.saturating_add(delta),
            StatUpdate::Set(value) => value,
        };
        let value = *slot;
        self.write_map(&map)?;
        tracing::trace!(stat = %stat, value, "Recorded statistic");
        Ok(value)
    }

    /// Shorthand for `record(stat, StatUpdate::Add(delta))`
    pub fn add(&self, stat: Stat, delta: u64) -> Result<u64> {
        self.record(stat, StatUpdate::Add(delta))
    }

    /// Zero every counter; only `clear all` calls this
    pub fn reset(&self) -> Result<()> {
        let _guard = LockGuard::acquire(self.lock.as_ref())?;
        self.write_map(&zeroed())
    }

    fn read_map(&self) -> Result<BTreeMap<String, u64>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::io(e, &self.path, "read")),
        };
        Ok(parse_ledger(&content))
    }

    fn write_map(&self, map: &BTreeMap<String, u64>) -> Result<()> {
        write_atomic(&self.path, render_ledger(map).as_bytes())
    }
}

fn zeroed() -> BTreeMap<String, u64> {
    Stat::ALL
        .into_iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect()
}

/// Parse `name=value` lines; blank, comment and malformed lines are skipped
fn parse_ledger(content: &str) -> BTreeMap<String, u64> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            tracing::warn!(line, "Skipping malformed statistics line");
            continue;
        };
        match value.trim().parse::<u64>() {
            Ok(v) => {
                map.insert(name.trim().to_string(), v);
            }
            Err(_) => tracing::warn!(line, "Skipping non-numeric statistics line"),
        }
    }
    map
}

/// Known counters first in ledger order, then anything else found in the file
fn render_ledger(map: &BTreeMap<String, u64>) -> String {
    let mut out = String::new();
    for stat in Stat::ALL {
        let value = map.get(stat.as_str()).copied().unwrap_or(0);
        out.push_str(&format!("{}={value}\n", stat.as_str()));
    }
    for (name, value) in map {
        if name.parse::<Stat>().is_err() {
            out.push_str(&format!("{name}={value}\n"));
        }
    }
    out
}
