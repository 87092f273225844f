//! The fixed table of cache types and their expiry policy

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one day, the unit every age policy is expressed in
pub const SECS_PER_DAY: i64 = 86_400;

/// Static description of one cache type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTypeDescriptor {
    /// Directory name under the cache root, also the CLI spelling
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Entries older than this many days are expired
    pub max_age_days: u32,
}

/// Kind of artifact tree held in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// Downloaded source packages
    Dl,
    /// Build artifacts
    BuildDir,
    /// Staging area and toolchain
    StagingDir,
    /// Temporary files
    Tmp,
    /// Compiler cache
    Ccache,
    /// Package feed source trees
    Feeds,
}

const DESCRIPTORS: [CacheTypeDescriptor; 6] = [
    CacheTypeDescriptor {
        name: "dl",
        description: "Downloaded source packages",
        max_age_days: 30,
    },
    CacheTypeDescriptor {
        name: "build_dir",
        description: "Build artifacts",
        max_age_days: 7,
    },
    CacheTypeDescriptor {
        name: "staging_dir",
        description: "Staging area and toolchain",
        max_age_days: 14,
    },
    CacheTypeDescriptor {
        name: "tmp",
        description: "Temporary files",
        max_age_days: 1,
    },
    CacheTypeDescriptor {
        name: "ccache",
        description: "Compiler cache",
        max_age_days: 30,
    },
    CacheTypeDescriptor {
        name: "feeds",
        description: "Package feed source trees",
        max_age_days: 3,
    },
];

impl CacheType {
    /// Every cache type, in table order
    pub const ALL: [Self; 6] = [
        Self::Dl,
        Self::BuildDir,
        Self::StagingDir,
        Self::Tmp,
        Self::Ccache,
        Self::Feeds,
    ];

    /// The static descriptor for this type
    #[must_use]
    pub const fn descriptor(self) -> &'static CacheTypeDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Directory name of this type
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Maximum entry age in days
    #[must_use]
    pub const fn max_age_days(self) -> u32 {
        self.descriptor().max_age_days
    }

    /// Maximum entry age in seconds
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn max_age_secs(self) -> i64 {
        self.max_age_days() as i64 * SECS_PER_DAY
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownCacheType { name: s.to_string() })
    }
}

/// Which types an operation applies to (`all` or a single type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeScope {
    /// Every type in the table
    #[default]
    All,
    /// One type
    One(CacheType),
}

impl TypeScope {
    /// Types covered by this scope
    #[must_use]
    pub fn types(self) -> Vec<CacheType> {
        match self {
            Self::All => CacheType::ALL.to_vec(),
            Self::One(t) => vec![t],
        }
    }
}

impl FromStr for TypeScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "all" {
            Ok(Self::All)
        } else {
            s.parse().map(Self::One)
        }
    }
}

impl fmt::Display for TypeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::One(t) => t.fmt(f),
        }
    }
}
