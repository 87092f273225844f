use crate::tracing::{LogLevel, TracingFormat};
use clap::{CommandFactory, Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use treecache_cache::config::gb_to_bytes;
use treecache_cache::{CacheConfig, CacheType, LockMode, TypeScope};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Cache miss, or validation found errors
pub const EXIT_MISS: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Cache operation failure exit code
pub const EXIT_FAILED: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(treecache::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Requested entry is absent or unusable (exit code 1)
    #[error("{message}")]
    #[diagnostic(code(treecache::cli::miss))]
    Miss {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Validation found corrupt or mismatched entries (exit code 1)
    #[error("{message}")]
    #[diagnostic(code(treecache::cli::invalid))]
    Invalid {
        /// The error message
        message: String,
        /// Structured report attached to the JSON error envelope
        details: Option<serde_json::Value>,
    },
    /// Cache operation failed (exit code 3)
    #[error("Cache operation failed: {message}")]
    #[diagnostic(code(treecache::cli::failed))]
    Failed {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new operation failure
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            help: None,
        }
    }

    /// Short machine-readable code used in the JSON error envelope
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Miss { .. } => "miss",
            Self::Invalid { .. } => "invalid",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Convert `treecache_cache::Error` to the matching `CliError` category.
///
/// - Bad configuration, unknown types and missing input paths -> Config (exit code 2)
/// - Cache misses -> Miss (exit code 1)
/// - Everything else -> Failed (exit code 3)
impl From<treecache_cache::Error> for CliError {
    fn from(err: treecache_cache::Error) -> Self {
        use treecache_cache::Error as E;

        let help = err.help().map(|h| h.to_string());
        match err {
            // Extract just the message to avoid "configuration error: Configuration error:"
            E::Configuration { message } => Self::Config { message, help },
            E::UnknownCacheType { .. } | E::SourceNotFound { .. } | E::ArchiveNotFound { .. } => {
                Self::Config {
                    message: err.to_string(),
                    help,
                }
            }
            E::CacheMiss { .. } => Self::Miss {
                message: err.to_string(),
                help,
            },
            _ => Self::Failed {
                message: err.to_string(),
                help,
            },
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Miss { .. } | CliError::Invalid { .. } => EXIT_MISS,
        CliError::Config { .. } => EXIT_CLI,
        CliError::Failed { .. } => EXIT_FAILED,
    }
}

/// Render error appropriately based on JSON flag
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let mut error = serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        });
        if let CliError::Invalid {
            details: Some(details),
            ..
        } = err
        {
            error["details"] = details.clone();
        }

        match serde_json::to_string(&ErrorEnvelope::new(error)) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

fn parse_cache_type(s: &str) -> Result<CacheType, String> {
    s.parse().map_err(|e: treecache_cache::Error| e.to_string())
}

fn parse_scope(s: &str) -> Result<TypeScope, String> {
    s.parse().map_err(|e: treecache_cache::Error| e.to_string())
}

fn parse_lock_mode(s: &str) -> Result<LockMode, String> {
    s.parse().map_err(|e: treecache_cache::Error| e.to_string())
}

/// Main CLI entry point for treecache.
///
/// Stores and restores large build trees (downloads, build output, toolchains,
/// compiler caches) under a shared cache root.
#[derive(Parser, Debug)]
#[command(name = "treecache")]
#[command(about = "Typed, expiring, size-bounded cache for large build trees")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Diagnostic log format on stderr.
    #[arg(long, global = true, value_enum, help = "Diagnostic log format (defaults to json with --json, pretty otherwise)")]
    pub log_format: Option<TracingFormat>,

    /// Emit JSON envelope instead of text.
    #[arg(long, global = true, help = "Emit JSON envelope instead of text")]
    pub json: bool,

    /// Cache root directory.
    #[arg(long, global = true, help = "Cache root directory [env: CACHE_ROOT] [default: /mnt/cache]")]
    pub root: Option<PathBuf>,

    /// Informational default maximum age in days.
    #[arg(long, global = true, help = "Default maximum age in days [env: MAX_CACHE_AGE_DAYS] [default: 7]")]
    pub max_age_days: Option<u32>,

    /// Total size budget in gigabytes (1 GB = 1024^3 bytes).
    #[arg(long, global = true, help = "Total size budget in GB [env: MAX_CACHE_SIZE_GB] [default: 50]")]
    pub max_size_gb: Option<u64>,

    /// File whose content participates in every cache key.
    #[arg(long, global = true, help = "File hashed into every cache key [env: CACHE_CONFIG_FILE] [default: .config]")]
    pub config_file: Option<PathBuf>,

    /// Cross-process locking mode (`none` or `file`).
    #[arg(long, global = true, value_parser = parse_lock_mode, help = "Locking mode, none or file [env: CACHE_LOCK] [default: none]")]
    pub lock: Option<LockMode>,
}

impl Cli {
    /// Engine configuration from the environment, with any flags given on top
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        let mut config = CacheConfig::from_env()?;
        if let Some(root) = &self.root {
            config.root.clone_from(root);
        }
        if let Some(days) = self.max_age_days {
            config.max_age_days = days;
        }
        if let Some(gb) = self.max_size_gb {
            config.max_size_bytes = gb_to_bytes(gb);
        }
        if let Some(file) = &self.config_file {
            config.config_file.clone_from(file);
        }
        if let Some(lock) = self.lock {
            config.lock = lock;
        }
        Ok(config)
    }

    /// Format for diagnostics, following `--json` unless set explicitly
    #[must_use]
    pub fn tracing_format(&self) -> TracingFormat {
        self.log_format.unwrap_or(if self.json {
            TracingFormat::Json
        } else {
            TracingFormat::Pretty
        })
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the cache root, type directories, metadata and statistics files.
    #[command(about = "Initialize the cache root")]
    Init,

    /// Store a directory tree under a typed, identified key.
    #[command(about = "Store a directory tree in the cache")]
    Store {
        /// Cache type (dl, build_dir, staging_dir, tmp, ccache, feeds)
        #[arg(value_parser = parse_cache_type)]
        cache_type: CacheType,
        /// Directory to store
        source: PathBuf,
        /// Entry identifier (defaults to "default")
        identifier: Option<String>,
    },

    /// Restore a cached tree into a destination directory.
    #[command(about = "Restore a cached directory tree")]
    Restore {
        /// Cache type
        #[arg(value_parser = parse_cache_type)]
        cache_type: CacheType,
        /// Destination directory (created if missing)
        dest: PathBuf,
        /// Entry identifier (defaults to "default")
        identifier: Option<String>,
    },

    /// Remove one type's entries, or the whole cache.
    #[command(about = "Clear the cache or a single type")]
    Clear {
        /// Cache type or "all"
        #[arg(default_value = "all", value_parser = parse_scope)]
        scope: TypeScope,
    },

    /// Print per-type usage, counters and hit rate.
    #[command(about = "Show cache statistics")]
    Stats,

    /// Check entry metadata; removes expired entries and reports corrupt ones.
    #[command(about = "Validate cache entries")]
    Validate {
        /// Cache type or "all"
        #[arg(default_value = "all", value_parser = parse_scope)]
        scope: TypeScope,
    },

    /// Remove every expired or corrupt entry.
    #[command(about = "Remove expired entries")]
    Cleanup,

    /// Pack the whole cache root into a .tar.gz bundle.
    #[command(about = "Export the cache to an archive")]
    Export {
        /// Archive path (defaults to <root>/export.tar.gz)
        path: Option<PathBuf>,
    },

    /// Unpack a bundle over the cache root and revalidate.
    #[command(about = "Import the cache from an archive")]
    Import {
        /// Archive path
        path: PathBuf,
    },

    /// List entries with identifier, age, size and validity.
    #[command(about = "List cache entries")]
    List {
        /// Cache type or "all"
        #[arg(default_value = "all", value_parser = parse_scope)]
        scope: TypeScope,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Store { .. } => "store",
            Self::Restore { .. } => "restore",
            Self::Clear { .. } => "clear",
            Self::Stats => "stats",
            Self::Validate { .. } => "validate",
            Self::Cleanup => "cleanup",
            Self::Export { .. } => "export",
            Self::Import { .. } => "import",
            Self::List { .. } => "list",
        }
    }
}

/// Parse command line arguments into a CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Print top-level usage text to stdout
pub fn print_help() -> io::Result<()> {
    Cli::command().print_help()?;
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["treecache", "stats"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        assert!(cli.log_format.is_none());
        assert!(matches!(cli.command, Some(Commands::Stats)));
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["treecache"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_log_level_parsing() {
        let cli = Cli::try_parse_from(["treecache", "--level", "debug", "stats"]).unwrap();
        assert_eq!(cli.level, LogLevel::Debug);

        let cli = Cli::try_parse_from(["treecache", "stats", "-L", "error"]).unwrap();
        assert_eq!(cli.level, LogLevel::Error);
    }

    #[test]
    fn test_json_selects_json_tracing() {
        let cli = Cli::try_parse_from(["treecache", "--json", "stats"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.tracing_format(), TracingFormat::Json);

        let cli =
            Cli::try_parse_from(["treecache", "--json", "--log-format", "compact", "stats"])
                .unwrap();
        assert_eq!(cli.tracing_format(), TracingFormat::Compact);
    }

    #[test]
    fn test_store_arguments() {
        let cli =
            Cli::try_parse_from(["treecache", "store", "build_dir", "/src", "x86_64"]).unwrap();
        match cli.command {
            Some(Commands::Store {
                cache_type,
                source,
                identifier,
            }) => {
                assert_eq!(cache_type, CacheType::BuildDir);
                assert_eq!(source, Path::new("/src"));
                assert_eq!(identifier.as_deref(), Some("x86_64"));
            }
            other => panic!("expected store, got {other:?}"),
        }
    }

    #[test]
    fn test_restore_identifier_optional() {
        let cli = Cli::try_parse_from(["treecache", "restore", "dl", "/dest"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Restore {
                identifier: None,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Cli::try_parse_from(["treecache", "store", "bogus", "/src"]).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CLI);
    }

    #[test]
    fn test_scope_defaults_to_all() {
        let cli = Cli::try_parse_from(["treecache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Clear {
                scope: TypeScope::All
            })
        ));

        let cli = Cli::try_parse_from(["treecache", "validate", "tmp"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Validate {
                scope: TypeScope::One(CacheType::Tmp)
            })
        ));
    }

    #[test]
    fn test_cache_config_from_flags() {
        let cli = Cli::try_parse_from([
            "treecache",
            "--root",
            "/tmp/c",
            "--max-size-gb",
            "2",
            "--lock",
            "file",
            "stats",
        ])
        .unwrap();
        let config = cli.cache_config().unwrap();
        assert_eq!(config.root, Path::new("/tmp/c"));
        assert_eq!(config.max_size_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.lock, LockMode::File);
    }

    #[test]
    fn test_bad_size_is_cli_error() {
        let err =
            Cli::try_parse_from(["treecache", "--max-size-gb", "lots", "stats"]).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CLI);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("x")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::failed("x")), EXIT_FAILED);
        let miss = CliError::from(treecache_cache::Error::miss("dl", "default"));
        assert_eq!(exit_code_for(&miss), EXIT_MISS);
        let invalid = CliError::Invalid {
            message: "1 error".into(),
            details: None,
        };
        assert_eq!(exit_code_for(&invalid), EXIT_MISS);
    }

    #[test]
    fn test_error_mapping() {
        let err = CliError::from(treecache_cache::Error::ArchiveNotFound {
            path: PathBuf::from("/nope.tar.gz"),
        });
        assert_eq!(err.code(), "config");

        let err = CliError::from(treecache_cache::Error::configuration("bad budget"));
        assert!(matches!(&err, CliError::Config { message, .. } if message == "bad budget"));

        let err = CliError::from(treecache_cache::Error::corrupt(Path::new("/c/x"), "truncated"));
        assert_eq!(err.code(), "failed");
    }

    #[test]
    fn test_ok_envelope() {
        let envelope = OkEnvelope::new("test data");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"data\":\"test data\""));
    }

    #[test]
    fn test_error_envelope() {
        let envelope = ErrorEnvelope::new("test error");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"error\":\"test error\""));
    }
}
