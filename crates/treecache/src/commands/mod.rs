//! Command implementations
//!
//! Each command runs one engine operation and prints either human-readable text
//! or an [`OkEnvelope`] to stdout. Failures are returned as [`CliError`] and
//! rendered by the caller.

pub mod archive;
pub mod entries;
pub mod maintenance;
pub mod report;

use crate::cli::{CliError, Commands, OkEnvelope};
use serde::Serialize;
use treecache_cache::{CacheConfig, CacheEngine};

/// Run `command` against a cache configured by `config`
pub fn execute(command: Commands, config: CacheConfig, json: bool) -> Result<(), CliError> {
    let engine = CacheEngine::new(config);
    tracing::debug!(command = command.name(), root = %engine.root().display(), "Executing command");

    match command {
        Commands::Init => entries::init(&engine, json),
        Commands::Store {
            cache_type,
            source,
            identifier,
        } => entries::store(&engine, cache_type, &source, identifier.as_deref(), json),
        Commands::Restore {
            cache_type,
            dest,
            identifier,
        } => entries::restore(&engine, cache_type, &dest, identifier.as_deref(), json),
        Commands::Clear { scope } => entries::clear(&engine, scope, json),
        Commands::List { scope } => entries::list(&engine, scope, json),
        Commands::Stats => report::stats(&engine, json),
        Commands::Validate { scope } => maintenance::validate(&engine, scope, json),
        Commands::Cleanup => maintenance::cleanup(&engine, json),
        Commands::Export { path } => archive::export(&engine, path, json),
        Commands::Import { path } => archive::import(&engine, &path, json),
    }
}

/// Print `data` as a JSON envelope or as the text produced by `render`
pub(crate) fn emit<T: Serialize>(
    json: bool,
    data: &T,
    render: impl FnOnce(&T) -> String,
) -> Result<(), CliError> {
    if json {
        let out = serde_json::to_string(&OkEnvelope::new(data))
            .map_err(|e| CliError::failed(format!("Failed to serialize output: {e}")))?;
        println!("{out}");
    } else {
        let text = render(data);
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}
