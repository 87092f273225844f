//! Maintenance commands: validate and cleanup

use super::emit;
use crate::cli::CliError;
use std::fmt::Write;
use treecache_cache::fsutil::human_size;
use treecache_cache::{CacheEngine, CleanupReport, IssueKind, TypeScope, ValidationReport};

/// Validate `scope`; found errors become [`CliError::Invalid`]
pub fn validate(engine: &CacheEngine, scope: TypeScope, json: bool) -> Result<(), CliError> {
    let report = engine.validate(scope)?;
    if report.passed() {
        return emit(json, &report, render_validation);
    }

    if !json {
        println!("{}", render_validation(&report));
    }
    Err(CliError::Invalid {
        message: format!("Validation found {} error(s)", report.errors()),
        details: serde_json::to_value(&report).ok(),
    })
}

/// Remove expired and unreadable entries
pub fn cleanup(engine: &CacheEngine, json: bool) -> Result<(), CliError> {
    let report = engine.cleanup_expired()?;
    emit(json, &report, render_cleanup)
}

fn render_validation(report: &ValidationReport) -> String {
    let mut out = format!(
        "Checked {} entries: {} error(s), {} expired entries removed",
        report.checked,
        report.errors(),
        report.expired_removed
    );
    for issue in &report.issues {
        let detail = match &issue.kind {
            IssueKind::CorruptMetadata { reason } => format!("corrupt metadata: {reason}"),
            IssueKind::TypeMismatch { recorded } => {
                format!("recorded type {recorded}, stored under {}", issue.cache_type)
            }
        };
        let _ = write!(out, "\n  {}: {detail}", issue.path.display());
    }
    out
}

fn render_cleanup(report: &CleanupReport) -> String {
    let mut out = format!(
        "Removed {} expired entries, freed {}",
        report.removed,
        human_size(report.bytes_freed)
    );
    if report.staging_removed > 0 {
        let _ = write!(
            out,
            "\nRemoved {} abandoned staging directories",
            report.staging_removed
        );
    }
    out
}
