//! The `stats` command

use super::emit;
use crate::cli::CliError;
use std::fmt::Write;
use treecache_cache::fsutil::human_size;
use treecache_cache::{CacheEngine, CacheReport};

/// Print per-type usage, the six counters and the hit rate
pub fn stats(engine: &CacheEngine, json: bool) -> Result<(), CliError> {
    let report = engine.report()?;
    emit(json, &report, render_report)
}

fn render_report(report: &CacheReport) -> String {
    let mut out = format!("Cache root: {}\n", report.root.display());
    let _ = writeln!(
        out,
        "{:<12} {:<30} {:>8} {:>8} {:>10}",
        "TYPE", "DESCRIPTION", "MAX AGE", "ENTRIES", "SIZE"
    );
    for usage in &report.types {
        let _ = writeln!(
            out,
            "{:<12} {:<30} {:>7}d {:>8} {:>10}",
            usage.cache_type.name(),
            usage.description,
            usage.max_age_days,
            usage.entries,
            human_size(usage.size_bytes)
        );
    }

    let stats = &report.stats;
    let _ = writeln!(out);
    let _ = writeln!(out, "Hits:          {}", stats.cache_hits);
    let _ = writeln!(out, "Misses:        {}", stats.cache_misses);
    let _ = writeln!(out, "Saves:         {}", stats.cache_saves);
    let _ = writeln!(out, "Evictions:     {}", stats.cache_evictions);
    let _ = writeln!(
        out,
        "Bytes saved:   {} ({})",
        stats.total_bytes_saved,
        human_size(stats.total_bytes_saved)
    );
    let _ = writeln!(
        out,
        "Bytes stored:  {} ({})",
        stats.total_bytes_stored,
        human_size(stats.total_bytes_stored)
    );
    match report.hit_rate {
        Some(rate) => {
            let _ = writeln!(out, "Hit rate:      {rate:.1}%");
        }
        None => {
            let _ = writeln!(out, "Hit rate:      n/a");
        }
    }
    let _ = write!(
        out,
        "Total size:    {} of {} budget",
        human_size(report.total_size_bytes),
        human_size(report.max_size_bytes)
    );
    out
}
