// crates/core/src/retention.rs
//! Startup retention sweep for partitioned storage.
//!
//! Runs once when the service starts, never periodically. Day partitions
//! strictly older than the horizon are removed recursively; year directories
//! left empty afterwards are removed too. The sweep is best-effort: every
//! error is logged and counted, none aborts the remaining directories.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::storage::PartitionKey;

/// Outcome of one sweep over one root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Day partitions removed.
    pub partitions_removed: usize,
    /// Emptied year directories removed.
    pub years_removed: usize,
    /// Errors encountered (logged, not fatal).
    pub errors: usize,
}

/// Sweep `<root>/<yyyy>/<MMdd>` partitions whose date predates `horizon`.
///
/// Directory names that do not parse as a partition are skipped untouched.
/// A missing root is a no-op.
pub fn sweep_partitions(root: &Path, horizon: NaiveDate) -> SweepStats {
    let mut stats = SweepStats::default();

    let years = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return stats,
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "retention sweep cannot read root");
            stats.errors += 1;
            return stats;
        }
    };

    for year_entry in years {
        let year_dir = match year_entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "retention sweep read error");
                stats.errors += 1;
                continue;
            }
        };
        if !year_dir.is_dir() {
            continue;
        }
        let Some(year_name) = year_dir.file_name().and_then(|n| n.to_str()).map(str::to_owned)
        else {
            continue;
        };

        sweep_year(&year_dir, &year_name, horizon, &mut stats);

        // Remove the year directory if pruning left it empty.
        match fs::read_dir(&year_dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    match fs::remove_dir(&year_dir) {
                        Ok(()) => {
                            stats.years_removed += 1;
                            tracing::info!(dir = %year_dir.display(), "removed empty year directory");
                        }
                        Err(e) => {
                            tracing::warn!(dir = %year_dir.display(), error = %e, "failed to remove year directory");
                            stats.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(dir = %year_dir.display(), error = %e, "failed to re-read year directory");
                stats.errors += 1;
            }
        }
    }

    stats
}

fn sweep_year(year_dir: &Path, year_name: &str, horizon: NaiveDate, stats: &mut SweepStats) {
    let days = match fs::read_dir(year_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %year_dir.display(), error = %e, "retention sweep cannot read year directory");
            stats.errors += 1;
            return;
        }
    };

    for day_entry in days {
        let day_dir = match day_entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(dir = %year_dir.display(), error = %e, "retention sweep read error");
                stats.errors += 1;
                continue;
            }
        };
        if !day_dir.is_dir() {
            continue;
        }
        let Some(day_name) = day_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = PartitionKey::parse(year_name, day_name) else {
            tracing::debug!(dir = %day_dir.display(), "skipping non-partition directory");
            continue;
        };
        if date >= horizon {
            continue;
        }
        match fs::remove_dir_all(&day_dir) {
            Ok(()) => {
                stats.partitions_removed += 1;
                tracing::info!(dir = %day_dir.display(), partition = %date, "removed expired partition");
            }
            Err(e) => {
                tracing::warn!(dir = %day_dir.display(), error = %e, "failed to remove partition");
                stats.errors += 1;
            }
        }
    }
}
