use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::post::PostRecord;
use crate::scan::{self, ScanOutcome};
use crate::writer;
use crate::ProgressCallback;

/// Aggregated result of one indexing pass
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub index_path: PathBuf,
    /// One entry per metadata file, in scan order
    pub outcomes: Vec<ScanOutcome>,
    /// SHA-256 of index.json as written
    pub digest: String,
}

impl IndexReport {
    pub fn records(&self) -> impl Iterator<Item = &PostRecord> {
        self.outcomes.iter().filter_map(ScanOutcome::record)
    }

    pub fn included(&self) -> usize {
        self.records().count()
    }

    pub fn skipped_malformed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::SkippedMalformed { .. }))
            .count()
    }

    pub fn skipped_no_image(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::SkippedNoImage { .. }))
            .count()
    }

    /// Oldest and newest post dates in the index
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut dates = self.records().filter_map(PostRecord::taken_at);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

/// Scan `target_dir` and write `target_dir/index.json`.
///
/// Returns `Ok(None)` without writing anything when the directory does not exist.
/// Broken or image-less metadata files are recorded in the report, not returned as errors.
pub fn generate_index(target_dir: &Path, progress: &ProgressCallback) -> anyhow::Result<Option<IndexReport>> {
    if !target_dir.is_dir() {
        tracing::warn!(dir = %target_dir.display(), "download directory missing, nothing to index");
        progress(
            "index",
            0,
            0,
            &format!("Directory {} not found. Nothing to index.", target_dir.display()),
        );
        return Ok(None);
    }

    progress("index", 0, 1, &format!("Generating index from {}...", target_dir.display()));
    let outcomes = scan::scan_dir(target_dir, progress)?;

    let records: Vec<PostRecord> = outcomes.iter().filter_map(ScanOutcome::record).cloned().collect();
    let written = writer::write_index(target_dir, &records)?;

    let report = IndexReport {
        index_path: written.path,
        outcomes,
        digest: written.digest,
    };
    tracing::info!(
        index = %report.index_path.display(),
        posts = report.included(),
        malformed = report.skipped_malformed(),
        without_image = report.skipped_no_image(),
        "index written"
    );
    progress(
        "index",
        1,
        1,
        &format!("Created {} with {} posts.", report.index_path.display(), report.included()),
    );
    Ok(Some(report))
}
