use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::metadata;
use crate::post::PostRecord;
use crate::ProgressCallback;

/// Name of the generated index; never read back as metadata
pub const INDEX_FILENAME: &str = "index.json";

/// What happened to one candidate metadata file
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Included(PostRecord),
    SkippedMalformed { file: String, reason: String },
    SkippedNoImage { file: String },
}

impl ScanOutcome {
    pub fn record(&self) -> Option<&PostRecord> {
        match self {
            ScanOutcome::Included(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, ScanOutcome::Included(_))
    }
}

/// Sorted names of the regular files directly inside `dir`.
/// Names that are not valid UTF-8 are ignored.
pub fn list_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    let entries = fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

/// A `.json` file other than the index itself
pub fn is_metadata_candidate(name: &str) -> bool {
    name.ends_with(".json") && name != INDEX_FILENAME
}

/// First existing image for `base_name`, per [`metadata::image_candidates`]
pub fn find_image(base_name: &str, files: &HashSet<&str>) -> Option<String> {
    metadata::image_candidates(base_name)
        .into_iter()
        .find(|name| files.contains(name.as_str()))
}

/// Turn one metadata file into an outcome. Only read errors are returned as `Err`.
pub fn scan_file(dir: &Path, json_name: &str, files: &HashSet<&str>) -> anyhow::Result<ScanOutcome> {
    let path = dir.join(json_name);
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;

    let node = match metadata::parse_metadata(&bytes) {
        Ok(node) => node,
        Err(e) => {
            return Ok(ScanOutcome::SkippedMalformed {
                file: json_name.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let base_name = json_name.strip_suffix(".json").unwrap_or(json_name);
    let Some(image_name) = find_image(base_name, files) else {
        return Ok(ScanOutcome::SkippedNoImage {
            file: json_name.to_string(),
        });
    };

    let image_path = dir.join(&image_name).to_string_lossy().into_owned();
    Ok(ScanOutcome::Included(metadata::to_record(base_name, &node, image_path)))
}

/// Scan a download directory, one outcome per metadata file in sorted order
pub fn scan_dir(dir: &Path, progress: &ProgressCallback) -> anyhow::Result<Vec<ScanOutcome>> {
    let files = list_files(dir)?;
    let file_set: HashSet<&str> = files.iter().map(String::as_str).collect();
    let candidates: Vec<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|name| is_metadata_candidate(name))
        .collect();

    let total = candidates.len() as u64;
    let mut outcomes = Vec::with_capacity(candidates.len());
    for (i, name) in candidates.into_iter().enumerate() {
        let outcome = scan_file(dir, name, &file_set)?;
        match &outcome {
            ScanOutcome::Included(_) => {}
            ScanOutcome::SkippedMalformed { file, reason } => {
                tracing::warn!(file = %file, %reason, "skipping broken metadata");
                progress("index", i as u64, total, &format!("Skipping broken json {}", file));
            }
            ScanOutcome::SkippedNoImage { file } => {
                tracing::debug!(file = %file, "no image for metadata");
            }
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
