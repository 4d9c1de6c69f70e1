use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::post::PostRecord;
use crate::scan::INDEX_FILENAME;

const INDEX_TEMP_FILENAME: &str = ".index.json.tmp";

/// Result of writing index.json
#[derive(Debug, Clone)]
pub struct WrittenIndex {
    pub path: PathBuf,
    /// SHA-256 of the written bytes, hex encoded
    pub digest: String,
}

/// Serialize records as a 4-space indented JSON array.
/// Non-ASCII text is written as-is.
pub fn render_index(records: &[PostRecord]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut ser)?;
    Ok(buf)
}

/// Write `dir/index.json`, replacing any previous index.
pub fn write_index(dir: &Path, records: &[PostRecord]) -> anyhow::Result<WrittenIndex> {
    let bytes = render_index(records)?;
    let path = dir.join(INDEX_FILENAME);
    let temp_path = dir.join(INDEX_TEMP_FILENAME);

    // Write to temp file first, then rename over the old index
    fs::write(&temp_path, &bytes).with_context(|| format!("writing {}", temp_path.display()))?;
    if let Err(e) = fs::rename(&temp_path, &path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("replacing {}", path.display()));
    }

    Ok(WrittenIndex {
        path,
        digest: hex::encode(Sha256::digest(&bytes)),
    })
}
