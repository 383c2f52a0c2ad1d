//! 📥 Input loading: get granules off the disk and into a [`QueueInput`].
//!
//! Two shapes, each optionally gzipped (`.gz`):
//! - `*.json`: a whole document, `{"granules": [...], "pdr": {...}}`
//! - `*.ndjson` / `*.jsonl`: one granule per line, no PDR
//!
//! Blank lines in NDJSON are skipped. A line that doesn't parse is reported with its
//! 1-based line number, because "somewhere in the file" is not a location.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use tracing::debug;

use crate::common::{Granule, QueueInput};

/// 📂 Load a queue input file, picking the format from its extension.
pub async fn load_input(path: &Path) -> Result<QueueInput> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("💀 Input file '{}' could not be read", path.display()))?;

    let (bytes, format_path) = if has_extension(path, "gz") {
        let inflated = gunzip(&raw).with_context(|| format!("💀 '{}' claims to be gzip. It lied.", path.display()))?;
        (inflated, path.with_extension(""))
    } else {
        (raw, path.to_path_buf())
    };

    let input = if has_extension(&format_path, "ndjson") || has_extension(&format_path, "jsonl") {
        parse_ndjson(&bytes)
    } else {
        parse_document(&bytes)
    }
    .with_context(|| format!("💀 Input file '{}' is not valid queue input", path.display()))?;

    debug!("📥 loaded {} granule(s) from {}", input.granules.len(), path.display());
    Ok(input)
}

/// 📄 A whole `{granules, pdr}` document.
pub fn parse_document(bytes: &[u8]) -> Result<QueueInput> {
    Ok(serde_json::from_slice(bytes)?)
}

/// 📜 One granule per line.
pub fn parse_ndjson(bytes: &[u8]) -> Result<QueueInput> {
    let mut granules = Vec::new();
    let mut start = 0;
    let ends = memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
    for (index, end) in ends.enumerate() {
        let line = bytes[start..end].trim_ascii();
        start = end + 1;
        if line.is_empty() {
            continue;
        }
        let granule: Granule = serde_json::from_slice(line)
            .with_context(|| format!("💀 line {} is not a granule", index + 1))?;
        granules.push(granule);
    }
    Ok(QueueInput { granules, pdr: None })
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut inflated = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut inflated)?;
    Ok(inflated)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
