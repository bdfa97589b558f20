use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use failsense_core::HistoryItem;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sqlite::now_rfc3339;

pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

const HISTORY_FILE: &str = "history.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub schema_version: i64,
    pub exported_at: String,
    pub files: Vec<ExportFileDigest>,
}

/// Write `items` as a pretty JSON array plus a digest manifest.
///
/// # Errors
/// Returns an error when export files cannot be created, written, or serialized.
pub fn export_history(items: &[HistoryItem], out_dir: &Path) -> Result<ExportManifest> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

    let history_path = out_dir.join(HISTORY_FILE);
    let mut bytes = serde_json::to_vec_pretty(items).context("failed to serialize history")?;
    bytes.push(b'\n');
    fs::write(&history_path, &bytes)
        .with_context(|| format!("failed to write {}", history_path.display()))?;

    let manifest = ExportManifest {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        exported_at: now_rfc3339()?,
        files: vec![ExportFileDigest {
            path: HISTORY_FILE.to_string(),
            sha256: sha256_hex(&bytes),
            records: items.len(),
        }],
    };

    let manifest_path = out_dir.join(MANIFEST_FILE);
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("failed to serialize export manifest")?;
    fs::write(&manifest_path, manifest_json)
        .with_context(|| format!("failed to write export manifest {}", manifest_path.display()))?;

    Ok(manifest)
}

/// Read a snapshot written by [`export_history`], verifying its manifest.
///
/// # Errors
/// Returns an error when the manifest is missing or unsupported, the history
/// file does not match its digest or record count, or decoding fails.
pub fn read_history_snapshot(in_dir: &Path) -> Result<Vec<HistoryItem>> {
    let manifest_path = in_dir.join(MANIFEST_FILE);
    let manifest_bytes = fs::read(&manifest_path)
        .with_context(|| format!("failed to read manifest file {}", manifest_path.display()))?;
    let manifest: ExportManifest = serde_json::from_slice(&manifest_bytes)
        .with_context(|| format!("failed to parse manifest JSON {}", manifest_path.display()))?;

    if manifest.schema_version <= 0 || manifest.schema_version > SNAPSHOT_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported export schema version {}; supported range is 1..={SNAPSHOT_SCHEMA_VERSION}",
            manifest.schema_version
        ));
    }

    let mut by_path: BTreeMap<&str, &ExportFileDigest> = BTreeMap::new();
    for file in &manifest.files {
        if by_path.insert(file.path.as_str(), file).is_some() {
            return Err(anyhow!("manifest contains duplicate file entry: {}", file.path));
        }
    }
    let Some(expected) = by_path.get(HISTORY_FILE) else {
        return Err(anyhow!("manifest is missing required file entry: {HISTORY_FILE}"));
    };

    let history_path = in_dir.join(HISTORY_FILE);
    let bytes = fs::read(&history_path)
        .with_context(|| format!("failed to read {}", history_path.display()))?;
    let actual_sha256 = sha256_hex(&bytes);
    if actual_sha256 != expected.sha256 {
        return Err(anyhow!(
            "manifest digest mismatch for {HISTORY_FILE}: expected {}, got {actual_sha256}",
            expected.sha256
        ));
    }

    let items: Vec<HistoryItem> = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", history_path.display()))?;
    if items.len() != expected.records {
        return Err(anyhow!(
            "manifest record count mismatch for {HISTORY_FILE}: expected {}, got {}",
            expected.records,
            items.len()
        ));
    }

    Ok(items)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
