//! Manifest serialization.
//!
//! Both artifacts are written from the same in-memory entry list, so they
//! always describe the same documents in the same order:
//!
//! - `manifest.json`: pretty-printed array of entry objects.
//! - `manifest.csv`: header `fingerprint,filename,original_path,bundle_path`,
//!   one row per entry, RFC 4180 quoting.

use std::path::Path;

use crate::error::{HarvestError, Result};
use crate::model::manifest::ManifestEntry;

/// File name of the structured manifest.
pub const JSON_MANIFEST: &str = "manifest.json";

/// File name of the tabular manifest.
pub const CSV_MANIFEST: &str = "manifest.csv";

/// CSV column order. Matches the field order of [`ManifestEntry`].
pub const CSV_COLUMNS: [&str; 4] = ["fingerprint", "filename", "original_path", "bundle_path"];

/// Write the structured manifest.
pub fn write_json_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| HarvestError::Manifest(format!("cannot serialize manifest: {e}")))?;
    std::fs::write(path, json + "\n").map_err(|e| HarvestError::io(path, e))
}

/// Write the tabular manifest.
///
/// The header is written explicitly so an empty bundle still gets one.
pub fn write_csv_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| csv_error(path, e))?;
    for entry in entries {
        writer.serialize(entry).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| HarvestError::io(path, e))
}

/// Read a structured manifest back.
pub fn read_json_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let data = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
    serde_json::from_str(&data)
        .map_err(|e| HarvestError::Manifest(format!("{}: {e}", path.display())))
}

/// Read a tabular manifest back.
pub fn read_csv_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers = reader.headers().map_err(|e| csv_error(path, e))?;
    if !headers.iter().eq(CSV_COLUMNS) {
        return Err(HarvestError::Manifest(format!(
            "{}: unexpected header {:?}",
            path.display(),
            headers.iter().collect::<Vec<_>>()
        )));
    }

    reader
        .deserialize::<ManifestEntry>()
        .collect::<std::result::Result<Vec<_>, csv::Error>>()
        .map_err(|e| csv_error(path, e))
}

fn csv_error(path: &Path, e: csv::Error) -> HarvestError {
    HarvestError::Manifest(format!("{}: {e}", path.display()))
}
