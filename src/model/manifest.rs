//! Bundle manifest entry.

use std::path::PathBuf;

/// One retained document in an upload bundle.
///
/// There is exactly one entry per distinct content fingerprint. When several
/// inputs share content, only the first in sorted path order is recorded;
/// the others leave no trace in the manifest.
///
/// Field order is the column order of `manifest.csv`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    /// Hex-encoded SHA-256 of the document bytes.
    pub fingerprint: String,

    /// Original filename (last path component of `original_path`).
    pub filename: String,

    /// Path of the input file that won the fingerprint.
    pub original_path: PathBuf,

    /// Path of the copy inside the bundle.
    pub bundle_path: PathBuf,
}
