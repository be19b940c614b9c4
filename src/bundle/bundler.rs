//! Bundle construction.
//!
//! 1. Discover every document under the input root and sort the paths.
//! 2. Fingerprint all of them (in parallel when enabled; results keep
//!    the sorted order).
//! 3. Walk the sorted list once: the first path seen for a fingerprint is
//!    copied to `<out>/<documents_subdir>/<12 hex>__<name>`, later paths with
//!    the same fingerprint are dropped without a trace.
//! 4. Write `manifest.json` and `manifest.csv` from the same entry list.
//!
//! Any read, hash, or copy error aborts the run. A bundle directory left by
//! an aborted run is not meant to be reused.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::manifest::{write_csv_manifest, write_json_manifest, CSV_MANIFEST, JSON_MANIFEST};
use crate::error::{HarvestError, Result};
use crate::feed::DocumentFilter;
use crate::fingerprint::{fingerprint_file, Fingerprint, DEFAULT_CHUNK_SIZE};
use crate::model::manifest::ManifestEntry;
use crate::naming::safe_name;

/// Progress callback: `(files_fingerprinted, total_files)`.
pub type BundleProgress<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Bundler inputs.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub in_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Flat directory under `out_dir` receiving the documents.
    pub documents_subdir: String,
    pub filter: DocumentFilter,
    pub chunk_size: usize,
    pub parallel: bool,
    /// Remove the documents directory before copying.
    pub clean: bool,
}

impl BundleOptions {
    /// PDF bundle of `in_dir` into `out_dir` with default settings.
    pub fn new(in_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            in_dir: in_dir.into(),
            out_dir: out_dir.into(),
            documents_subdir: "pdfs".to_string(),
            filter: DocumentFilter::pdf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            clean: false,
        }
    }
}

/// Outcome of one bundle run.
#[derive(Debug, serde::Serialize)]
pub struct BundleReport {
    /// Documents found under the input root.
    pub input_files: usize,
    /// Distinct contents copied into the bundle.
    pub unique_files: usize,
    /// Inputs dropped because an earlier path had the same content.
    pub duplicates_skipped: usize,
    pub bytes_bundled: u64,
    pub out_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub json_manifest: PathBuf,
    pub csv_manifest: PathBuf,
    #[serde(skip)]
    pub entries: Vec<ManifestEntry>,
}

/// All documents under `root`, sorted by path.
///
/// `exclude` prunes one directory from the walk (the bundle's documents
/// directory when it sits inside the input tree).
pub fn discover_documents(
    root: &Path,
    filter: &DocumentFilter,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(HarvestError::Config(format!(
            "input directory not found: {}",
            root.display()
        )));
    }

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |x| e.path() != x));
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            HarvestError::io(path, std::io::Error::from(e))
        })?;
        if entry.file_type().is_file() && filter.matches_path(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Build a bundle from `options.in_dir` into `options.out_dir`.
pub fn build_bundle(
    options: &BundleOptions,
    progress: Option<BundleProgress<'_>>,
) -> Result<BundleReport> {
    let in_dir = options
        .in_dir
        .canonicalize()
        .map_err(|e| {
            HarvestError::Config(format!("input directory {}: {e}", options.in_dir.display()))
        })?;

    std::fs::create_dir_all(&options.out_dir).map_err(|e| HarvestError::io(&options.out_dir, e))?;
    let out_dir = options
        .out_dir
        .canonicalize()
        .map_err(|e| HarvestError::io(&options.out_dir, e))?;
    let documents_dir = out_dir.join(&options.documents_subdir);

    if options.clean && documents_dir.exists() {
        debug!(path = %documents_dir.display(), "Cleaning documents directory");
        std::fs::remove_dir_all(&documents_dir).map_err(|e| HarvestError::io(&documents_dir, e))?;
    }
    std::fs::create_dir_all(&documents_dir).map_err(|e| HarvestError::io(&documents_dir, e))?;

    // Only the documents directory is recursive output; the input may be the
    // bundle root itself.
    let inputs = discover_documents(&in_dir, &options.filter, Some(&documents_dir))?;
    info!(
        in_dir = %in_dir.display(),
        documents = inputs.len(),
        parallel = options.parallel,
        "Fingerprinting documents"
    );

    let fingerprints = fingerprint_all(&inputs, options, progress)?;

    let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(inputs.len());
    let mut entries = Vec::new();
    let mut bytes_bundled: u64 = 0;

    for (src, fp) in inputs.iter().zip(fingerprints) {
        if !seen.insert(fp) {
            debug!(path = %src.display(), fingerprint = %fp, "Skipping duplicate content");
            continue;
        }

        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dst = documents_dir.join(format!("{}__{}", fp.short(), safe_name(&filename)));
        bytes_bundled += std::fs::copy(src, &dst).map_err(|e| HarvestError::io(&dst, e))?;

        entries.push(ManifestEntry {
            fingerprint: fp.to_hex(),
            original_path: src.clone(),
            bundle_path: dst,
            filename,
        });
    }

    let json_manifest = out_dir.join(JSON_MANIFEST);
    let csv_manifest = out_dir.join(CSV_MANIFEST);
    write_json_manifest(&json_manifest, &entries)?;
    write_csv_manifest(&csv_manifest, &entries)?;

    let report = BundleReport {
        input_files: inputs.len(),
        unique_files: entries.len(),
        duplicates_skipped: inputs.len() - entries.len(),
        bytes_bundled,
        out_dir,
        documents_dir,
        json_manifest,
        csv_manifest,
        entries,
    };
    info!(
        input = report.input_files,
        unique = report.unique_files,
        duplicates = report.duplicates_skipped,
        "Bundle written"
    );
    Ok(report)
}

/// Fingerprints in the same order as `paths`.
fn fingerprint_all(
    paths: &[PathBuf],
    options: &BundleOptions,
    progress: Option<BundleProgress<'_>>,
) -> Result<Vec<Fingerprint>> {
    let total = paths.len();
    let done = AtomicUsize::new(0);
    let hash_one = |path: &PathBuf| -> Result<Fingerprint> {
        let fp = fingerprint_file(path, options.chunk_size)?;
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(cb) = progress {
            cb(n, total);
        }
        Ok(fp)
    };

    if options.parallel {
        paths.par_iter().map(hash_one).collect()
    } else {
        paths.iter().map(hash_one).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2024-02")).unwrap();
        std::fs::create_dir_all(root.join("2024-01")).unwrap();
        std::fs::write(root.join("2024-02/b.pdf"), b"b").unwrap();
        std::fs::write(root.join("2024-01/z.PDF"), b"z").unwrap();
        std::fs::write(root.join("2024-01/notes.txt"), b"t").unwrap();
        std::fs::write(root.join("a.pdf"), b"a").unwrap();

        let found = discover_documents(root, &DocumentFilter::pdf(), None).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("2024-01/z.PDF"),
                root.join("2024-02/b.pdf"),
                root.join("a.pdf"),
            ]
        );
    }

    #[test]
    fn test_discover_excludes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("bundle/pdfs")).unwrap();
        std::fs::write(root.join("bundle/pdfs/old.pdf"), b"old").unwrap();
        std::fs::write(root.join("new.pdf"), b"new").unwrap();

        let found =
            discover_documents(root, &DocumentFilter::pdf(), Some(&root.join("bundle"))).unwrap();
        assert_eq!(found, vec![root.join("new.pdf")]);
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_documents(&dir.path().join("nope"), &DocumentFilter::pdf(), None)
            .unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..20)
            .map(|i| {
                let p = dir.path().join(format!("{i:02}.pdf"));
                std::fs::write(&p, format!("doc {}", i % 7)).unwrap();
                p
            })
            .collect();

        let mut opts = BundleOptions::new(dir.path(), dir.path().join("out"));
        opts.chunk_size = 3;
        let par = fingerprint_all(&paths, &opts, None).unwrap();
        opts.parallel = false;
        let seq = fingerprint_all(&paths, &opts, None).unwrap();
        assert_eq!(par, seq);
        assert_eq!(par[0], par[7]);
        assert_ne!(par[0], par[1]);
    }
}
