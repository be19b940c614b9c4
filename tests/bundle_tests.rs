//! Integration tests for bundle construction and manifests.

use std::path::Path;

use assert_fs::prelude::*;
use predicates::prelude::*;

use docharvest::bundle::manifest::{read_csv_manifest, read_json_manifest};
use docharvest::bundle::{build_bundle, BundleOptions};
use docharvest::error::HarvestError;
use docharvest::feed::mbox::MboxFeed;
use docharvest::feed::{ChannelId, DocumentFilter, Feed};
use docharvest::fingerprint::{fingerprint_file, DEFAULT_CHUNK_SIZE};
use docharvest::scan::{DownloadState, ScanOptions, Scanner};

fn write_inputs(dir: &assert_fs::TempDir) {
    dir.child("in/a.pdf").write_str("same bytes").unwrap();
    dir.child("in/b.pdf").write_str("same bytes").unwrap();
    dir.child("in/sub/c.pdf").write_str("other bytes").unwrap();
    dir.child("in/readme.txt").write_str("same bytes").unwrap();
}

fn options(dir: &Path) -> BundleOptions {
    BundleOptions::new(dir.join("in"), dir.join("bundle"))
}

// ─── Deduplication ──────────────────────────────────────────────────

#[test]
fn test_duplicate_content_bundled_once() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);

    let report = build_bundle(&options(temp.path()), None).unwrap();
    assert_eq!(report.input_files, 3, "readme.txt is not a document");
    assert_eq!(report.unique_files, 2);
    assert_eq!(report.duplicates_skipped, 1);

    let names: Vec<&str> = report.entries.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "c.pdf"], "a.pdf sorts before b.pdf and wins");

    let fp = fingerprint_file(temp.child("in/a.pdf").path(), DEFAULT_CHUNK_SIZE).unwrap();
    let first = &report.entries[0];
    assert_eq!(first.fingerprint, fp.to_hex());
    assert_eq!(
        first.bundle_path.file_name().unwrap().to_string_lossy(),
        format!("{}__a.pdf", &fp.to_hex()[..12])
    );
    temp.child("bundle/pdfs")
        .child(format!("{}__a.pdf", fp.short()))
        .assert("same bytes");
    assert_eq!(report.bytes_bundled, ("same bytes".len() + "other bytes".len()) as u64);
}

#[test]
fn test_sequential_matches_parallel() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);

    let parallel = build_bundle(&options(temp.path()), None).unwrap();
    let mut opts = options(temp.path());
    opts.parallel = false;
    opts.clean = true;
    let sequential = build_bundle(&opts, None).unwrap();
    assert_eq!(parallel.entries, sequential.entries);
}

// ─── Manifests ──────────────────────────────────────────────────────

#[test]
fn test_manifests_describe_same_entries() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);
    temp.child("in/odd, \"name\".pdf").write_str("third").unwrap();

    let report = build_bundle(&options(temp.path()), None).unwrap();
    let json = read_json_manifest(&report.json_manifest).unwrap();
    let csv = read_csv_manifest(&report.csv_manifest).unwrap();
    assert_eq!(json, report.entries);
    assert_eq!(csv, report.entries);

    temp.child("bundle/manifest.csv").assert(predicate::str::starts_with(
        "fingerprint,filename,original_path,bundle_path\n",
    ));
    temp.child("bundle/manifest.json")
        .assert(predicate::str::contains("\"fingerprint\""));
}

#[test]
fn test_repeat_runs_are_deterministic() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);

    let mut opts = options(temp.path());
    opts.clean = true;
    build_bundle(&opts, None).unwrap();
    let json_first = std::fs::read(temp.child("bundle/manifest.json")).unwrap();
    let csv_first = std::fs::read(temp.child("bundle/manifest.csv")).unwrap();

    build_bundle(&opts, None).unwrap();
    assert_eq!(std::fs::read(temp.child("bundle/manifest.json")).unwrap(), json_first);
    assert_eq!(std::fs::read(temp.child("bundle/manifest.csv")).unwrap(), csv_first);
}

#[test]
fn test_empty_input_writes_empty_manifests() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("in").create_dir_all().unwrap();

    let report = build_bundle(&options(temp.path()), None).unwrap();
    assert_eq!(report.unique_files, 0);
    assert!(read_json_manifest(&report.json_manifest).unwrap().is_empty());
    temp.child("bundle/manifest.csv")
        .assert("fingerprint,filename,original_path,bundle_path\n");
}

// ─── Input and output layout ────────────────────────────────────────

#[test]
fn test_nested_output_is_not_rebundled() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);
    let opts = BundleOptions::new(temp.path().join("in"), temp.path().join("in/upload_bundle"));

    let first = build_bundle(&opts, None).unwrap();
    let second = build_bundle(&opts, None).unwrap();
    assert_eq!(first.input_files, 3);
    assert_eq!(second.input_files, 3);
    assert_eq!(first.entries, second.entries);
}

#[test]
fn test_bundle_into_input_root() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("a.pdf").write_str("first").unwrap();
    temp.child("sub/c.pdf").write_str("second").unwrap();
    let opts = BundleOptions::new(temp.path(), temp.path());

    let first = build_bundle(&opts, None).unwrap();
    assert_eq!(first.input_files, 2);
    assert_eq!(first.unique_files, 2);

    let second = build_bundle(&opts, None).unwrap();
    assert_eq!(second.input_files, 2, "bundled copies are not picked up again");
    assert_eq!(first.entries, second.entries);
}

#[test]
fn test_missing_input_dir() {
    let temp = assert_fs::TempDir::new().unwrap();
    let err = build_bundle(&options(temp.path()), None).unwrap_err();
    assert!(matches!(err, HarvestError::Config(_)));
}

#[test]
fn test_progress_reaches_total() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_inputs(&temp);
    let last = std::sync::Mutex::new((0, 0));

    build_bundle(
        &options(temp.path()),
        Some(&|done: usize, total: usize| {
            let mut last = last.lock().unwrap();
            if done > last.0 {
                *last = (done, total);
            }
        }),
    )
    .unwrap();
    assert_eq!(*last.lock().unwrap(), (3, 3));
}

// ─── Scan then bundle ───────────────────────────────────────────────

#[test]
fn test_scan_output_feeds_bundle() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/channel.mbox");
    let channel = ChannelId::Name(fixture.to_string_lossy().into_owned());

    let mut feed = MboxFeed::new(DocumentFilter::pdf());
    feed.connect(&channel).unwrap();
    let scan = ScanOptions {
        channel,
        out_dir: temp.path().join("downloads"),
        state_file: temp.path().join("state.json"),
        limit: None,
        min_message_id: 0,
        filter: DocumentFilter::pdf(),
    };
    let mut state = DownloadState::default();
    Scanner::new(&feed, scan).run(&mut state, None).unwrap();

    let report = build_bundle(
        &BundleOptions::new(temp.path().join("downloads"), temp.path().join("bundle")),
        None,
    )
    .unwrap();
    assert_eq!(report.input_files, 4);
    assert_eq!(report.unique_files, 4);
    let names: Vec<&str> = report.entries.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(names, vec!["Annual Report.pdf", "notes (2).pdf", "notes.pdf", "undated.pdf"]);
}
