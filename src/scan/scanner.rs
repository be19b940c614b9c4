//! Incremental, resumable feed scanner.
//!
//! Messages are handled strictly in delivery order. For each one the scanner
//! counts it, skips it if it is at or below the `min_message_id` mark, already
//! downloaded, or not a document, and otherwise downloads it and commits the
//! state file before moving on. A crash therefore loses at most the download
//! in flight.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::state::DownloadState;
use crate::error::{HarvestError, Result};
use crate::feed::{ChannelId, DocumentFilter, Feed};
use crate::model::message::{FeedMessage, MessageId};
use crate::naming::{month_bucket, safe_name, unique_path};

/// What to scan and where to put it.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub channel: ChannelId,
    pub out_dir: PathBuf,
    pub state_file: PathBuf,
    /// Maximum number of messages to inspect (not to download).
    pub limit: Option<usize>,
    /// Messages with `id <= min_message_id` are ignored.
    pub min_message_id: MessageId,
    pub filter: DocumentFilter,
}

/// A document saved during this run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DownloadRecord {
    pub message_id: MessageId,
    pub file_path: PathBuf,
    pub bytes: u64,
}

/// A document whose payload could not be fetched. It stays out of the
/// state, so the next run retries it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedFetch {
    pub message_id: MessageId,
    pub reason: String,
}

/// Outcome of one scan.
#[derive(Debug, Default, serde::Serialize)]
pub struct ScanReport {
    /// Messages visited, eligible or not.
    pub scanned: usize,
    pub downloaded: Vec<DownloadRecord>,
    pub failed: Vec<FailedFetch>,
    pub skipped_below_min: usize,
    pub skipped_known: usize,
    pub skipped_ineligible: usize,
}

/// Walks one channel of a feed and downloads new documents.
pub struct Scanner<'f> {
    feed: &'f dyn Feed,
    options: ScanOptions,
}

impl<'f> Scanner<'f> {
    /// The feed must already be connected to `options.channel`.
    pub fn new(feed: &'f dyn Feed, options: ScanOptions) -> Self {
        Self { feed, options }
    }

    /// Scan the channel, mutating and persisting `state` after each download.
    ///
    /// Per-message fetch failures are logged and reported, never returned.
    /// Errors from the feed iteration itself and from persisting state abort
    /// the run.
    pub fn run(
        &self,
        state: &mut DownloadState,
        progress: Option<&dyn Fn(usize)>,
    ) -> Result<ScanReport> {
        let opts = &self.options;
        let mut report = ScanReport::default();
        let mut messages = self.feed.iterate(&opts.channel, opts.limit)?;

        info!(
            channel = %opts.channel,
            limit = ?opts.limit,
            min_message_id = opts.min_message_id,
            known = state.len(),
            "Starting scan"
        );

        while opts.limit.map_or(true, |limit| report.scanned < limit) {
            let Some(item) = messages.next() else { break };
            let message = item?;

            report.scanned += 1;
            if let Some(cb) = progress {
                cb(report.scanned);
            }

            if message.id <= opts.min_message_id {
                report.skipped_below_min += 1;
                continue;
            }
            if state.contains(message.id) {
                report.skipped_known += 1;
                continue;
            }
            if !opts.filter.is_candidate(&message) {
                report.skipped_ineligible += 1;
                continue;
            }

            match self.download(&message) {
                Ok(record) => {
                    state.record(record.message_id, record.file_path.clone());
                    state.save(&opts.state_file)?;
                    info!(
                        id = record.message_id,
                        path = %record.file_path.display(),
                        bytes = record.bytes,
                        "Downloaded document"
                    );
                    report.downloaded.push(record);
                }
                Err(e) => {
                    warn!(id = message.id, error = %e, "Failed to download document");
                    report.failed.push(FailedFetch {
                        message_id: message.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "Scan finished"
        );
        Ok(report)
    }

    /// Fetch one payload into its final location.
    ///
    /// The payload streams into a hidden `.part` sibling first and is renamed
    /// into place only once complete.
    fn download(&self, message: &FeedMessage) -> Result<DownloadRecord> {
        let dir = self.options.out_dir.join(month_bucket(message.date.as_ref()));
        std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

        let target = unique_path(&dir.join(self.local_name(message)));
        let partial = partial_path_for(&target);
        debug!(id = message.id, target = %target.display(), "Fetching payload");

        let result = (|| -> Result<u64> {
            let file = File::create(&partial).map_err(|e| HarvestError::io(&partial, e))?;
            let mut writer = BufWriter::new(file);
            let bytes = self
                .feed
                .fetch_payload(&self.options.channel, message, &mut writer)?;
            let file = writer
                .into_inner()
                .map_err(|e| HarvestError::io(&partial, e.into_error()))?;
            file.sync_all().map_err(|e| HarvestError::io(&partial, e))?;
            std::fs::rename(&partial, &target).map_err(|e| HarvestError::io(&target, e))?;
            Ok(bytes)
        })();

        match result {
            Ok(bytes) => Ok(DownloadRecord {
                message_id: message.id,
                file_path: target,
                bytes,
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    /// Sanitized attachment name, or `message_<id>.<ext>` when there is none.
    fn local_name(&self, message: &FeedMessage) -> String {
        let declared = message
            .attachment
            .as_ref()
            .and_then(|a| a.file_name.as_deref())
            .map(safe_name)
            .unwrap_or_default();
        if declared.trim().is_empty() {
            format!("message_{}.{}", message.id, self.options.filter.extension())
        } else {
            declared
        }
    }
}

/// `dir/name.pdf` → `dir/.name.pdf.part`.
fn partial_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.part"))
}
