//! Feed scanning: incremental download of document attachments with durable,
//! per-download state commits.

pub mod scanner;
pub mod state;

pub use scanner::{DownloadRecord, FailedFetch, ScanOptions, ScanReport, Scanner};
pub use state::DownloadState;
