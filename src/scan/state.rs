//! Durable download state.
//!
//! ```text
//! {
//!   "downloaded_message_ids": [101, 102, 240],
//!   "files": {
//!     "101": "downloads/feed_documents/2024-01/Annual Report.pdf",
//!     ...
//!   }
//! }
//! ```
//!
//! The whole file is rewritten after every successful download. Writes go
//! to a sibling temp file that is renamed over the old state, so a crash
//! mid-write never leaves a truncated state behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::model::message::MessageId;

/// Which messages have been materialized locally, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DownloadState {
    /// Ids already downloaded. Checked before every fetch.
    #[serde(default, rename = "downloaded_message_ids")]
    downloaded_ids: BTreeSet<MessageId>,

    /// Saved path per downloaded id.
    #[serde(default)]
    files: BTreeMap<MessageId, PathBuf>,
}

impl DownloadState {
    /// Load the state file, or start empty if it does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error: starting
    /// over silently would re-download everything.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No state file, starting fresh");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| HarvestError::state(path, e))?;
        let state: Self = serde_json::from_str(&data).map_err(|e| HarvestError::state(path, e))?;
        debug!(
            path = %path.display(),
            downloaded = state.downloaded_ids.len(),
            "Loaded download state"
        );
        Ok(state)
    }

    /// Rewrite the state file in full.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::state(path, e))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| HarvestError::state(path, e))?;
        let tmp = temp_path_for(path);
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            HarvestError::state(path, e)
        })
    }

    /// `true` if `id` has already been downloaded.
    pub fn contains(&self, id: MessageId) -> bool {
        self.downloaded_ids.contains(&id)
    }

    /// Record a completed download. Returns `false` if the id was already known.
    pub fn record(&mut self, id: MessageId, path: PathBuf) -> bool {
        if !self.downloaded_ids.insert(id) {
            return false;
        }
        self.files.insert(id, path);
        true
    }

    /// Saved path of a downloaded message.
    pub fn path_of(&self, id: MessageId) -> Option<&Path> {
        self.files.get(&id).map(PathBuf::as_path)
    }

    /// Number of downloaded messages.
    pub fn len(&self) -> usize {
        self.downloaded_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloaded_ids.is_empty()
    }

    /// Largest downloaded id; pass it as `min_message_id` for incremental runs.
    pub fn high_water_mark(&self) -> Option<MessageId> {
        self.downloaded_ids.last().copied()
    }

    /// Downloaded ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.downloaded_ids.iter().copied()
    }
}

/// `state.json` → `.state.json.tmp` in the same directory.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
