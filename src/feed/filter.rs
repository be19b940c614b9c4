//! Eligibility filter: which attachments are documents worth downloading.

use std::path::Path;

use crate::config::DocumentsConfig;
use crate::model::attachment::AttachmentMeta;
use crate::model::message::FeedMessage;

/// Decides whether an attachment is a target document.
///
/// An attachment qualifies when its declared MIME type equals the target
/// type, or, failing that, when its filename carries the target extension.
/// The second check exists because feeds often mislabel or omit MIME types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    mime_type: String,
    extension: String,
}

impl DocumentFilter {
    /// Build a filter for `mime_type` / `extension` (leading dot optional).
    pub fn new(mime_type: &str, extension: &str) -> Self {
        Self {
            mime_type: mime_type.trim().to_lowercase(),
            extension: extension.trim().trim_start_matches('.').to_lowercase(),
        }
    }

    /// The PDF filter (`application/pdf`, `.pdf`).
    pub fn pdf() -> Self {
        Self::new("application/pdf", "pdf")
    }

    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self::new(&config.mime_type, &config.extension)
    }

    /// Target extension, lower-case, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `true` if `message` carries an attachment that is a target document.
    pub fn is_candidate(&self, message: &FeedMessage) -> bool {
        message
            .attachment
            .as_ref()
            .is_some_and(|att| self.accepts(att))
    }

    /// MIME check first, extension fallback second.
    pub fn accepts(&self, attachment: &AttachmentMeta) -> bool {
        let mime_matches = attachment
            .mime_type
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case(&self.mime_type));
        if mime_matches {
            return true;
        }
        attachment
            .extension()
            .is_some_and(|ext| ext == self.extension)
    }

    /// `true` if a local file name carries the target extension.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::pdf()
    }
}
