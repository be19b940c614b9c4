//! Attachment metadata.
//!
//! The payload itself is NOT part of the metadata. It is fetched from the
//! feed on demand, only for messages that pass the eligibility filter.

/// Metadata a feed declares about a message attachment.
///
/// Every field is optional because real feeds frequently omit or mislabel
/// them; the eligibility filter copes with either field missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentMeta {
    /// Filename declared by the sender, if any.
    #[serde(default)]
    pub file_name: Option<String>,

    /// Declared MIME type (e.g. `"application/pdf"`). Not trusted on its own.
    #[serde(default)]
    pub mime_type: Option<String>,

    /// Declared payload size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

impl AttachmentMeta {
    /// Lower-cased extension of the declared filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}
