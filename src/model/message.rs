//! Feed message type.

use chrono::{DateTime, Utc};

use super::attachment::AttachmentMeta;

/// Identifier of a message within one feed.
///
/// Ids grow strictly with feed age: a newer message always has a larger id,
/// even when the feed delivers the stream newest-first.
pub type MessageId = u64;

/// One element of an ordered feed, as seen by the scanner.
///
/// Read-only: the scanner never mutates messages, it only decides whether to
/// fetch their payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeedMessage {
    /// Monotonic message id.
    pub id: MessageId,

    /// Timestamp of the message, used for year-month bucketing.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Attachment carried by the message, if any.
    #[serde(default)]
    pub attachment: Option<AttachmentMeta>,
}

impl FeedMessage {
    /// A message without attachment or timestamp.
    pub fn bare(id: MessageId) -> Self {
        Self {
            id,
            date: None,
            attachment: None,
        }
    }

    /// Builder-style helper attaching a document description.
    pub fn with_attachment(
        mut self,
        file_name: Option<&str>,
        mime_type: Option<&str>,
    ) -> Self {
        self.attachment = Some(AttachmentMeta {
            file_name: file_name.map(String::from),
            mime_type: mime_type.map(String::from),
            size: None,
        });
        self
    }

    /// Builder-style helper setting the timestamp.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}
