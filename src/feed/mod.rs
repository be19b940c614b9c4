//! Feed access: the capability the scanner reads messages and payloads through.
//!
//! A feed is an ordered message stream. The scanner only relies on message
//! ids growing with feed age; delivery order is whatever the backend yields
//! (conventionally newest-first). Authentication is not handled here: each
//! backend is handed credentials that are already valid.

pub mod filter;
pub mod http;
pub mod mbox;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::model::message::FeedMessage;

pub use filter::DocumentFilter;

/// Lazy sequence of feed messages.
pub type MessageIter<'a> = Box<dyn Iterator<Item = Result<FeedMessage>> + 'a>;

/// Pre-authenticated access to an ordered message feed.
pub trait Feed {
    /// Establish access to `channel`. Failures here are fatal and happen
    /// before any message is scanned.
    fn connect(&mut self, channel: &ChannelId) -> Result<()>;

    /// Walk the channel in delivery order, yielding at most `limit` messages.
    fn iterate<'a>(
        &'a self,
        channel: &ChannelId,
        limit: Option<usize>,
    ) -> Result<MessageIter<'a>>;

    /// Stream the attachment payload of `message` into `sink`.
    ///
    /// Returns the number of bytes written.
    fn fetch_payload(
        &self,
        channel: &ChannelId,
        message: &FeedMessage,
        sink: &mut dyn Write,
    ) -> Result<u64>;
}

/// Backend kinds selectable from the command line or config file.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Local MBOX archive; the channel names the archive file.
    #[default]
    Mbox,
    /// HTTP message API with a bearer token.
    Http,
}

/// Channel identifier: a numeric id or a name.
///
/// Names are accepted as `name`, `@name`, or a `t.me/name` link and are
/// normalized to the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Numeric(i64),
    Name(String),
}

impl FromStr for ChannelId {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(HarvestError::Config("channel identifier is empty".into()));
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(Self::Numeric(n));
        }

        let name = ["https://t.me/", "http://t.me/", "t.me/"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .unwrap_or(trimmed);
        let name = name.strip_prefix('@').unwrap_or(name).trim_end_matches('/');
        if name.is_empty() {
            return Err(HarvestError::Config(format!(
                "channel identifier '{trimmed}' has no name"
            )));
        }
        Ok(Self::Name(name.to_string()))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Construct the feed backend selected by `source`.
///
/// Configuration problems (missing base URL, missing token) surface here,
/// before any network or disk activity.
pub fn open_feed(source: FeedSource, config: &Config) -> Result<Box<dyn Feed>> {
    let filter = DocumentFilter::from_config(&config.documents);
    match source {
        FeedSource::Mbox => Ok(Box::new(mbox::MboxFeed::new(filter))),
        FeedSource::Http => Ok(Box::new(http::HttpFeed::from_config(&config.feed)?)),
    }
}
