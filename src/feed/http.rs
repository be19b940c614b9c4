//! Feed backed by an HTTP message API.
//!
//! Endpoints, relative to the configured base URL:
//!
//! ```text
//! GET channels/{channel}                            reachability check
//! GET channels/{channel}/messages?limit=N[&before=ID]
//!     -> {"messages": [FeedMessage, ...], "next_before": ID | null}
//! GET channels/{channel}/messages/{id}/payload      raw attachment bytes
//! ```
//!
//! Pages arrive newest-first; `next_before` is the cursor for the next,
//! older page. Every request carries `Authorization: Bearer <token>`. The
//! token is issued out of band and read from the environment.

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use tracing::{debug, info};

use super::{ChannelId, Feed, MessageIter};
use crate::config::FeedConfig;
use crate::error::{HarvestError, Result};
use crate::model::message::{FeedMessage, MessageId};

const USER_AGENT: &str = concat!("docharvest/", env!("CARGO_PKG_VERSION"));

/// One page of the message listing.
#[derive(Debug, serde::Deserialize)]
pub struct MessagePage {
    pub messages: Vec<FeedMessage>,
    #[serde(default)]
    pub next_before: Option<MessageId>,
}

/// HTTP message API feed.
pub struct HttpFeed {
    client: Client,
    base: Url,
    token: String,
    page_size: usize,
}

impl HttpFeed {
    /// Create a feed client for `base_url` authenticated with `token`.
    pub fn new(base_url: &str, token: &str, timeout: Duration, page_size: usize) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| HarvestError::Config(format!("invalid feed base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(HarvestError::Config(format!(
                "feed base URL '{base_url}' cannot carry a path"
            )));
        }
        if token.trim().is_empty() {
            return Err(HarvestError::Config("feed access token is empty".into()));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::Feed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: token.trim().to_string(),
            page_size: page_size.max(1),
        })
    }

    /// Build from configuration, reading the token from `config.token_env`.
    ///
    /// Missing settings are reported before any network activity.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                HarvestError::Config("feed.base_url must be set to use the http source".into())
            })?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HarvestError::MissingCredential(config.token_env.clone()))?;
        Self::new(
            base_url,
            &token,
            Duration::from_secs(config.timeout_secs),
            config.page_size,
        )
    }

    /// URL of `channels/{channel}/{rest...}` under the base.
    pub fn endpoint(&self, channel: &ChannelId, rest: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HarvestError::Config("feed base URL cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.push("channels");
            segments.push(&channel.to_string());
            segments.extend(rest);
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> Result<reqwest::blocking::Response> {
        let shown = url.to_string();
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| HarvestError::Feed(format!("{shown}: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HarvestError::Feed(format!(
                "{shown}: access token rejected (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(HarvestError::Feed(format!("{shown}: HTTP {status}")));
        }
        Ok(response)
    }

    fn fetch_page(
        &self,
        channel: &ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint(channel, &["messages"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", &before.to_string());
            }
        }
        let shown = url.to_string();
        let page: MessagePage = self
            .get(url)?
            .json()
            .map_err(|e| HarvestError::Feed(format!("{shown}: malformed page: {e}")))?;
        debug!(
            count = page.messages.len(),
            next_before = ?page.next_before,
            "Fetched message page"
        );
        Ok(page)
    }
}

impl Feed for HttpFeed {
    fn connect(&mut self, channel: &ChannelId) -> Result<()> {
        let url = self.endpoint(channel, &[])?;
        self.get(url)?;
        info!(base = %self.base, channel = %channel, "Connected to HTTP feed");
        Ok(())
    }

    fn iterate<'a>(
        &'a self,
        channel: &ChannelId,
        limit: Option<usize>,
    ) -> Result<MessageIter<'a>> {
        Ok(Box::new(PagedMessages {
            feed: self,
            channel: channel.clone(),
            buffer: VecDeque::new(),
            before: None,
            remaining: limit,
            exhausted: false,
        }))
    }

    fn fetch_payload(
        &self,
        channel: &ChannelId,
        message: &FeedMessage,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let fail = |reason: String| HarvestError::Fetch {
            id: message.id,
            reason,
        };
        let url = self.endpoint(channel, &["messages", &message.id.to_string(), "payload"])?;
        let mut response = self.get(url).map_err(|e| fail(e.to_string()))?;
        response.copy_to(sink).map_err(|e| fail(e.to_string()))
    }
}

/// Lazy newest-first walk over the paginated listing.
struct PagedMessages<'a> {
    feed: &'a HttpFeed,
    channel: ChannelId,
    buffer: VecDeque<FeedMessage>,
    before: Option<MessageId>,
    remaining: Option<usize>,
    exhausted: bool,
}

impl Iterator for PagedMessages<'_> {
    type Item = Result<FeedMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            let want = self
                .remaining
                .map_or(self.feed.page_size, |r| r.min(self.feed.page_size));
            match self.feed.fetch_page(&self.channel, self.before, want) {
                Ok(page) => {
                    match page.next_before {
                        Some(cursor) if !page.messages.is_empty() => self.before = Some(cursor),
                        _ => self.exhausted = true,
                    }
                    self.buffer.extend(page.messages);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let message = self.buffer.pop_front()?;
        if let Some(r) = self.remaining.as_mut() {
            *r -= 1;
        }
        Some(Ok(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(base: &str) -> HttpFeed {
        HttpFeed::new(base, "secret", Duration::from_secs(5), 50).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let f = feed("https://feeds.example.com/api/");
        let url = f
            .endpoint(&ChannelId::Name("mychannel".into()), &["messages", "42", "payload"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://feeds.example.com/api/channels/mychannel/messages/42/payload"
        );
    }

    #[test]
    fn test_endpoint_without_trailing_slash_and_numeric_channel() {
        let f = feed("https://feeds.example.com/api");
        let url = f.endpoint(&ChannelId::Numeric(-100123), &[]).unwrap();
        assert_eq!(url.as_str(), "https://feeds.example.com/api/channels/-100123");
    }

    #[test]
    fn test_endpoint_escapes_channel_names() {
        let f = feed("https://feeds.example.com/");
        let url = f
            .endpoint(&ChannelId::Name("a b/c".into()), &["messages"])
            .unwrap();
        assert_eq!(url.as_str(), "https://feeds.example.com/channels/a%20b%2Fc/messages");
    }

    #[test]
    fn test_page_parsing() {
        let body = r#"{
            "messages": [
                {"id": 12, "date": "2024-05-01T10:00:00Z",
                 "attachment": {"file_name": "a.pdf", "mime_type": "application/pdf", "size": 10}},
                {"id": 11},
                {"id": 10, "attachment": {"file_name": "b.pdf"}}
            ],
            "next_before": 10
        }"#;
        let page: MessagePage = serde_json::from_str(body).unwrap();
        assert_eq!(page.messages.len(), 3);
        assert_eq!(page.next_before, Some(10));
        assert!(page.messages[0].date.is_some());
        assert!(page.messages[1].attachment.is_none());
        assert_eq!(
            page.messages[2].attachment.as_ref().unwrap().mime_type,
            None
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpFeed::new("not a url", "t", Duration::from_secs(1), 10)
            .err()
            .unwrap();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_missing_token_is_credential_error() {
        let config = FeedConfig {
            base_url: Some("https://feeds.example.com/".into()),
            token_env: "DOCHARVEST_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
            ..FeedConfig::default()
        };
        let err = HttpFeed::from_config(&config).err().unwrap();
        assert!(matches!(err, HarvestError::MissingCredential(name) if name == config.token_env));
    }

    #[test]
    fn test_zero_limit_yields_nothing_without_requests() {
        let f = feed("http://127.0.0.1:9/");
        let mut iter = f.iterate(&ChannelId::Numeric(1), Some(0)).unwrap();
        assert!(iter.next().is_none());
    }
}
