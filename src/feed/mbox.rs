//! Feed backed by a local MBOX archive.
//!
//! The channel names the archive file (`name`, or `name.mbox` when the bare
//! name does not exist). Messages are numbered 1..n in file order, so ids
//! grow with age the way mail archives are appended, and are delivered
//! newest-first. Each message's document is its first attachment accepted by
//! the [`DocumentFilter`], or else its first attachment.
//!
//! Connecting streams the archive once with a 1 MB buffer and keeps only
//! offsets and attachment metadata. Payloads are decoded on demand by
//! seeking back to the message.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, info, warn};

use super::{ChannelId, DocumentFilter, Feed, MessageIter};
use crate::error::{HarvestError, Result};
use crate::model::attachment::AttachmentMeta;
use crate::model::message::{FeedMessage, MessageId};

/// Size of the internal read buffer (1 MB for fast sequential reads).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Location and description of one archived message.
#[derive(Debug, Clone)]
struct MboxRecord {
    offset: u64,
    length: u64,
    message: FeedMessage,
    /// Position of the chosen attachment in the message's attachment list.
    part_index: Option<usize>,
}

#[derive(Debug)]
struct Catalog {
    path: PathBuf,
    /// Oldest first; `records[i]` has id `i + 1`.
    records: Vec<MboxRecord>,
}

/// MBOX archive feed.
pub struct MboxFeed {
    filter: DocumentFilter,
    catalogs: HashMap<ChannelId, Catalog>,
}

impl MboxFeed {
    pub fn new(filter: DocumentFilter) -> Self {
        Self {
            filter,
            catalogs: HashMap::new(),
        }
    }

    /// Resolve a channel to the archive file it names.
    pub fn archive_path(channel: &ChannelId) -> PathBuf {
        match channel {
            ChannelId::Numeric(n) => PathBuf::from(format!("{n}.mbox")),
            ChannelId::Name(name) => {
                let direct = PathBuf::from(name);
                if direct.exists() {
                    direct
                } else {
                    PathBuf::from(format!("{name}.mbox"))
                }
            }
        }
    }

    fn catalog(&self, channel: &ChannelId) -> Result<&Catalog> {
        self.catalogs
            .get(channel)
            .ok_or_else(|| HarvestError::Feed(format!("channel '{channel}' is not connected")))
    }
}

impl Feed for MboxFeed {
    fn connect(&mut self, channel: &ChannelId) -> Result<()> {
        let path = Self::archive_path(channel);
        if !path.is_file() {
            return Err(HarvestError::Feed(format!(
                "MBOX archive not found: {}",
                path.display()
            )));
        }
        let catalog = build_catalog(&path, &self.filter)?;
        info!(
            path = %path.display(),
            messages = catalog.records.len(),
            "Opened MBOX feed"
        );
        self.catalogs.insert(channel.clone(), catalog);
        Ok(())
    }

    fn iterate<'a>(
        &'a self,
        channel: &ChannelId,
        limit: Option<usize>,
    ) -> Result<MessageIter<'a>> {
        let catalog = self.catalog(channel)?;
        let iter = catalog
            .records
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| Ok::<_, HarvestError>(record.message.clone()));
        Ok(Box::new(iter))
    }

    fn fetch_payload(
        &self,
        channel: &ChannelId,
        message: &FeedMessage,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let catalog = self.catalog(channel)?;
        let fail = |reason: String| HarvestError::Fetch {
            id: message.id,
            reason,
        };

        let record = usize::try_from(message.id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|idx| catalog.records.get(idx))
            .ok_or_else(|| fail("no such message in archive".into()))?;
        let part_index = record
            .part_index
            .ok_or_else(|| fail("message has no attachment".into()))?;

        let raw = read_message_at(&catalog.path, record.offset, record.length)?;
        let parsed = MessageParser::default()
            .parse(skip_from_line(&raw))
            .ok_or_else(|| fail("message no longer parses".into()))?;
        let part = parsed
            .attachments()
            .nth(part_index)
            .ok_or_else(|| fail(format!("attachment #{part_index} missing")))?;

        let contents = part.contents();
        sink.write_all(contents).map_err(|e| fail(e.to_string()))?;
        debug!(id = message.id, bytes = contents.len(), "Decoded MBOX attachment");
        Ok(contents.len() as u64)
    }
}

/// Stream the archive and describe every message in it.
fn build_catalog(path: &Path, filter: &DocumentFilter) -> Result<Catalog> {
    let mut records = Vec::new();
    split_messages(path, &mut |offset, raw| {
        let id = records.len() as MessageId + 1;
        let (message, part_index) = describe_message(id, raw, filter);
        records.push(MboxRecord {
            offset,
            length: raw.len() as u64,
            message,
            part_index,
        });
    })?;
    Ok(Catalog {
        path: path.to_path_buf(),
        records,
    })
}

/// Call `on_message(offset, raw_bytes)` for each message in the archive.
///
/// A `From ` line opens a new message at the start of the file or after a
/// blank line. One without a preceding blank line still splits, with a
/// warning, since exporters are not always careful about it.
fn split_messages(path: &Path, on_message: &mut dyn FnMut(u64, &[u8])) -> Result<u64> {
    let file = File::open(path).map_err(|e| HarvestError::io(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut count: u64 = 0;
    let mut offset: u64 = 0;
    let mut start: u64 = 0;
    let mut message: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut line: Vec<u8> = Vec::with_capacity(4096);
    let mut prev_blank = true;

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| HarvestError::io(path, e))?;
        if n == 0 {
            break;
        }

        if is_mbox_separator(&line) {
            if !prev_blank {
                warn!(offset, "Found 'From ' separator without preceding blank line");
            }
            if !message.is_empty() {
                on_message(start, &message);
                count += 1;
            }
            start = offset;
            message.clear();
        }
        message.extend_from_slice(&line);

        prev_blank = is_blank_line(&line);
        offset += n as u64;
    }

    if !message.is_empty() {
        on_message(start, &message);
        count += 1;
    }
    Ok(count)
}

/// Build the feed view of one raw message and pick its document part.
fn describe_message(
    id: MessageId,
    raw: &[u8],
    filter: &DocumentFilter,
) -> (FeedMessage, Option<usize>) {
    let Some(parsed) = MessageParser::default().parse(skip_from_line(raw)) else {
        warn!(id, "Unparseable message, treating as bare");
        return (FeedMessage::bare(id), None);
    };

    let date = parsed
        .date()
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
        .map(|d| d.with_timezone(&Utc));

    let attachments: Vec<AttachmentMeta> = parsed
        .attachments()
        .map(|part| AttachmentMeta {
            file_name: part.attachment_name().map(String::from),
            mime_type: part.content_type().map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{sub}", ct.ctype()),
                None => ct.ctype().to_string(),
            }),
            size: Some(part.contents().len() as u64),
        })
        .collect();

    let part_index = attachments
        .iter()
        .position(|att| filter.accepts(att))
        .or(if attachments.is_empty() { None } else { Some(0) });

    let message = FeedMessage {
        id,
        date,
        attachment: part_index.map(|i| attachments[i].clone()),
    };
    (message, part_index)
}

/// Read a single message at the given offset and length.
fn read_message_at(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| HarvestError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| HarvestError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| HarvestError::io(path, e))?;
    Ok(buffer)
}

/// Skip the `From ` separator line (and a UTF-8 BOM) at the start of a message.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MESSAGES: &str = "From a@example.com Mon Jan 01 00:00:00 2024\n\
Subject: one\n\
\n\
body with >From escaped\n\
\n\
From b@example.com Tue Jan 02 00:00:00 2024\n\
Subject: two\n\
\n\
second body\n";

    fn write_archive(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.mbox");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(b"From user@example.com Thu Jan 01 00:00:00 2024\n"));
        assert!(!is_mbox_separator(b"from user@example.com\n"));
        assert!(!is_mbox_separator(b">From user@example.com\n"));
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_split_messages_offsets() {
        let (_dir, path) = write_archive(TWO_MESSAGES);
        let mut seen = Vec::new();
        let count = split_messages(&path, &mut |offset, raw| {
            seen.push((offset, raw.to_vec()));
        })
        .unwrap();

        assert_eq!(count, 2);
        let second_offset = TWO_MESSAGES.find("From b@").unwrap() as u64;
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[1].0, second_offset);
        assert!(seen[1].1.starts_with(b"From b@"));
        assert_eq!(
            seen[0].1.len() + seen[1].1.len(),
            TWO_MESSAGES.len(),
            "every byte belongs to exactly one message"
        );
    }

    #[test]
    fn test_skip_from_line() {
        let raw = b"From user@example.com Thu Jan 01\nSubject: Test\n\nBody";
        assert!(skip_from_line(raw).starts_with(b"Subject:"));
        let plain = b"Subject: Test\n\nBody";
        assert_eq!(skip_from_line(plain), plain);
    }

    #[test]
    fn test_messages_without_attachments_are_bare() {
        let (_dir, path) = write_archive(TWO_MESSAGES);
        let channel = ChannelId::Name(path.to_string_lossy().into_owned());
        let mut feed = MboxFeed::new(DocumentFilter::pdf());
        feed.connect(&channel).unwrap();

        let messages: Vec<FeedMessage> = feed
            .iterate(&channel, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1], "newest first");
        assert!(messages.iter().all(|m| m.attachment.is_none()));
    }

    #[test]
    fn test_iterate_requires_connect() {
        let feed = MboxFeed::new(DocumentFilter::pdf());
        let channel = ChannelId::Name("nowhere".into());
        assert!(matches!(feed.iterate(&channel, None), Err(HarvestError::Feed(_))));
    }

    #[test]
    fn test_connect_missing_archive() {
        let mut feed = MboxFeed::new(DocumentFilter::pdf());
        let channel = ChannelId::Name("/definitely/not/here".into());
        assert!(matches!(feed.connect(&channel), Err(HarvestError::Feed(_))));
    }
}
