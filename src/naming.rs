//! Local file naming: sanitized filenames, date buckets, and collision probing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};

/// Maximum length (in characters) of a sanitized filename.
pub const MAX_NAME_LEN: usize = 180;

/// Bucket used for messages that carry no timestamp.
pub const UNKNOWN_DATE_BUCKET: &str = "unknown-date";

/// Characters that are unsafe in filenames on at least one common platform.
const UNSAFE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitize a declared filename for local storage.
///
/// Trims surrounding whitespace, turns line breaks into spaces, replaces
/// filesystem-unsafe characters with `_`, and truncates to [`MAX_NAME_LEN`]
/// characters. May return an empty string; callers supply their own fallback.
pub fn safe_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            c if UNSAFE_CHARS.contains(&c) => '_',
            c => c,
        })
        .take(MAX_NAME_LEN)
        .collect()
}

/// Year-month directory name (`YYYY-MM`) for a message timestamp.
pub fn month_bucket(date: Option<&DateTime<Utc>>) -> String {
    match date {
        Some(d) => format!("{:04}-{:02}", d.year(), d.month()),
        None => UNKNOWN_DATE_BUCKET.to_string(),
    }
}

/// If `path` already exists, probe `stem (2).ext`, `stem (3).ext`, … until
/// a free name is found.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut i: u64 = 2;
    loop {
        let candidate = match &ext {
            Some(ext) => parent.join(format!("{stem} ({i}).{ext}")),
            None => parent.join(format!("{stem} ({i})")),
        };
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}
