//! Parsing of rendered comment rows.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// `author:` or `author：` at the start of the row.
static AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^:：\n]+?)\s*[:：]").expect("author pattern is valid"));

/// `[YY-]MM-DD HH:MM` or `HH:MM` as a standalone token.
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:\d{2,4}-)?\d{1,2}-\d{1,2}\s+)?\d{1,2}:\d{1,2}\b")
        .expect("timestamp pattern is valid")
});

/// The three textual fields of a comment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedComment {
    pub display_name: String,
    pub content: String,
    pub raw_timestamp: String,
}

impl ParsedComment {
    /// Stable identity of the comment within a thread.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.display_name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.content.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.raw_timestamp.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Parse a comment row's visible text.
///
/// The row reads `author: content timestamp`, optionally followed by more
/// text (location, reply controls). The timestamp is the last date/time
/// token on the row, so times mentioned inside the content stay in it.
/// Rows with an empty field do not match.
#[must_use]
pub fn parse_comment(text: &str) -> Option<ParsedComment> {
    let author = AUTHOR_RE.captures(text)?;
    let display_name = author.get(1)?.as_str().trim();
    let rest = &text[author.get(0)?.end()..];

    let timestamp = TIMESTAMP_RE.find_iter(rest).last()?;
    let content = rest[..timestamp.start()].trim();
    if display_name.is_empty() || content.is_empty() {
        return None;
    }

    Some(ParsedComment {
        display_name: display_name.to_string(),
        content: content.to_string(),
        raw_timestamp: timestamp.as_str().trim().to_string(),
    })
}
