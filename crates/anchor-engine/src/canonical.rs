//! Text canonicalization
//!
//! Produces the one normalized text snapshot every finding offset refers to.
//! The normalization rule is NFC, then every run of whitespace (line breaks
//! included) collapses to a single space, then leading and trailing
//! whitespace is trimmed. The render index applies the same rule through
//! [`collapse_whitespace`], so the two never disagree on what one character is.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use shared_types::CanonicalText;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// A tag runs from `<` to the next `>`. The markup tokenizer uses the same rule.
    static ref TAG_PATTERN: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Output of [`canonicalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonicalized {
    pub content: String,
    pub content_hash: String,
}

/// Derive the canonical text and its hash.
///
/// When `rich` is supplied the text comes from the rich content with markup
/// stripped, not from `raw`, so it matches what the rendered view shows.
pub fn canonicalize(raw: &str, rich: Option<&str>) -> Canonicalized {
    let content = match rich {
        Some(rich) => normalize_text(&strip_markup(rich)),
        None => normalize_text(raw),
    };
    let content_hash = hash_content(&content);
    Canonicalized {
        content,
        content_hash,
    }
}

/// Apply the normalization rule to `text`
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    collapse_whitespace(composed.chars().map(|c| (c, ())))
        .into_iter()
        .map(|(c, _)| c)
        .collect()
}

/// Collapse whitespace runs to one space and trim both ends.
///
/// Each kept character carries its payload along. A collapsed space takes the
/// payload of the first whitespace character of its run.
pub fn collapse_whitespace<T, I>(chars: I) -> Vec<(char, T)>
where
    I: IntoIterator<Item = (char, T)>,
{
    let mut out = Vec::new();
    let mut pending: Option<T> = None;

    for (c, payload) in chars {
        if c.is_whitespace() {
            if !out.is_empty() && pending.is_none() {
                pending = Some(payload);
            }
            continue;
        }
        if let Some(space) = pending.take() {
            out.push((' ', space));
        }
        out.push((c, payload));
    }

    out
}

/// Remove tags, keeping every other character exactly as written
pub fn strip_markup(rich: &str) -> String {
    TAG_PATTERN.replace_all(rich, "").into_owned()
}

/// Lowercase hex SHA-256 of the canonical text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a full snapshot for one document version
pub fn ingest(version_id: impl Into<String>, raw: &str, rich: Option<&str>) -> CanonicalText {
    let Canonicalized {
        content,
        content_hash,
    } = canonicalize(raw, rich);
    tracing::debug!(
        "Canonicalized version with {} chars, hash {}",
        content.chars().count(),
        &content_hash[..12]
    );
    CanonicalText {
        version_id: version_id.into(),
        content,
        content_hash,
        rich_content: rich.map(str::to_string),
    }
}

/// Character-offset view over a text.
///
/// Keeps the byte position of every character boundary so char offsets can be
/// sliced and searched without rescanning.
#[derive(Debug, Clone)]
pub struct OffsetText<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
}

impl<'a> OffsetText<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { text, boundaries }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice by character offsets, `None` if out of range
    pub fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        if start > end || end > self.len() {
            return None;
        }
        Some(&self.text[self.boundaries[start]..self.boundaries[end]])
    }

    /// Character offset of a byte position on a char boundary
    pub fn char_offset(&self, byte: usize) -> usize {
        self.boundaries.partition_point(|&b| b < byte)
    }

    /// Start offsets (in chars) of every occurrence of `needle`, overlapping
    /// occurrences included
    pub fn find_all(&self, needle: &str) -> Vec<usize> {
        let mut hits = Vec::new();
        if needle.is_empty() {
            return hits;
        }
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(needle) {
            let byte = from + pos;
            let offset = self.char_offset(byte);
            hits.push(offset);
            from = self.boundaries[offset + 1];
        }
        hits
    }
}
