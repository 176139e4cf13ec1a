use std::cmp::Ordering;
use std::fmt;

/// One canonical plain-text snapshot of a document version.
///
/// `content` is the offset space every finding is expressed in. Offsets count
/// Unicode scalar values, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CanonicalText {
    pub version_id: String,
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_content: Option<String>,
}

impl CanonicalText {
    /// Length of the offset space in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_rich(&self) -> bool {
        self.rich_content.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    Automated,
    Dictionary,
    Manual,
}

/// Severity ordered from least to most severe, so `Critical > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Violation,
    Approved,
}

/// A validated half-open character range `[start_offset, end_offset)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextPosition {
    pub start_offset: usize,
    pub end_offset: usize,
}

impl TextPosition {
    /// Check `0 <= start < end <= len`, returning the range when it holds
    pub fn checked(start: Option<i64>, end: Option<i64>, len: usize) -> Option<Self> {
        let start = usize::try_from(start?).ok()?;
        let end = usize::try_from(end?).ok()?;
        (start < end && end <= len).then_some(Self {
            start_offset: start,
            end_offset: end,
        })
    }

    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset >= self.end_offset
    }
}

/// A flagged passage produced by analysis or manual entry.
///
/// Offsets are advisory: they were valid against the text identified by
/// `origin_snapshot_hash` and may be stale, or malformed, against the text
/// currently loaded.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub id: String,
    pub source: FindingSource,
    pub severity: Severity,
    #[serde(default)]
    pub confidence: f64,
    pub evidence_text: String,
    /// Secondary, legacy evidence candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub start_offset: Option<i64>,
    #[serde(default)]
    pub end_offset: Option<i64>,
    pub review_status: ReviewStatus,
    pub origin_snapshot_hash: String,
    pub origin_version_id: String,
}

impl Finding {
    pub fn is_approved(&self) -> bool {
        self.review_status == ReviewStatus::Approved
    }

    /// Overlap priority: any violation outranks any approved finding, then
    /// severity decides.
    pub fn priority_cmp(&self, other: &Finding) -> Ordering {
        let rank = |f: &Finding| (!f.is_approved(), f.severity);
        rank(self).cmp(&rank(other))
    }

    /// Stored offsets, if they are structurally valid for a text of `len` chars
    pub fn recorded_position(&self, len: usize) -> Option<TextPosition> {
        TextPosition::checked(self.start_offset, self.end_offset, len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStrategy {
    /// Stored offsets verified against the evidence text
    Exact,
    /// Found again by searching for the evidence text
    Relocated,
}

/// A finding resolved against the current canonical text. Never persisted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocatedFinding {
    pub finding: Finding,
    pub resolved_start: usize,
    pub resolved_end: usize,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<AnchorStrategy>,
}

impl LocatedFinding {
    pub fn unlocated(finding: Finding) -> Self {
        Self {
            finding,
            resolved_start: 0,
            resolved_end: 0,
            matched: false,
            strategy: None,
        }
    }

    /// Resolved range, only for matched findings with a non-empty span
    pub fn position(&self) -> Option<TextPosition> {
        (self.matched && self.resolved_start < self.resolved_end).then_some(TextPosition {
            start_offset: self.resolved_start,
            end_offset: self.resolved_end,
        })
    }
}
