//! Highlight rendering
//!
//! Plain documents render as alternating plain and marked spans. Rich
//! documents get markers inserted into the rendered tree: an open and a close
//! marker at the range boundaries, then every sibling between them moves under
//! the open marker. Wrapping in place cannot handle ranges that cross element
//! boundaries; splitting up to the common ancestor and reparenting can.

use shared_types::Severity;

use crate::canonical::OffsetText;
use crate::error::AnchorError;
use crate::markup::{NodeId, RenderTree};
use crate::render_index::{RenderRange, RenderTextIndex};
use crate::segments::{Segment, SegmentWinner};

/// What an open marker carries for styling and interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerAttrs {
    pub tag: String,
    pub finding_id: String,
    pub severity: Severity,
}

impl MarkerAttrs {
    pub fn for_winner(tag: &str, winner: &SegmentWinner) -> Self {
        Self {
            tag: tag.to_string(),
            finding_id: winner.finding_id.clone(),
            severity: winner.severity,
        }
    }

    fn attribute_text(&self) -> String {
        format!(
            "data-finding-id=\"{}\" data-severity=\"{}\"",
            escape_html(&self.finding_id),
            self.severity
        )
    }
}

/// A rendered view that can take highlight markers
pub trait MarkerTarget {
    /// Mark `range` as one highlight
    fn insert_marker_range(
        &mut self,
        range: &RenderRange,
        attrs: &MarkerAttrs,
    ) -> Result<(), AnchorError>;
}

impl MarkerTarget for RenderTree {
    fn insert_marker_range(
        &mut self,
        range: &RenderRange,
        attrs: &MarkerAttrs,
    ) -> Result<(), AnchorError> {
        self.wrap_range(range, attrs).map(|_| ())
    }
}

impl RenderTree {
    /// Wrap a range in a marker element and return the marker.
    ///
    /// Both points must be in text nodes, with the start before the end of
    /// its node and the end past the start of its node.
    pub fn wrap_range(
        &mut self,
        range: &RenderRange,
        attrs: &MarkerAttrs,
    ) -> Result<NodeId, AnchorError> {
        let (start_leaf, end_leaf) = (range.start.node, range.end.node);
        let start_len = self
            .text(start_leaf)
            .ok_or(AnchorError::NotText(start_leaf))?
            .chars()
            .count();
        self.text(end_leaf).ok_or(AnchorError::NotText(end_leaf))?;

        if range.start.offset >= start_len {
            return Err(AnchorError::PointOutOfRange {
                node: start_leaf,
                offset: range.start.offset,
            });
        }
        if range.end.offset == 0 {
            return Err(AnchorError::PointOutOfRange {
                node: end_leaf,
                offset: 0,
            });
        }
        if start_leaf == end_leaf && range.start.offset >= range.end.offset {
            return Err(AnchorError::InvertedRange);
        }

        self.split_text(end_leaf, range.end.offset)?;
        let first = self
            .split_text(start_leaf, range.start.offset)?
            .unwrap_or(start_leaf);
        let last = if start_leaf == end_leaf { first } else { end_leaf };

        let lca = self.common_parent(first, last);
        let top_last = self.lift_end(last, lca)?;
        let top_first = self.lift_start(first, lca)?;

        let (_, i) = self
            .position_in_parent(top_first)
            .ok_or(AnchorError::UnknownNode(top_first))?;
        let (_, j) = self
            .position_in_parent(top_last)
            .ok_or(AnchorError::UnknownNode(top_last))?;
        if j < i {
            return Err(AnchorError::InvertedRange);
        }

        let open = self.insert_element(lca, i, &attrs.tag, attrs.attribute_text());
        let close = self.insert_element(lca, j + 2, &attrs.tag, String::new());
        self.reparent_children(lca, i + 1..j + 2, open);
        self.detach(close);
        Ok(open)
    }

    /// Lowest node that is a parent-or-above of both `a` and `b`
    fn common_parent(&self, a: NodeId, b: NodeId) -> NodeId {
        let above_b = self.ancestors(b);
        self.ancestors(a)
            .into_iter()
            .skip(1)
            .find(|id| above_b[1..].contains(id))
            .unwrap_or_else(|| self.root())
    }

    /// Split ancestors so `node` starts a child of `lca`; returns that child
    fn lift_start(&mut self, node: NodeId, lca: NodeId) -> Result<NodeId, AnchorError> {
        let mut node = node;
        loop {
            let (parent, index) = self
                .position_in_parent(node)
                .ok_or(AnchorError::UnknownNode(node))?;
            if parent == lca {
                return Ok(node);
            }
            node = if index > 0 {
                self.split_element(parent, index)?
            } else {
                parent
            };
        }
    }

    /// Split ancestors so `node` ends a child of `lca`; returns that child
    fn lift_end(&mut self, node: NodeId, lca: NodeId) -> Result<NodeId, AnchorError> {
        let mut node = node;
        loop {
            let (parent, index) = self
                .position_in_parent(node)
                .ok_or(AnchorError::UnknownNode(node))?;
            if parent == lca {
                return Ok(node);
            }
            if index + 1 < self.node(parent).children.len() {
                self.split_element(parent, index + 1)?;
            }
            node = parent;
        }
    }
}

/// Insert a marker for every won segment. Returns how many were inserted.
///
/// Segments are applied last to first: splitting only ever moves content
/// after a split point, so the ranges of earlier segments stay valid.
pub fn apply_segments<T: MarkerTarget>(
    target: &mut T,
    index: &RenderTextIndex,
    segments: &[Segment],
    marker_tag: &str,
) -> Result<usize, AnchorError> {
    let mut applied = 0;
    for segment in segments.iter().rev() {
        let Some(winner) = &segment.winner else {
            continue;
        };
        let range = index.range_from_offsets(segment.start, segment.end)?;
        target.insert_marker_range(&range, &MarkerAttrs::for_winner(marker_tag, winner))?;
        applied += 1;
    }
    Ok(applied)
}

/// One run of plain text and the finding that owns it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainSpan<'a> {
    pub text: &'a str,
    pub winner: Option<&'a SegmentWinner>,
}

/// Slice `text` along the segments
pub fn render_plain<'a>(text: &'a str, segments: &'a [Segment]) -> Vec<PlainSpan<'a>> {
    let view = OffsetText::new(text);
    segments
        .iter()
        .filter_map(|segment| {
            let slice = view.slice(segment.start, segment.end);
            if slice.is_none() {
                tracing::debug!(
                    "Segment {}..{} outside text of {} chars",
                    segment.start,
                    segment.end,
                    view.len()
                );
            }
            Some(PlainSpan {
                text: slice?,
                winner: segment.winner.as_ref(),
            })
        })
        .collect()
}

/// Plain text as escaped HTML with one marker element per won segment
pub fn render_plain_html(text: &str, segments: &[Segment], marker_tag: &str) -> String {
    let mut out = String::with_capacity(text.len() + segments.len() * 48);
    for span in render_plain(text, segments) {
        match span.winner {
            Some(winner) => {
                let attrs = MarkerAttrs::for_winner(marker_tag, winner);
                out.push_str(&format!(
                    "<{tag} {}>{}</{tag}>",
                    attrs.attribute_text(),
                    escape_html(span.text),
                    tag = marker_tag
                ));
            }
            None => out.push_str(&escape_html(span.text)),
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
