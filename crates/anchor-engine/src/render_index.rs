//! Render text index
//!
//! Maps character offsets of the normalized text back into the rendered tree
//! and forward from tree positions (user selections) into offsets. Built fresh
//! for each rendered content and never mutated; inserting highlight markers
//! changes the tree, not the offsets, so an index stays usable for applying
//! one batch of markers in reverse document order.

use shared_types::{CanonicalText, Finding, FindingSource, ReviewStatus, Severity};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::canonical::{collapse_whitespace, OffsetText};
use crate::error::AnchorError;
use crate::markup::{NodeId, NodeKind, RenderTree};

/// A position in the tree.
///
/// For a text node `offset` counts characters of its raw text; for an element
/// or the root it is a child index, as DOM selections report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TreePoint {
    pub node: NodeId,
    pub offset: usize,
}

impl TreePoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Concrete start and end references for one highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderRange {
    pub start: TreePoint,
    pub end: TreePoint,
}

/// A user selection; `focus` may come before `anchor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderSelection {
    pub anchor: TreePoint,
    pub focus: TreePoint,
}

/// Where one normalized character came from: leaf ordinal and the raw
/// character span inside that leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CharSource {
    leaf: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct NodeExtent {
    /// Ordinal of the leaf this node is (text nodes only)
    leaf: Option<usize>,
    /// First leaf ordinal after the node's subtree
    leaf_end: usize,
    /// First leaf ordinal at or after each child
    child_starts: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct RenderTextIndex {
    pub normalized_text: String,
    pub render_fingerprint: String,
    sources: Vec<CharSource>,
    leaves: Vec<NodeId>,
    leaf_lens: Vec<usize>,
    extents: Vec<Option<NodeExtent>>,
}

/// Walk the tree and index its text
pub fn build_index(tree: &RenderTree) -> RenderTextIndex {
    let mut builder = Builder {
        tree,
        leaves: Vec::new(),
        leaf_lens: Vec::new(),
        extents: vec![None; tree.len()],
        raw: Vec::new(),
    };
    builder.visit(tree.root());

    let collapsed = collapse_whitespace(builder.raw);
    let normalized_text: String = collapsed.iter().map(|(c, _)| *c).collect();
    let sources = collapsed.into_iter().map(|(_, source)| source).collect();

    tracing::debug!(
        "Built render index over {} leaves, {} chars",
        builder.leaves.len(),
        normalized_text.chars().count()
    );

    RenderTextIndex {
        normalized_text,
        render_fingerprint: tree.fingerprint(),
        sources,
        leaves: builder.leaves,
        leaf_lens: builder.leaf_lens,
        extents: builder.extents,
    }
}

struct Builder<'a> {
    tree: &'a RenderTree,
    leaves: Vec<NodeId>,
    leaf_lens: Vec<usize>,
    extents: Vec<Option<NodeExtent>>,
    raw: Vec<(char, CharSource)>,
}

impl Builder<'_> {
    fn visit(&mut self, root: NodeId) {
        let tree = self.tree;
        // First leaf ordinal at or after each node, filled on entry
        let mut starts = vec![0; tree.len()];
        let mut pending = vec![(root, false)];

        while let Some((id, exiting)) = pending.pop() {
            let node = tree.node(id);
            if exiting {
                self.extents[id.0] = Some(NodeExtent {
                    leaf: matches!(node.kind, NodeKind::Text(_)).then_some(starts[id.0]),
                    leaf_end: self.leaves.len(),
                    child_starts: node.children.iter().map(|c| starts[c.0]).collect(),
                });
                continue;
            }

            starts[id.0] = self.leaves.len();
            if let NodeKind::Text(text) = &node.kind {
                let ordinal = self.leaves.len();
                self.leaves.push(id);
                self.leaf_lens.push(text.chars().count());
                self.push_leaf_chars(text, ordinal);
            }
            pending.push((id, true));
            pending.extend(node.children.iter().rev().map(|c| (*c, false)));
        }
    }

    /// Compose per grapheme cluster so every output character can point back
    /// at the raw characters it came from
    fn push_leaf_chars(&mut self, text: &str, ordinal: usize) {
        let mut local = 0;
        for grapheme in text.graphemes(true) {
            let width = grapheme.chars().count();
            let source = CharSource {
                leaf: ordinal,
                start: local,
                end: local + width,
            };
            self.raw.extend(grapheme.nfc().map(|c| (c, source)));
            local += width;
        }
    }
}

impl RenderTextIndex {
    /// Length of the normalized text in characters
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Whether this index can carry offsets computed against `canonical`
    pub fn matches(&self, canonical: &CanonicalText) -> bool {
        self.normalized_text == canonical.content
    }

    /// Materialize `[start, end)` as tree positions
    pub fn range_from_offsets(
        &self,
        start: usize,
        end: usize,
    ) -> Result<RenderRange, AnchorError> {
        if start >= end || end > self.len() {
            return Err(AnchorError::OffsetsOutOfRange {
                start,
                end,
                len: self.len(),
            });
        }
        let first = self.sources[start];
        let last = self.sources[end - 1];
        Ok(RenderRange {
            start: TreePoint::new(self.leaves[first.leaf], first.start),
            end: TreePoint::new(self.leaves[last.leaf], last.end),
        })
    }

    /// Offsets of the normalized characters a selection covers.
    ///
    /// `None` for collapsed selections, selections over markup or whitespace
    /// only, and points the index does not know.
    pub fn offsets_from_selection(&self, selection: &RenderSelection) -> Option<(usize, usize)> {
        let anchor = self.point_key(&selection.anchor)?;
        let focus = self.point_key(&selection.focus)?;
        let (lo, hi) = if anchor <= focus {
            (anchor, focus)
        } else {
            (focus, anchor)
        };

        let start = self.sources.partition_point(|s| (s.leaf, s.end) <= lo);
        let end = self.sources.partition_point(|s| (s.leaf, s.start) < hi);
        (start < end).then_some((start, end))
    }

    /// Order key of a tree point: (leaf ordinal, raw char offset)
    fn point_key(&self, point: &TreePoint) -> Option<(usize, usize)> {
        let extent = self.extents.get(point.node.0)?.as_ref()?;
        match extent.leaf {
            Some(ordinal) => {
                (point.offset <= self.leaf_lens[ordinal]).then_some((ordinal, point.offset))
            }
            None => {
                let ordinal = match point.offset {
                    k if k < extent.child_starts.len() => extent.child_starts[k],
                    k if k == extent.child_starts.len() => extent.leaf_end,
                    _ => return None,
                };
                Some((ordinal, 0))
            }
        }
    }
}

/// Offsets and evidence for a manual finding, ready for the finding-creation
/// collaborator
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManualFindingDraft {
    pub evidence_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub origin_snapshot_hash: String,
    pub origin_version_id: String,
}

impl ManualFindingDraft {
    pub fn into_finding(self, id: impl Into<String>, severity: Severity) -> Finding {
        Finding {
            id: id.into(),
            source: FindingSource::Manual,
            severity,
            confidence: 1.0,
            evidence_text: self.evidence_text,
            excerpt: None,
            start_offset: i64::try_from(self.start_offset).ok(),
            end_offset: i64::try_from(self.end_offset).ok(),
            review_status: ReviewStatus::Violation,
            origin_snapshot_hash: self.origin_snapshot_hash,
            origin_version_id: self.origin_version_id,
        }
    }
}

/// Turn a user selection into a manual finding draft against `canonical`.
///
/// Returns `None` when the selection is empty or the index was not built from
/// content matching `canonical`.
pub fn draft_from_selection(
    index: &RenderTextIndex,
    canonical: &CanonicalText,
    selection: &RenderSelection,
) -> Option<ManualFindingDraft> {
    if !index.matches(canonical) {
        tracing::warn!(
            "Selection ignored: render index does not match version {}",
            canonical.version_id
        );
        return None;
    }
    let (start, end) = index.offsets_from_selection(selection)?;
    let evidence = OffsetText::new(&canonical.content).slice(start, end)?;
    Some(ManualFindingDraft {
        evidence_text: evidence.to_string(),
        start_offset: start,
        end_offset: end,
        origin_snapshot_hash: canonical.content_hash.clone(),
        origin_version_id: canonical.version_id.clone(),
    })
}
