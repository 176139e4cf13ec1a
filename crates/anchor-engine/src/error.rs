use thiserror::Error;

use crate::markup::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    #[error("Offsets {start}..{end} out of range for text of length {len}")]
    OffsetsOutOfRange { start: usize, end: usize, len: usize },

    #[error("Unknown render node: {0:?}")]
    UnknownNode(NodeId),

    #[error("Render node {0:?} is not a text node")]
    NotText(NodeId),

    #[error("Offset {offset} is past the end of text node {node:?}")]
    PointOutOfRange { node: NodeId, offset: usize },

    #[error("Range end precedes range start")]
    InvertedRange,

    #[error("Render index does not match canonical text ({index_len} vs {canonical_len} chars)")]
    IndexMismatch {
        index_len: usize,
        canonical_len: usize,
    },
}
