//! Segment builder and overlap resolver
//!
//! Partitions `[0, len)` into maximal runs that share one winning finding.
//! Where findings overlap, the winner is chosen by:
//!
//! 1. any violation over any approved finding
//! 2. higher severity
//! 3. earlier resolved start
//! 4. earlier position in the input
//!
//! Winners are assigned per character only over the spans findings cover,
//! then equal neighbors are coalesced.

use serde::{Deserialize, Serialize};
use shared_types::{LocatedFinding, ReviewStatus, Severity};
use std::cmp::Ordering;

/// The finding that owns a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWinner {
    /// Position of the finding in the located list
    pub index: usize,
    pub finding_id: String,
    pub severity: Severity,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub winner: Option<SegmentWinner>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn is_highlighted(&self) -> bool {
        self.winner.is_some()
    }
}

/// Whether `challenger` takes a character away from `holder`
fn outranks(challenger: &LocatedFinding, holder: &LocatedFinding) -> bool {
    match challenger.finding.priority_cmp(&holder.finding) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => challenger.resolved_start < holder.resolved_start,
    }
}

/// Partition a text of `text_len` characters among the located findings.
///
/// Unmatched findings are skipped; ranges past the end of the text are
/// clipped. An empty text yields no segments.
pub fn build_segments(text_len: usize, located: &[LocatedFinding]) -> Vec<Segment> {
    let mut owners: Vec<Option<usize>> = vec![None; text_len];

    for (index, candidate) in located.iter().enumerate() {
        let Some(position) = candidate.position() else {
            continue;
        };
        let end = position.end_offset.min(text_len);
        for owner in &mut owners[position.start_offset.min(end)..end] {
            let takes = match *owner {
                Some(current) => outranks(candidate, &located[current]),
                None => true,
            };
            if takes {
                *owner = Some(index);
            }
        }
    }

    let mut segments = Vec::new();
    let mut start = 0;
    while start < text_len {
        let current = owners[start];
        let mut end = start + 1;
        while end < text_len && owners[end] == current {
            end += 1;
        }
        segments.push(Segment {
            start,
            end,
            winner: current.map(|index| {
                let finding = &located[index].finding;
                SegmentWinner {
                    index,
                    finding_id: finding.id.clone(),
                    severity: finding.severity,
                    review_status: finding.review_status,
                }
            }),
        });
        start = end;
    }

    segments
}
