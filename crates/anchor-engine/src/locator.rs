//! Anchor locator
//!
//! Resolves each finding's span in the current canonical text:
//!
//! 1. Structural check of the stored offsets (absent or malformed offsets skip
//!    straight to search)
//! 2. Exact verification: the stored range, normalized, must equal the
//!    normalized evidence text
//! 3. Fuzzy fallback: search the text for the evidence candidates, longest
//!    first
//! 4. Disambiguation: among several occurrences, take the one starting
//!    closest to the stored start offset
//!
//! Re-anchoring is a heuristic. After heavy rewrites the nearest occurrence
//! can be the wrong one; nothing here tries to detect that.

use shared_types::{AnchorStrategy, Finding, LocatedFinding};

use crate::canonical::{normalize_text, OffsetText};
use crate::config::AnchoringConfig;

/// A resolved span in the current text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub start: usize,
    pub end: usize,
    pub matched: bool,
    pub strategy: AnchorStrategy,
}

/// Locate one finding with the default configuration.
///
/// `None` means the finding cannot be placed in this text; it is not an error.
pub fn locate(text: &str, finding: &Finding) -> Option<Anchor> {
    Locator::new(text, AnchoringConfig::default()).locate(finding)
}

/// Locates findings against one canonical text
pub struct Locator<'a> {
    text: OffsetText<'a>,
    config: AnchoringConfig,
}

impl<'a> Locator<'a> {
    pub fn new(text: &'a str, config: AnchoringConfig) -> Self {
        Self {
            text: OffsetText::new(text),
            config,
        }
    }

    pub fn locate(&self, finding: &Finding) -> Option<Anchor> {
        let evidence = normalize_text(&finding.evidence_text);

        if let Some(anchor) = self.verify_exact(finding, &evidence) {
            return Some(anchor);
        }
        if !self.config.fuzzy_fallback {
            return None;
        }

        let excerpt = finding.excerpt.as_deref().map(normalize_text);
        let mut candidates: Vec<&str> = std::iter::once(evidence.as_str())
            .chain(excerpt.as_deref())
            .filter(|c| !c.is_empty())
            .collect();
        candidates.dedup();
        if self.config.prefer_longer_candidate {
            // Stable, so equal lengths keep evidence before excerpt
            candidates.sort_by_key(|c| std::cmp::Reverse(c.chars().count()));
        }

        candidates
            .into_iter()
            .find_map(|candidate| self.search(candidate, finding.start_offset))
    }

    fn verify_exact(&self, finding: &Finding, evidence: &str) -> Option<Anchor> {
        if evidence.is_empty() {
            return None;
        }
        let position = finding.recorded_position(self.text.len())?;
        let slice = self
            .text
            .slice(position.start_offset, position.end_offset)?;
        (normalize_text(slice) == evidence).then_some(Anchor {
            start: position.start_offset,
            end: position.end_offset,
            matched: true,
            strategy: AnchorStrategy::Exact,
        })
    }

    fn search(&self, candidate: &str, recorded_start: Option<i64>) -> Option<Anchor> {
        let hits = self.text.find_all(candidate);
        let start = match recorded_start {
            Some(recorded) => hits
                .into_iter()
                .min_by_key(|hit| (*hit as i64).abs_diff(recorded))?,
            None => hits.into_iter().next()?,
        };
        Some(Anchor {
            start,
            end: start + candidate.chars().count(),
            matched: true,
            strategy: AnchorStrategy::Relocated,
        })
    }

    /// Locate every finding. Unlocatable findings stay in the output with
    /// `matched == false` so list views can still show them.
    pub fn locate_all(&self, findings: &[Finding]) -> Vec<LocatedFinding> {
        findings
            .iter()
            .map(|finding| match self.locate(finding) {
                Some(anchor) => {
                    if anchor.strategy == AnchorStrategy::Relocated {
                        tracing::debug!(
                            "Relocated finding {} to {}..{}",
                            finding.id,
                            anchor.start,
                            anchor.end
                        );
                    }
                    LocatedFinding {
                        finding: finding.clone(),
                        resolved_start: anchor.start,
                        resolved_end: anchor.end,
                        matched: anchor.matched,
                        strategy: Some(anchor.strategy),
                    }
                }
                None => {
                    if self.config.warn_unlocated {
                        tracing::warn!("Finding {} could not be located", finding.id);
                    } else {
                        tracing::debug!("Finding {} could not be located", finding.id);
                    }
                    LocatedFinding::unlocated(finding.clone())
                }
            })
            .collect()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{FindingSource, ReviewStatus, Severity};

    fn finding_at(evidence: &str, start: usize, end: usize) -> Finding {
        Finding {
            id: "p".to_string(),
            source: FindingSource::Dictionary,
            severity: Severity::Medium,
            confidence: 0.5,
            evidence_text: evidence.to_string(),
            excerpt: None,
            start_offset: Some(start as i64),
            end_offset: Some(end as i64),
            review_status: ReviewStatus::Violation,
            origin_snapshot_hash: "h".to_string(),
            origin_version_id: "v".to_string(),
        }
    }

    proptest! {
        /// Property: a finding whose offsets slice its evidence exactly is kept as-is
        #[test]
        fn exact_offsets_round_trip(
            words in prop::collection::vec("[a-z]{1,8}", 3..20),
            a in 0usize..100,
            b in 0usize..100,
        ) {
            let text = words.join(" ");
            let len = text.chars().count();
            let (start, end) = (a % len, b % len);
            prop_assume!(start < end);
            let evidence: String = text.chars().skip(start).take(end - start).collect();
            prop_assume!(!evidence.trim().is_empty());
            let anchor = locate(&text, &finding_at(&evidence, start, end)).unwrap();
            prop_assert_eq!((anchor.start, anchor.end), (start, end));
            prop_assert_eq!(anchor.strategy, AnchorStrategy::Exact);
        }

        /// Property: a unique passage survives any prefix insertion
        #[test]
        fn prefix_insertion_shifts_unique_evidence(
            prefix in "[A-Y]{1,30}",
            tail in "[a-z ]{0,40}",
        ) {
            let text = format!("start ZZQQZZ{tail}");
            let finding = finding_at("ZZQQZZ", 6, 12);
            let shifted = format!("{prefix} {text}");
            let anchor = locate(&shifted, &finding).unwrap();
            let shift = prefix.chars().count() + 1;
            prop_assert_eq!((anchor.start, anchor.end), (6 + shift, 12 + shift));
        }
    }
}
