//! Staleness detection
//!
//! Compares the snapshot a finding was computed against with the snapshot on
//! screen. The result only drives a warning banner; anchoring still runs.

use serde::{Deserialize, Serialize};
use shared_types::{CanonicalText, Finding};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    VersionMismatch,
    HashMismatch,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::VersionMismatch => f.write_str("version mismatch"),
            StaleReason::HashMismatch => f.write_str("hash mismatch"),
        }
    }
}

/// True if either the version id or the content hash differs
pub fn check_stale(
    origin_hash: &str,
    origin_version_id: &str,
    current_hash: &str,
    current_version_id: &str,
) -> bool {
    stale_reason(origin_hash, origin_version_id, current_hash, current_version_id).is_some()
}

/// Why a snapshot is stale. A version mismatch is reported ahead of a hash
/// mismatch.
pub fn stale_reason(
    origin_hash: &str,
    origin_version_id: &str,
    current_hash: &str,
    current_version_id: &str,
) -> Option<StaleReason> {
    if origin_version_id != current_version_id {
        Some(StaleReason::VersionMismatch)
    } else if origin_hash != current_hash {
        Some(StaleReason::HashMismatch)
    } else {
        None
    }
}

/// Banner state for one finding set against the loaded text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessReport {
    pub stale: bool,
    pub reason: Option<StaleReason>,
    pub stale_findings: usize,
    pub total_findings: usize,
}

impl StalenessReport {
    pub fn for_findings(findings: &[Finding], current: &CanonicalText) -> Self {
        let reasons: Vec<StaleReason> = findings
            .iter()
            .filter_map(|f| {
                stale_reason(
                    &f.origin_snapshot_hash,
                    &f.origin_version_id,
                    &current.content_hash,
                    &current.version_id,
                )
            })
            .collect();

        // Any version mismatch dominates the banner reason
        let reason = reasons
            .iter()
            .copied()
            .find(|r| *r == StaleReason::VersionMismatch)
            .or_else(|| reasons.first().copied());

        if let Some(reason) = reason {
            tracing::warn!(
                "{} of {} findings were computed against another snapshot ({})",
                reasons.len(),
                findings.len(),
                reason
            );
        }

        Self {
            stale: !reasons.is_empty(),
            reason,
            stale_findings: reasons.len(),
            total_findings: findings.len(),
        }
    }

    /// Text for the non-blocking banner, if one should be shown
    pub fn banner(&self) -> Option<String> {
        let reason = self.reason?;
        Some(format!(
            "Highlights may be out of date ({reason}): {} of {} findings were computed \
             against a different version of this document.",
            self.stale_findings, self.total_findings
        ))
    }
}
