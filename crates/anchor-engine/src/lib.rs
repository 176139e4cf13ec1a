pub mod canonical;
pub mod config;
pub mod error;
pub mod highlight;
pub mod locator;
pub mod markup;
pub mod render_index;
pub mod segments;
pub mod session;
pub mod staleness;

pub use canonical::{canonicalize, ingest, normalize_text, Canonicalized};
pub use config::{AnchoringConfig, EngineConfig, RenderConfig};
pub use error::AnchorError;
pub use highlight::{apply_segments, render_plain_html, MarkerAttrs, MarkerTarget};
pub use locator::{locate, Anchor, Locator};
pub use markup::{NodeId, RenderTree};
pub use render_index::{
    build_index, draft_from_selection, ManualFindingDraft, RenderRange, RenderSelection,
    RenderTextIndex, TreePoint,
};
pub use segments::{build_segments, Segment, SegmentWinner};
pub use session::{AnchorPass, AnchorSession, IndexScheduler, PassKey, RequestGate};
pub use staleness::{check_stale, StaleReason, StalenessReport};

use serde::{Deserialize, Serialize};
use shared_types::{CanonicalText, Finding, LocatedFinding};

/// Result of anchoring one finding set against one canonical text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReport {
    pub version_id: String,
    pub content_hash: String,
    pub located: Vec<LocatedFinding>,
    pub segments: Vec<Segment>,
    pub staleness: StalenessReport,
    /// Ids of findings that could not be placed in this text
    pub unlocated: Vec<String>,
    pub anchored_at: u64,
}

/// AnchorEngine entry point
pub struct AnchorEngine {
    config: EngineConfig,
}

impl AnchorEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn anchor(&self, canonical: &CanonicalText, findings: &[Finding]) -> AnchorReport {
        let located =
            Locator::new(&canonical.content, self.config.anchoring.clone()).locate_all(findings);
        let segments = build_segments(canonical.char_len(), &located);
        let staleness = StalenessReport::for_findings(findings, canonical);
        let unlocated: Vec<String> = located
            .iter()
            .filter(|l| !l.matched)
            .map(|l| l.finding.id.clone())
            .collect();

        tracing::debug!(
            "Anchored {} findings in version {}: {} segments, {} unlocated",
            findings.len(),
            canonical.version_id,
            segments.len(),
            unlocated.len()
        );

        AnchorReport {
            version_id: canonical.version_id.clone(),
            content_hash: canonical.content_hash.clone(),
            located,
            segments,
            staleness,
            unlocated,
            anchored_at: chrono::Utc::now().timestamp() as u64,
        }
    }

    /// Render the document with highlight markers.
    ///
    /// Rich documents keep their markup; if the rendered text does not line
    /// up with the canonical text the plain rendering is returned instead.
    pub fn highlight(&self, canonical: &CanonicalText, findings: &[Finding]) -> String {
        let report = self.anchor(canonical, findings);
        let marker_tag = &self.config.render.marker_tag;

        if let Some(rich) = &canonical.rich_content {
            let mut tree = RenderTree::parse(rich);
            let index = build_index(&tree);
            if index.matches(canonical) {
                match apply_segments(&mut tree, &index, &report.segments, marker_tag) {
                    Ok(applied) => {
                        tracing::debug!("Inserted {} markers into rendered content", applied);
                        return tree.to_markup();
                    }
                    Err(e) => {
                        tracing::warn!("Marker insertion failed, rendering plain text: {}", e)
                    }
                }
            } else {
                tracing::warn!(
                    "Rendered text ({} chars) does not match version {} ({} chars)",
                    index.len(),
                    canonical.version_id,
                    canonical.char_len()
                );
            }
        }

        render_plain_html(&canonical.content, &report.segments, marker_tag)
    }

    /// A memoizing session using this engine's anchoring settings
    pub fn session(&self) -> AnchorSession {
        AnchorSession::new(self.config.anchoring.clone())
    }

    /// A render index scheduler using this engine's settle delay
    pub fn scheduler(&self) -> (IndexScheduler, session::IndexReceiver) {
        IndexScheduler::new(self.config.render.settle_delay())
    }
}

impl Default for AnchorEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::{FindingSource, ReviewStatus, Severity};

    fn finding(id: &str, evidence: &str, severity: Severity, snapshot: &CanonicalText) -> Finding {
        Finding {
            id: id.to_string(),
            source: FindingSource::Automated,
            severity,
            confidence: 0.8,
            evidence_text: evidence.to_string(),
            excerpt: None,
            start_offset: None,
            end_offset: None,
            review_status: ReviewStatus::Violation,
            origin_snapshot_hash: snapshot.content_hash.clone(),
            origin_version_id: snapshot.version_id.clone(),
        }
    }

    #[test]
    fn test_engine_reports_unlocated_findings() {
        let engine = AnchorEngine::default();
        let text = ingest("v1", "Tenant waives notice. Deposit returned in 45 days.", None);
        let findings = vec![
            finding("waiver", "waives notice", Severity::Critical, &text),
            finding("gone", "late fee of $500", Severity::High, &text),
        ];

        let report = engine.anchor(&text, &findings);
        assert_eq!(report.version_id, "v1");
        assert_eq!(report.unlocated, vec!["gone".to_string()]);
        assert_eq!(report.located.len(), 2);
        assert!(!report.staleness.stale);
        assert_eq!(report.segments.iter().filter(|s| s.is_highlighted()).count(), 1);
    }

    #[test]
    fn test_engine_flags_stale_findings() {
        let engine = AnchorEngine::default();
        let old = ingest("v1", "Tenant waives notice.", None);
        let current = ingest("v2", "Tenant waives notice. Landlord agrees.", None);
        let stale = finding("w", "waives notice", Severity::High, &old);
        let report = engine.anchor(&current, &[stale]);

        assert!(report.staleness.stale);
        assert_eq!(report.staleness.reason, Some(StaleReason::VersionMismatch));
        // Stale findings still anchor
        assert!(report.unlocated.is_empty());
    }

    #[test]
    fn test_report_serializes_for_list_views() {
        let engine = AnchorEngine::default();
        let text = ingest("v1", "Tenant waives notice.", None);
        let report = engine.anchor(&text, &[finding("w", "notice", Severity::Medium, &text)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["located"][0]["strategy"], "relocated");
        assert_eq!(json["located"][0]["resolved_start"], 14);
        assert_eq!(json["segments"][1]["winner"]["severity"], "medium");
        assert_eq!(json["staleness"]["reason"], serde_json::Value::Null);
    }

    #[test]
    fn test_highlight_plain_document() {
        let engine = AnchorEngine::default();
        let text = ingest("v1", "Tenant  waives\nnotice.", None);
        let waiver = finding("w", "waives notice", Severity::High, &text);
        let html = engine.highlight(&text, &[waiver]);
        assert_eq!(
            html,
            "Tenant <mark data-finding-id=\"w\" data-severity=\"high\">waives notice</mark>."
        );
    }

    #[test]
    fn test_highlight_rich_document_keeps_markup() {
        let engine = AnchorEngine::default();
        let rich = "<p>Tenant <b>waives</b> notice.</p>";
        let text = ingest("v1", "", Some(rich));
        let waiver = finding("w", "waives notice", Severity::High, &text);
        let html = engine.highlight(&text, &[waiver]);
        assert_eq!(
            html,
            "<p>Tenant <mark data-finding-id=\"w\" data-severity=\"high\">\
             <b>waives</b> notice</mark>.</p>"
        );
    }

    #[test]
    fn test_highlight_uses_configured_marker_tag() {
        let config = EngineConfig::from_str("[render]\nmarker_tag = \"span\"\n").unwrap();
        let engine = AnchorEngine::new(config);
        let text = ingest("v1", "abc def", None);
        let html = engine.highlight(&text, &[finding("x", "def", Severity::Low, &text)]);
        assert!(html.starts_with("abc <span "));
        assert!(html.ends_with(">def</span>"));
    }
}
