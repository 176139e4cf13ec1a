//! Per-document anchoring session
//!
//! Located findings and segments are recomputed only when one of the inputs
//! changes: the canonical text (by hash), the finding list (by fingerprint)
//! or the rendered content (by tree fingerprint). A pass computed against
//! inputs that have since changed is refused rather than applied.
//!
//! Fetches from collaborators go through a [`RequestGate`] so a slow,
//! superseded response never overwrites a newer one, and the render index is
//! built by an [`IndexScheduler`] only after rendered content has settled.

use sha2::{Digest, Sha256};
use shared_types::{CanonicalText, Finding, FindingSource, LocatedFinding};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AnchoringConfig;
use crate::locator::Locator;
use crate::markup::RenderTree;
use crate::render_index::{build_index, RenderRange, RenderTextIndex};
use crate::segments::{build_segments, Segment};

/// Identity of the inputs one pass was computed from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassKey {
    pub content_hash: String,
    pub findings_fingerprint: String,
    pub render_fingerprint: Option<String>,
}

impl PassKey {
    pub fn new(
        canonical: &CanonicalText,
        findings: &[Finding],
        index: Option<&RenderTextIndex>,
    ) -> Self {
        Self {
            content_hash: canonical.content_hash.clone(),
            findings_fingerprint: findings_fingerprint(findings),
            render_fingerprint: index.map(|i| i.render_fingerprint.clone()),
        }
    }
}

/// Digest over every field of a finding list. Located findings carry full
/// clones, so any change must produce a new pass.
pub fn findings_fingerprint(findings: &[Finding]) -> String {
    let mut hasher = Sha256::new();
    for f in findings {
        let source = match f.source {
            FindingSource::Automated => "automated",
            FindingSource::Dictionary => "dictionary",
            FindingSource::Manual => "manual",
        };
        for field in [
            f.id.as_str(),
            source,
            f.evidence_text.as_str(),
            f.excerpt.as_deref().unwrap_or(""),
            f.severity.as_str(),
            f.origin_snapshot_hash.as_str(),
            f.origin_version_id.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0x1fu8]);
        }
        hasher.update(f.start_offset.unwrap_or(-1).to_le_bytes());
        hasher.update(f.end_offset.unwrap_or(-1).to_le_bytes());
        hasher.update(f.confidence.to_bits().to_le_bytes());
        hasher.update([f.is_approved() as u8, 0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Everything one anchoring pass produces
#[derive(Debug, Clone)]
pub struct AnchorPass {
    pub key: PassKey,
    pub located: Vec<LocatedFinding>,
    pub segments: Vec<Segment>,
    /// Rendered ranges of highlighted segments, by segment position
    pub ranges: Vec<(usize, RenderRange)>,
}

impl AnchorPass {
    pub fn compute(
        canonical: &CanonicalText,
        findings: &[Finding],
        index: Option<&RenderTextIndex>,
        config: &AnchoringConfig,
    ) -> Self {
        let key = PassKey::new(canonical, findings, index);
        let located = Locator::new(&canonical.content, config.clone()).locate_all(findings);
        let segments = build_segments(canonical.char_len(), &located);
        let ranges = match index {
            Some(index) if index.matches(canonical) => segments
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_highlighted())
                .filter_map(|(i, s)| {
                    index
                        .range_from_offsets(s.start, s.end)
                        .ok()
                        .map(|r| (i, r))
                })
                .collect(),
            Some(index) => {
                tracing::warn!(
                    "Render index ({} chars) does not match version {} ({} chars); \
                     no highlights this pass",
                    index.len(),
                    canonical.version_id,
                    canonical.char_len()
                );
                Vec::new()
            }
            None => {
                tracing::debug!("No render index yet; no highlights this pass");
                Vec::new()
            }
        };

        Self {
            key,
            located,
            segments,
            ranges,
        }
    }

    pub fn unlocated(&self) -> impl Iterator<Item = &LocatedFinding> {
        self.located.iter().filter(|l| !l.matched)
    }
}

/// Memoized anchoring for one document view
#[derive(Debug, Default)]
pub struct AnchorSession {
    config: AnchoringConfig,
    current: Option<PassKey>,
    memo: Option<Arc<AnchorPass>>,
}

impl AnchorSession {
    pub fn new(config: AnchoringConfig) -> Self {
        Self {
            config,
            current: None,
            memo: None,
        }
    }

    /// The pass for these inputs, reusing the last one when nothing changed
    pub fn pass(
        &mut self,
        canonical: &CanonicalText,
        findings: &[Finding],
        index: Option<&RenderTextIndex>,
    ) -> Arc<AnchorPass> {
        let key = PassKey::new(canonical, findings, index);
        self.current = Some(key.clone());

        if let Some(memo) = self.memo.as_ref().filter(|m| m.key == key) {
            return Arc::clone(memo);
        }

        let pass = Arc::new(AnchorPass::compute(canonical, findings, index, &self.config));
        let unlocated = pass.unlocated().count();
        if unlocated > 0 {
            tracing::info!(
                "{} of {} findings unlocatable in version {}",
                unlocated,
                findings.len(),
                canonical.version_id
            );
        }
        self.memo = Some(Arc::clone(&pass));
        pass
    }

    /// Record the inputs now on screen without computing anything
    pub fn observe(&mut self, key: PassKey) {
        self.current = Some(key);
    }

    /// Accept a pass computed elsewhere, unless its inputs are no longer current
    pub fn commit(&mut self, pass: AnchorPass) -> Option<Arc<AnchorPass>> {
        if self.current.as_ref() != Some(&pass.key) {
            tracing::debug!("Discarding pass computed against superseded inputs");
            return None;
        }
        let pass = Arc::new(pass);
        self.memo = Some(Arc::clone(&pass));
        Some(pass)
    }

    pub fn latest(&self) -> Option<Arc<AnchorPass>> {
        self.memo.clone()
    }

    /// Drop memoized state, e.g. when navigating away
    pub fn discard(&mut self) {
        self.current = None;
        self.memo = None;
    }
}

/// Issued by [`RequestGate::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Latest-request-wins guard for collaborator fetches
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    generation: Arc<AtomicU64>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, superseding every earlier one
    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Supersede all outstanding requests without starting a new one
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Await `request` and keep its output only if no newer request began
    pub async fn run<F, T>(&self, ticket: RequestTicket, request: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let output = request.await;
        if self.is_current(ticket) {
            Some(output)
        } else {
            tracing::debug!("Discarding response for superseded request {}", ticket.0);
            None
        }
    }
}

/// Latest settled render index, `None` while content is settling
pub type IndexReceiver = watch::Receiver<Option<Arc<RenderTextIndex>>>;

/// Builds the render index a short, cancellable delay after each content swap.
///
/// Must be driven from inside a tokio runtime.
pub struct IndexScheduler {
    delay: Duration,
    sender: Arc<watch::Sender<Option<Arc<RenderTextIndex>>>>,
    pending: Option<JoinHandle<()>>,
    content_identity: Option<String>,
}

impl IndexScheduler {
    pub fn new(delay: Duration) -> (Self, IndexReceiver) {
        let (sender, receiver) = watch::channel(None);
        let scheduler = Self {
            delay,
            sender: Arc::new(sender),
            pending: None,
            content_identity: None,
        };
        (scheduler, receiver)
    }

    pub fn subscribe(&self) -> IndexReceiver {
        self.sender.subscribe()
    }

    /// Schedule a build for newly committed content. Identical content is a
    /// no-op; new content cancels any build still waiting.
    pub fn content_changed(&mut self, tree: RenderTree) {
        let identity = tree.fingerprint();
        if self.content_identity.as_deref() == Some(identity.as_str()) {
            return;
        }
        self.cancel();
        self.content_identity = Some(identity);
        self.sender.send_replace(None);

        let sender = Arc::clone(&self.sender);
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let index = build_index(&tree);
            sender.send_replace(Some(Arc::new(index)));
        }));
    }

    /// Abort a build that has not finished yet. The next
    /// [`content_changed`](Self::content_changed) rebuilds even for the same
    /// content.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.content_identity = None;
    }
}

impl Drop for IndexScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
