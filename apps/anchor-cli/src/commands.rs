//! Subcommand implementations
//!
//! Each command loads its inputs, runs the engine and returns the text to
//! print, so the binary only has to route arguments and write stdout.

use std::path::{Path, PathBuf};

use anchor_engine::{ingest, AnchorEngine, EngineConfig};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use shared_types::{CanonicalText, Finding};

/// Where a document's text comes from
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub version_id: String,
    pub text: Option<PathBuf>,
    pub rich: Option<PathBuf>,
}

/// Findings files hold either a bare list or `{ "findings": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FindingsFile {
    List(Vec<Finding>),
    Wrapped { findings: Vec<Finding> },
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let content = read(path).await?;
            EngineConfig::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

pub async fn load_document(input: &DocumentInput) -> Result<CanonicalText> {
    if input.text.is_none() && input.rich.is_none() {
        bail!("Provide --text, --rich, or both");
    }
    let raw = match &input.text {
        Some(path) => read(path).await?,
        None => String::new(),
    };
    let rich = match &input.rich {
        Some(path) => Some(read(path).await?),
        None => None,
    };

    let canonical = ingest(input.version_id.clone(), &raw, rich.as_deref());
    tracing::info!(
        "Loaded version {} ({} chars, hash {})",
        canonical.version_id,
        canonical.char_len(),
        &canonical.content_hash[..12]
    );
    Ok(canonical)
}

pub async fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    let content = read(path).await?;
    let file: FindingsFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid findings file {}", path.display()))?;
    let findings = match file {
        FindingsFile::List(findings) | FindingsFile::Wrapped { findings } => findings,
    };
    tracing::debug!("Loaded {} findings from {}", findings.len(), path.display());
    Ok(findings)
}

pub fn canonicalize(canonical: &CanonicalText) -> Result<String> {
    Ok(serde_json::to_string_pretty(canonical)?)
}

pub fn anchor(
    engine: &AnchorEngine,
    canonical: &CanonicalText,
    findings: &[Finding],
) -> Result<String> {
    let report = engine.anchor(canonical, findings);
    if let Some(banner) = report.staleness.banner() {
        tracing::warn!("{}", banner);
    }
    Ok(serde_json::to_string_pretty(&report)?)
}

pub fn highlight(
    engine: &AnchorEngine,
    canonical: &CanonicalText,
    findings: &[Finding],
) -> String {
    engine.highlight(canonical, findings)
}
