//! Tests for argument parsing and the subcommands
//!
//! Command tests write their inputs to a temporary directory and run the
//! same loaders the binary uses.

use std::path::PathBuf;

use clap::Parser;
use pretty_assertions::assert_eq;

use super::commands::{self, DocumentInput};
use super::{Args, Command};
use anchor_engine::AnchorEngine;

const RICH: &str = "<p>Tenant hereby <em>waives</em> any right to notice.</p>";

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn findings_json(hash: &str) -> String {
    format!(
        r#"{{"findings": [
            {{"id": "waiver", "source": "automated", "severity": "critical",
              "evidence_text": "waives any right", "review_status": "violation",
              "origin_snapshot_hash": "{hash}", "origin_version_id": "v1"}},
            {{"id": "missing", "source": "dictionary", "severity": "low",
              "evidence_text": "late fee", "review_status": "violation",
              "origin_snapshot_hash": "{hash}", "origin_version_id": "v1"}}
        ]}}"#
    )
}

#[test]
fn test_parse_anchor_command() {
    let args = Args::try_parse_from([
        "anchor-cli",
        "anchor",
        "--rich",
        "doc.html",
        "--version-id",
        "v9",
        "-f",
        "findings.json",
        "--verbose",
    ])
    .unwrap();

    assert!(args.verbose);
    assert!(args.config.is_none());
    match args.command {
        Command::Anchor { document, findings } => {
            assert_eq!(document.version_id, "v9");
            assert_eq!(document.rich, Some(PathBuf::from("doc.html")));
            assert_eq!(document.text, None);
            assert_eq!(findings, PathBuf::from("findings.json"));
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_findings_required_for_highlight() {
    assert!(Args::try_parse_from(["anchor-cli", "highlight", "--text", "doc.txt"]).is_err());
}

#[tokio::test]
async fn test_document_needs_a_source() {
    let input = DocumentInput {
        version_id: "v1".to_string(),
        text: None,
        rich: None,
    };
    assert!(commands::load_document(&input).await.is_err());
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    let input = DocumentInput {
        version_id: "v1".to_string(),
        text: Some(PathBuf::from("/nonexistent/anchor-cli/doc.txt")),
        rich: None,
    };
    let err = commands::load_document(&input).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}

#[tokio::test]
async fn test_anchor_report_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let rich = write(&dir, "doc.html", RICH);
    let input = DocumentInput {
        version_id: "v1".to_string(),
        text: None,
        rich: Some(rich),
    };
    let canonical = commands::load_document(&input).await.unwrap();
    assert_eq!(canonical.content, "Tenant hereby waives any right to notice.");

    let findings_path = write(&dir, "findings.json", &findings_json(&canonical.content_hash));
    let findings = commands::load_findings(&findings_path).await.unwrap();
    assert_eq!(findings.len(), 2);

    let json = commands::anchor(&AnchorEngine::default(), &canonical, &findings).unwrap();
    let report: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(report["unlocated"], serde_json::json!(["missing"]));
    assert_eq!(report["staleness"]["stale"], serde_json::json!(false));
    assert_eq!(report["located"][0]["resolved_start"], serde_json::json!(14));
}

#[tokio::test]
async fn test_highlight_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write(&dir, "anchor.toml", "[render]\nmarker_tag = \"span\"\n");
    let config = commands::load_config(Some(&config_path)).await.unwrap();
    let engine = AnchorEngine::new(config);

    let input = DocumentInput {
        version_id: "v1".to_string(),
        text: None,
        rich: Some(write(&dir, "doc.html", RICH)),
    };
    let canonical = commands::load_document(&input).await.unwrap();
    let findings_path = write(&dir, "findings.json", &findings_json(&canonical.content_hash));
    let findings = commands::load_findings(&findings_path).await.unwrap();

    assert_eq!(
        commands::highlight(&engine, &canonical, &findings),
        "<p>Tenant hereby <span data-finding-id=\"waiver\" data-severity=\"critical\">\
         <em>waives</em> any right</span> to notice.</p>"
    );
}

#[tokio::test]
async fn test_bare_findings_list_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "list.json",
        r#"[{"id": "a", "source": "manual", "severity": "high", "evidence_text": "x",
             "review_status": "approved", "origin_snapshot_hash": "h", "origin_version_id": "v"}]"#,
    );
    let findings = commands::load_findings(&path).await.unwrap();
    assert_eq!(findings[0].id, "a");
    assert!(findings[0].is_approved());
}
