//! Engine configuration
//!
//! TOML-based settings for anchoring and rendering. Every field has a default,
//! so an empty file (or no file) gives the standard behavior.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub anchoring: AnchoringConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use anchor_engine::config::EngineConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = EngineConfig::from_file("anchoring.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use anchor_engine::config::EngineConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = EngineConfig::from_str(r#"
    ///     [anchoring]
    ///     fuzzy_fallback = false
    /// "#)?;
    /// assert!(!config.anchoring.fuzzy_fallback);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }
}

/// How findings are re-anchored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoringConfig {
    /// Search for evidence text when stored offsets do not verify (default: true)
    #[serde(default = "default_true")]
    pub fuzzy_fallback: bool,
    /// Try the longer of the evidence candidates first (default: true)
    #[serde(default = "default_true")]
    pub prefer_longer_candidate: bool,
    /// Log unlocatable findings at warn instead of debug (default: false)
    #[serde(default)]
    pub warn_unlocated: bool,
}

impl Default for AnchoringConfig {
    fn default() -> Self {
        Self {
            fuzzy_fallback: true,
            prefer_longer_candidate: true,
            warn_unlocated: false,
        }
    }
}

/// Rendering behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Delay after a content swap before the render index is built (default: 50)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Element name used for highlight markers (default: "mark")
    #[serde(default = "default_marker_tag")]
    pub marker_tag: String,
}

impl RenderConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            marker_tag: default_marker_tag(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    50
}

fn default_marker_tag() -> String {
    "mark".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.anchoring.fuzzy_fallback);
        assert!(config.anchoring.prefer_longer_candidate);
        assert_eq!(config.render.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.render.marker_tag, "mark");
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_str(
            r#"
            [anchoring]
            prefer_longer_candidate = false
            warn_unlocated = true

            [render]
            marker_tag = "span"
            "#,
        )
        .unwrap();
        assert!(config.anchoring.fuzzy_fallback);
        assert!(!config.anchoring.prefer_longer_candidate);
        assert!(config.anchoring.warn_unlocated);
        assert_eq!(config.render.marker_tag, "span");
        assert_eq!(config.render.settle_delay_ms, 50);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let err = EngineConfig::from_str("[anchoring\nfuzzy_fallback = 1").unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = EngineConfig::from_file("/nonexistent/anchoring.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
