//! Engine configuration.
//!
//! Loaded from a RON file; every field has a default so a partial file (or
//! none at all) is fine:
//!
//! ```ron
//! (
//!     placeholder_text: "Generating...",
//!     pair_padding: 12.0,
//!     closing_delay_ms: 300,
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder content of a freshly generated inverse point.
pub const DEFAULT_PLACEHOLDER: &str = "Generating...";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Content of an inverse point until generation fills it in.
    pub placeholder_text: String,
    /// Inset of pair children inside their group.
    pub pair_padding: f64,
    /// Horizontal gap between the original and the inverse.
    pub pair_gap: f64,
    /// Assumed point width when laying out a new pair.
    pub point_width: f64,
    /// Wait before measuring a new pair's rendered heights.
    pub pair_height_delay_ms: u64,
    /// Length of the closing transition before a pair is removed.
    pub closing_delay_ms: u64,
    /// How long a leader waits on a remotely-initiated closing group before
    /// finishing the removal itself.
    pub closing_grace_ms: u64,
    /// Capacity of the document change stream.
    pub change_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            placeholder_text: DEFAULT_PLACEHOLDER.to_string(),
            pair_padding: 12.0,
            pair_gap: 24.0,
            point_width: 240.0,
            pair_height_delay_ms: 50,
            closing_delay_ms: 300,
            closing_grace_ms: 2_000,
            change_buffer: 1024,
        }
    }
}

impl EngineConfig {
    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a RON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.placeholder_text.is_empty() {
            return Err(ConfigError::Invalid("placeholder_text must not be empty".into()));
        }
        for (name, value) in [
            ("pair_padding", self.pair_padding),
            ("pair_gap", self.pair_gap),
            ("point_width", self.point_width),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be a non-negative number")));
            }
        }
        if self.change_buffer == 0 {
            return Err(ConfigError::Invalid("change_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn pair_height_delay(&self) -> Duration {
        Duration::from_millis(self.pair_height_delay_ms)
    }

    pub fn closing_delay(&self) -> Duration {
        Duration::from_millis(self.closing_delay_ms)
    }

    pub fn closing_grace(&self) -> Duration {
        Duration::from_millis(self.closing_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = EngineConfig::from_ron("(closing_delay_ms: 10, pair_padding: 8.0)").unwrap();
        assert_eq!(config.closing_delay(), Duration::from_millis(10));
        assert_eq!(config.pair_padding, 8.0);
        assert_eq!(config.placeholder_text, DEFAULT_PLACEHOLDER);
    }

    #[test]
    fn test_empty_ron_is_default() {
        assert_eq!(EngineConfig::from_ron("()").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_ron("(placeholder_text: \"\")"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron("(pair_gap: -1.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(EngineConfig::from_ron("(pair_gap: "), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");
        std::fs::write(&path, "(placeholder_text: \"Thinking...\")").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.placeholder_text, "Thinking...");
    }
}
