//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{FormsError, Result};

/// Form engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Structural limits applied to schemas and submissions
    pub limits: FormLimits,
    /// Placeholder option shown first in select widgets
    pub select_empty_label: String,
    /// Labels for boolean radio/select options
    pub boolean_labels: BooleanLabels,
    /// Target length for truncated rich-text summaries
    pub summary_split_at: usize,
    /// `maxLength` above which a string renders as a text area
    pub long_text_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: FormLimits::default(),
            select_empty_label: "- Select -".into(),
            boolean_labels: BooleanLabels::default(),
            summary_split_at: 600,
            long_text_threshold: 255,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| FormsError::Config(e.to_string()))
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| FormsError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Structural limits for untrusted schemas and submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormLimits {
    /// Maximum nesting depth of schema nodes and submitted values. Every
    /// path segment counts, so `tasks[0]--title` is three deep.
    pub max_depth: usize,
    /// Maximum number of properties across a whole schema
    pub max_keys: usize,
    /// Maximum array length (and highest submitted array index + 1)
    pub max_array_items: usize,
    /// Validation messages are cut to this many chars
    pub max_message_len: usize,
}

impl Default for FormLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_keys: 1000,
            max_array_items: 1000,
            max_message_len: 500,
        }
    }
}

/// Display labels for boolean options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanLabels {
    pub yes: String,
    pub no: String,
}

impl Default for BooleanLabels {
    fn default() -> Self {
        Self {
            yes: "Yes".into(),
            no: "No".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "limits": { "max_depth": 4 }, "summary_split_at": 120 }"#)
                .unwrap();
        assert_eq!(config.limits.max_depth, 4);
        assert_eq!(config.limits.max_keys, 1000);
        assert_eq!(config.summary_split_at, 120);
        assert_eq!(config.select_empty_label, "- Select -");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("grants-forms-{}.json", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.long_text_threshold = 500;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            EngineConfig::load("/nonexistent/grants-forms.json"),
            Err(FormsError::Io(_))
        ));
    }
}
