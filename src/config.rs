//! Host configuration for the dynamic-response core.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the dynamic-response core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DynamicConfig {
    /// Script engine settings
    #[serde(default)]
    pub scripts: ScriptSettings,
}

impl DynamicConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scripts.cache_entries == 0 {
            anyhow::bail!("scripts.cache_entries must be at least 1");
        }
        Ok(())
    }
}

/// Script engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSettings {
    /// Maximum number of compiled scripts held in the cache
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,

    /// Whether scripts referenced by mock definitions are compiled eagerly
    /// at load time, shifting compile latency out of the request path
    #[serde(default = "default_true")]
    pub precompile: bool,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            cache_entries: default_cache_entries(),
            precompile: true,
        }
    }
}

fn default_cache_entries() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DynamicConfig::default();
        assert_eq!(config.scripts.cache_entries, 20);
        assert!(config.scripts.precompile);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_script_settings() {
        let yaml = r#"
scripts:
  cache_entries: 50
  precompile: false
"#;
        let config: DynamicConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scripts.cache_entries, 50);
        assert!(!config.scripts.precompile);
    }

    #[test]
    fn test_partial_settings_take_defaults() {
        let yaml = r#"
scripts:
  cache_entries: 5
"#;
        let config: DynamicConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scripts.cache_entries, 5);
        assert!(config.scripts.precompile);
    }

    #[test]
    fn test_zero_cache_entries_rejected() {
        let yaml = r#"
scripts:
  cache_entries: 0
"#;
        let config: DynamicConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
scripts:
  cache_size: 10
"#;
        assert!(serde_yaml::from_str::<DynamicConfig>(yaml).is_err());
    }
}
