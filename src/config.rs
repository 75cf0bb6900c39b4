//! StoryForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main StoryForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation provider configuration
    pub generator: GeneratorConfig,

    /// Parallel dispatch limits
    pub dispatch: DispatchConfig,

    /// Per-stage artifact count limits
    pub stages: StageLimits,

    /// Completeness rule minimums
    pub completeness: CompletenessConfig,
}

impl Config {
    /// Validate configuration before a run starts
    ///
    /// This is the only fatal error path in the pipeline: everything past
    /// this point degrades to fallback content instead of failing the run.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_workers == 0 {
            return Err(eyre::eyre!("dispatch.max-workers must be at least 1"));
        }
        if self.dispatch.requests_per_second == 0 {
            return Err(eyre::eyre!("dispatch.requests-per-second must be at least 1"));
        }
        if self.dispatch.unit_timeout_ms == 0 {
            return Err(eyre::eyre!("dispatch.unit-timeout-ms must be nonzero"));
        }
        if self.stages.max_features_per_epic == 0 || self.stages.max_stories_per_feature == 0 {
            return Err(eyre::eyre!("stage limits must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.completeness.acceptable_ratio) {
            return Err(eyre::eyre!("completeness.acceptable-ratio must be between 0.0 and 1.0"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .storyforge.yml
        let local_config = PathBuf::from(".storyforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/storyforge/storyforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("storyforge").join("storyforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Provider name (informational; the client trait is provider-agnostic)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Single-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }
}

/// Parallel dispatch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum simultaneous in-flight generation calls per stage
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// New calls admitted per sliding one-second window
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: u32,

    /// Retries per unit on timeout/unavailable errors
    #[serde(rename = "retry-bound")]
    pub retry_bound: u32,

    /// Absolute per-unit deadline in milliseconds
    ///
    /// Enforced by the dispatcher independent of the client's own timeout,
    /// so a stage never blocks on a stuck unit.
    #[serde(rename = "unit-timeout-ms")]
    pub unit_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            requests_per_second: 5,
            retry_bound: 2,
            unit_timeout_ms: 180_000,
        }
    }
}

/// Per-stage artifact count limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLimits {
    /// Features requested per epic
    #[serde(rename = "max-features-per-epic")]
    pub max_features_per_epic: usize,

    /// Stories requested per feature
    #[serde(rename = "max-stories-per-feature")]
    pub max_stories_per_feature: usize,

    /// Tasks requested per story
    #[serde(rename = "max-tasks-per-story")]
    pub max_tasks_per_story: usize,

    /// Test cases requested per story
    #[serde(rename = "max-test-cases-per-story")]
    pub max_test_cases_per_story: usize,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            max_features_per_epic: 4,
            max_stories_per_feature: 3,
            max_tasks_per_story: 3,
            max_test_cases_per_story: 2,
        }
    }
}

impl StageLimits {
    /// Records requested from one generation unit at the given stage
    pub fn records_for(&self, stage: crate::domain::StageKind) -> usize {
        match stage {
            crate::domain::StageKind::Epic => 1,
            crate::domain::StageKind::Feature => self.max_features_per_epic,
            crate::domain::StageKind::Story => self.max_stories_per_feature,
            crate::domain::StageKind::Task => self.max_tasks_per_story,
            crate::domain::StageKind::TestCase => self.max_test_cases_per_story,
        }
    }
}

/// Completeness rule minimums
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessConfig {
    /// Minimum stories per feature
    #[serde(rename = "min-stories-per-feature")]
    pub min_stories_per_feature: usize,

    /// Minimum tasks per story
    #[serde(rename = "min-tasks-per-story")]
    pub min_tasks_per_story: usize,

    /// Minimum test cases per story
    #[serde(rename = "min-test-cases-per-story")]
    pub min_test_cases_per_story: usize,

    /// Overall coverage ratio at which a run is reported acceptable
    /// without full remediation. Policy knob, intentionally configurable.
    #[serde(rename = "acceptable-ratio")]
    pub acceptable_ratio: f64,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        Self {
            min_stories_per_feature: 1,
            min_tasks_per_story: 1,
            min_test_cases_per_story: 2,
            acceptable_ratio: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.generator.provider, "anthropic");
        assert_eq!(config.dispatch.max_workers, 8);
        assert_eq!(config.completeness.acceptable_ratio, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.dispatch.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = Config::default();
        config.completeness.acceptable_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
generator:
  provider: anthropic
  model: claude-opus-4
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 8192
  timeout-ms: 60000

dispatch:
  max-workers: 4
  requests-per-second: 2
  retry-bound: 3
  unit-timeout-ms: 120000

stages:
  max-features-per-epic: 2
  max-stories-per-feature: 1

completeness:
  min-tasks-per-story: 3
  acceptable-ratio: 0.8
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.generator.model, "claude-opus-4");
        assert_eq!(config.dispatch.max_workers, 4);
        assert_eq!(config.dispatch.retry_bound, 3);
        assert_eq!(config.stages.max_features_per_epic, 2);
        assert_eq!(config.completeness.min_tasks_per_story, 3);
        assert_eq!(config.completeness.acceptable_ratio, 0.8);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
dispatch:
  max-workers: 2
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.dispatch.max_workers, 2);

        // Defaults for unspecified
        assert_eq!(config.dispatch.requests_per_second, 5);
        assert_eq!(config.generator.provider, "anthropic");
        assert_eq!(config.stages.max_stories_per_feature, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storyforge.yml");
        std::fs::write(&path, "dispatch:\n  max-workers: 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.dispatch.max_workers, 3);
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let path = PathBuf::from("/nonexistent/storyforge.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
