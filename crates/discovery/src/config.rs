//! Discovery configuration
//!
//! One YAML-loadable document covering every pipeline knob. Each section
//! maps onto the corresponding component's own config type; everything
//! defaults to the values the pipeline ships with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use clip_common::{PipelineError, Result};
use clip_embeddings::EmbeddingConfig;
use clip_resource::ResourceLimits;
use clip_scoring::HeuristicWeights;
use clip_segmentation::SegmenterConfig;
use clip_selection::SelectionPolicies;

/// Scorer and LLM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerSettings {
    pub weights: HeuristicWeights,
    pub llm_enabled: bool,
    pub llm_model: String,
    pub llm_timeout_s: u64,
    /// Candidates the LLM re-ranks
    pub llm_top_k: usize,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            weights: HeuristicWeights::default(),
            llm_enabled: true,
            llm_model: "llama3".to_string(),
            llm_timeout_s: 30,
            llm_top_k: 10,
        }
    }
}

/// Metadata generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub max_title_length: usize,
    pub max_hashtags: usize,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            max_title_length: 60,
            max_hashtags: 6,
        }
    }
}

/// Full discovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub embedding: EmbeddingConfig,
    pub segmenter: SegmenterConfig,
    pub scorer: ScorerSettings,
    pub selector: SelectionPolicies,
    pub metadata: MetadataSettings,
    pub resource: ResourceLimits,
    /// Local LLM endpoint host
    pub llm_host: String,
    /// Directory for the JSON sidecars
    pub meta_dir: PathBuf,
    /// SQLite database path; `None` skips the clip store
    pub db_path: Option<PathBuf>,
}

impl DiscoveryConfig {
    /// Load from a YAML file; absent keys keep their defaults
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Input(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.segmenter.min_duration_ms >= self.segmenter.max_duration_ms {
            return Err(PipelineError::Validation {
                field: "segmenter.min_duration_ms".to_string(),
                message: "minimum duration must be below maximum".to_string(),
            });
        }
        self.selector.validate()
    }
}

impl DiscoveryConfig {
    /// A configuration with LLM use disabled entirely
    #[must_use]
    pub fn without_llm(mut self) -> Self {
        self.scorer.llm_enabled = false;
        self
    }

    /// Endpoint host, defaulting when the config leaves it empty
    #[must_use]
    pub fn llm_host_or_default(&self) -> &str {
        if self.llm_host.is_empty() {
            clip_llm::DEFAULT_HOST
        } else {
            &self.llm_host
        }
    }

    #[must_use]
    pub fn meta_dir_or_default(&self) -> PathBuf {
        if self.meta_dir.as_os_str().is_empty() {
            PathBuf::from("data/meta")
        } else {
            self.meta_dir.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DiscoveryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.segmenter.min_duration_ms, 20_000);
        assert_eq!(config.selector.max_clips_per_episode, 8);
        assert_eq!(config.scorer.llm_timeout_s, 30);
        assert_eq!(config.metadata.max_title_length, 60);
        assert_eq!(config.llm_host_or_default(), clip_llm::DEFAULT_HOST);
        assert_eq!(config.meta_dir_or_default(), PathBuf::from("data/meta"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "
segmenter:
  min_duration_ms: 15000
scorer:
  llm_enabled: false
";
        let config: DiscoveryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.segmenter.min_duration_ms, 15_000);
        assert_eq!(config.segmenter.max_duration_ms, 120_000);
        assert!(!config.scorer.llm_enabled);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_invalid_durations_rejected() {
        let mut config = DiscoveryConfig::default();
        config.segmenter.min_duration_ms = 200_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_without_llm() {
        let config = DiscoveryConfig::default().without_llm();
        assert!(!config.scorer.llm_enabled);
    }
}
