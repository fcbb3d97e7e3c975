//! Clip discovery pipeline
//!
//! Orchestrates the five core stages for one episode: sentence alignment,
//! sentence embeddings, topic segmentation, highlight scoring, and clip
//! selection, then merges generated metadata into the selected clips,
//! persists them, and writes the JSON sidecar. Stages run sequentially;
//! each consumes the previous stage's output. LLM and FFmpeg use is
//! bounded by the shared resource gate.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use clip_alignment::SentenceAligner;
use clip_common::{PipelineError, RawTranscript};
use clip_embeddings::EmbeddingService;
use clip_llm::LlmClient;
use clip_metadata::{LlmSettings, MetadataConfig, MetadataGenerator};
use clip_resource::{ResourceGate, RetryPolicy};
use clip_scoring::{HighlightScorer, ScorerConfig, ScoredSegment};
use clip_segmentation::{SegmenterConfig, TopicSegmenter};
use clip_selection::{ClipSelector, ClipSpec, Platform, SelectionPolicies};
use clip_storage::sidecar::Sidecar;
use clip_storage::{ClipRecord, ClipStore};

pub use config::DiscoveryConfig;

/// Pipeline stage names for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Alignment,
    Embedding,
    Segmentation,
    Scoring,
    Selection,
    Metadata,
    Persistence,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Alignment => "alignment",
            Self::Embedding => "embedding",
            Self::Segmentation => "segmentation",
            Self::Scoring => "scoring",
            Self::Selection => "selection",
            Self::Metadata => "metadata",
            Self::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Structured discovery failure: the episode and the stage that failed
#[derive(Debug, Error)]
#[error("clip discovery failed for episode {episode_id} in stage {stage}: {source}")]
pub struct DiscoveryError {
    pub episode_id: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

/// Per-call options for `discover_clips`
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub max_clips: usize,
    pub min_duration_ms: i64,
    pub max_duration_ms: i64,
    /// Override the configured aspect ratios when set
    pub aspect_ratios: Option<Vec<String>>,
    pub score_threshold: f64,
    /// Platform preset; overrides buckets, ratios, and the episode cap
    pub platform: Option<Platform>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            max_clips: 8,
            min_duration_ms: 20_000,
            max_duration_ms: 120_000,
            aspect_ratios: None,
            score_threshold: 0.3,
            platform: None,
        }
    }
}

/// The clip discovery engine
pub struct ClipDiscovery {
    config: DiscoveryConfig,
    gate: Arc<ResourceGate>,
    aligner: SentenceAligner,
    embedder: EmbeddingService,
    store: Option<ClipStore>,
    retry: RetryPolicy,
}

impl ClipDiscovery {
    /// Build the engine. Model loading happens here; an environment with
    /// no embedding model leaves the embedder in fallback mode.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let gate = Arc::new(ResourceGate::new(config.resource.clone()));
        let embedder = EmbeddingService::new(config.embedding.clone(), Arc::clone(&gate));

        let store = match &config.db_path {
            Some(path) => Some(ClipStore::open(path).map_err(|source| DiscoveryError {
                episode_id: "(startup)".to_string(),
                stage: Stage::Persistence,
                source,
            })?),
            None => None,
        };

        info!(
            llm_enabled = config.scorer.llm_enabled,
            embedding_model = embedder.model_name(),
            "Clip discovery engine initialized"
        );

        Ok(Self {
            config,
            gate,
            aligner: SentenceAligner::default(),
            embedder,
            store,
            retry: RetryPolicy::default(),
        })
    }

    /// Discover clips for one episode.
    ///
    /// Returns the final clip specifications (metadata merged in), after
    /// persisting them and writing the sidecar. Empty input produces an
    /// empty result with no sidecar; a pipeline that ran but selected
    /// nothing writes a sidecar with `clips_count: 0`.
    pub async fn discover_clips(
        &self,
        episode_id: &str,
        transcript: &RawTranscript,
        opts: &DiscoverOptions,
    ) -> Result<Vec<ClipSpec>, DiscoveryError> {
        info!(
            episode_id,
            max_clips = opts.max_clips,
            min_duration_ms = opts.min_duration_ms,
            max_duration_ms = opts.max_duration_ms,
            "Starting clip discovery"
        );

        // Stage 1: sentence alignment
        let words = transcript.to_words();
        if words.is_empty() {
            warn!(episode_id, "Transcript has no usable words");
            return Ok(Vec::new());
        }

        let mut sentences = self.aligner.align(&words);
        if sentences.is_empty() {
            warn!(episode_id, "No sentences after alignment");
            return Ok(Vec::new());
        }

        if let Some(diarization) = &transcript.diarization {
            self.aligner.attach_speakers(&mut sentences, diarization);
        }

        // Stage 2: sentence embeddings (cached)
        let embeddings = self
            .embedder
            .embed(&sentences, episode_id)
            .await
            .map_err(|source| self.stage_error(episode_id, Stage::Embedding, source))?;

        // Stage 3: topic segmentation under the per-call duration policy
        let segmenter = TopicSegmenter::new(SegmenterConfig {
            min_duration_ms: opts.min_duration_ms,
            max_duration_ms: opts.max_duration_ms,
        });
        let segments = segmenter
            .segment(sentences, &embeddings)
            .map_err(|source| self.stage_error(episode_id, Stage::Segmentation, source))?;

        if segments.is_empty() {
            return self.finish_empty(episode_id).await;
        }

        // Stage 4: highlight scoring (heuristics + optional LLM re-rank)
        let llm = self.scoring_llm_client();
        if let Some(client) = &llm {
            if let Err(err) = client.verify_connection().await {
                warn!(error = %err, "LLM endpoint probe failed; re-ranking may fall back");
            }
        }
        let scorer = HighlightScorer::new(
            ScorerConfig {
                weights: self.config.scorer.weights.clone(),
                llm_top_k: self.config.scorer.llm_top_k,
            },
            llm,
            Arc::clone(&self.gate),
        );
        let scored = scorer.score_segments(segments).await;

        // Stage 5: clip selection
        let selector = ClipSelector::new(self.selection_policies(opts));
        selector
            .policies()
            .validate()
            .map_err(|source| self.stage_error(episode_id, Stage::Selection, source))?;
        let mut clips = selector.select(&scored, episode_id);

        if clips.is_empty() {
            return self.finish_empty(episode_id).await;
        }

        // Stage 6: metadata, looked up via pre-padding segment bounds
        let generator = MetadataGenerator::new(
            MetadataConfig {
                max_title_length: self.config.metadata.max_title_length,
                max_hashtags: self.config.metadata.max_hashtags,
                llm_retries: 2,
            },
            self.metadata_llm_settings(),
            Arc::clone(&self.gate),
        );

        let by_bounds: HashMap<(i64, i64), &ScoredSegment> = scored
            .iter()
            .map(|s| ((s.segment.start_ms, s.segment.end_ms), s))
            .collect();

        for clip in &mut clips {
            let source = by_bounds
                .get(&(clip.source_segment_start_ms, clip.source_segment_end_ms))
                .map(|s| &s.segment);

            match source {
                Some(segment) => {
                    let metadata = generator.generate(segment).await;
                    clip.title = Some(metadata.title);
                    clip.caption = Some(metadata.caption);
                    clip.hashtags = metadata.hashtags;
                }
                None => {
                    warn!(clip_id = %clip.id, "No source segment for clip, using generic metadata");
                    clip.title = Some(format!("Clip from {episode_id}"));
                    clip.caption =
                        Some(format!("Duration: {:.1}s", clip.duration_ms as f64 / 1000.0));
                }
            }
        }

        self.persist(episode_id, &clips).await?;

        info!(episode_id, clips = clips.len(), "Clip discovery completed");
        Ok(clips)
    }

    /// Empty success: sidecar with zero clips, empty return
    async fn finish_empty(&self, episode_id: &str) -> Result<Vec<ClipSpec>, DiscoveryError> {
        warn!(episode_id, "No clips selected");
        self.persist(episode_id, &[]).await?;
        Ok(Vec::new())
    }

    /// Store rows (retried) and write the sidecar (best-effort)
    async fn persist(&self, episode_id: &str, clips: &[ClipSpec]) -> Result<(), DiscoveryError> {
        if let Some(store) = &self.store {
            let records: Vec<ClipRecord> = clips.iter().map(ClipRecord::from_spec).collect();
            self.retry
                .run("insert_clips", || store.insert_clips(&records).map(|_| ()))
                .await
                .map_err(|source| self.stage_error(episode_id, Stage::Persistence, source))?;
        }

        let sidecar = Sidecar::from_specs(episode_id, clips);
        if let Err(err) = sidecar.write(&self.config.meta_dir_or_default()) {
            warn!(episode_id, error = %err, "Failed to write clips sidecar");
        }

        Ok(())
    }

    /// Selection policies for this call: platform preset or configured
    /// defaults, with per-call overrides applied on top
    fn selection_policies(&self, opts: &DiscoverOptions) -> SelectionPolicies {
        let mut policies = match opts.platform {
            Some(platform) => platform.policies(),
            None => self.config.selector.clone(),
        };

        policies.max_clips_per_episode = opts.max_clips;
        policies.min_score_threshold = opts.score_threshold;
        if let Some(ratios) = &opts.aspect_ratios {
            policies.aspect_ratios = ratios.clone();
        }

        policies
    }

    fn scoring_llm_client(&self) -> Option<LlmClient> {
        if !self.config.scorer.llm_enabled {
            return None;
        }
        LlmClient::new(
            self.config.llm_host_or_default(),
            &self.config.scorer.llm_model,
            Duration::from_secs(self.config.scorer.llm_timeout_s),
        )
        .map_err(|err| warn!(error = %err, "Failed to build scoring LLM client"))
        .ok()
    }

    fn metadata_llm_settings(&self) -> Option<LlmSettings> {
        if !self.config.scorer.llm_enabled {
            return None;
        }
        Some(LlmSettings {
            host: self.config.llm_host_or_default().to_string(),
            model: self.config.scorer.llm_model.clone(),
            timeout: Duration::from_secs(self.config.scorer.llm_timeout_s),
        })
    }

    fn stage_error(
        &self,
        episode_id: &str,
        stage: Stage,
        source: PipelineError,
    ) -> DiscoveryError {
        DiscoveryError {
            episode_id: episode_id.to_string(),
            stage,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_match_contract() {
        let opts = DiscoverOptions::default();
        assert_eq!(opts.max_clips, 8);
        assert_eq!(opts.min_duration_ms, 20_000);
        assert_eq!(opts.max_duration_ms, 120_000);
        assert!((opts.score_threshold - 0.3).abs() < 1e-12);
        assert!(opts.platform.is_none());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Embedding.to_string(), "embedding");
        assert_eq!(Stage::Persistence.to_string(), "persistence");
    }

    #[test]
    fn test_discovery_error_format() {
        let err = DiscoveryError {
            episode_id: "ep42".to_string(),
            stage: Stage::Segmentation,
            source: PipelineError::Segmentation("no boundaries".to_string()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("ep42"));
        assert!(rendered.contains("segmentation"));
    }
}
