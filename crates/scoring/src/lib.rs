//! Highlight scoring
//!
//! Hybrid clip-worthiness scoring: a weighted heuristic pass over every
//! segment, then an optional LLM re-rank of the top candidates. LLM
//! failures of any kind leave the heuristic score in place; a complete
//! LLM outage reduces the scorer to heuristic-only without failing the
//! pipeline.

pub mod signals;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use clip_llm::{parse_score, GenerateOptions, LlmClient};
use clip_resource::ResourceGate;
use clip_segmentation::TopicSegment;
use signals::{EntityTagger, SentimentAnalyzer};

/// Weights for the five heuristic signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub hook_phrases: f64,
    pub entity_density: f64,
    pub sentiment_peaks: f64,
    pub qa_patterns: f64,
    pub compression_ratio: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            hook_phrases: 0.30,
            entity_density: 0.20,
            sentiment_peaks: 0.20,
            qa_patterns: 0.20,
            compression_ratio: 0.10,
        }
    }
}

/// Per-signal values retained for inspection and logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub hook_phrases: f64,
    pub entity_density: f64,
    pub sentiment_peaks: f64,
    pub qa_patterns: f64,
    pub compression_ratio: f64,
    pub word_count: usize,
}

/// A topic segment with its scores
#[derive(Debug, Clone)]
pub struct ScoredSegment {
    pub segment: TopicSegment,
    pub heuristic_score: f64,
    pub llm_score: Option<f64>,
    pub final_score: f64,
    pub breakdown: ScoreBreakdown,
}

impl ScoredSegment {
    /// Blend: 60% LLM and 40% heuristic when an LLM score exists,
    /// heuristic alone otherwise. Always clamped to [0, 1].
    fn finalize(&mut self) {
        self.final_score = match self.llm_score {
            Some(llm) => llm * 0.6 + self.heuristic_score * 0.4,
            None => self.heuristic_score,
        }
        .clamp(0.0, 1.0);
    }
}

/// Scorer configuration
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub weights: HeuristicWeights,
    /// Candidates re-ranked by the LLM
    pub llm_top_k: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: HeuristicWeights::default(),
            llm_top_k: 10,
        }
    }
}

/// Hybrid heuristic + LLM segment scorer
pub struct HighlightScorer {
    config: ScorerConfig,
    llm: Option<LlmClient>,
    gate: Arc<ResourceGate>,
    tagger: Option<Arc<dyn EntityTagger>>,
    sentiment: Option<Arc<dyn SentimentAnalyzer>>,
}

impl HighlightScorer {
    /// Build a scorer; `llm: None` disables re-ranking entirely
    #[must_use]
    pub fn new(config: ScorerConfig, llm: Option<LlmClient>, gate: Arc<ResourceGate>) -> Self {
        Self {
            config,
            llm,
            gate,
            tagger: None,
            sentiment: Some(Arc::new(signals::LexiconSentiment)),
        }
    }

    /// Replace the entity tagger (a model-backed implementation, or `None`
    /// to force the capitalization heuristic)
    #[must_use]
    pub fn with_tagger(mut self, tagger: Option<Arc<dyn EntityTagger>>) -> Self {
        self.tagger = tagger;
        self
    }

    /// Replace the sentiment analyzer
    #[must_use]
    pub fn with_sentiment(mut self, sentiment: Option<Arc<dyn SentimentAnalyzer>>) -> Self {
        self.sentiment = sentiment;
        self
    }

    /// Heuristic score for one segment, with its per-signal breakdown
    #[must_use]
    pub fn heuristic_score(&self, segment: &TopicSegment) -> (f64, ScoreBreakdown) {
        let text = segment.text();
        let word_count = text.split_whitespace().count();

        let breakdown = ScoreBreakdown {
            hook_phrases: signals::hook_score(&text),
            entity_density: signals::entity_score(&text, self.tagger.as_deref()),
            sentiment_peaks: signals::sentiment_score(&text, self.sentiment.as_deref()),
            qa_patterns: signals::qa_score(segment),
            compression_ratio: signals::compression_score(word_count),
            word_count,
        };

        let weights = &self.config.weights;
        let score = (breakdown.hook_phrases * weights.hook_phrases
            + breakdown.entity_density * weights.entity_density
            + breakdown.sentiment_peaks * weights.sentiment_peaks
            + breakdown.qa_patterns * weights.qa_patterns
            + breakdown.compression_ratio * weights.compression_ratio)
            .clamp(0.0, 1.0);

        (score, breakdown)
    }

    /// Score all segments and sort best-first.
    ///
    /// Ordering is by final score descending with ties broken by segment
    /// start time ascending, so output is deterministic with the LLM off.
    pub async fn score_segments(&self, segments: Vec<TopicSegment>) -> Vec<ScoredSegment> {
        if segments.is_empty() {
            return Vec::new();
        }

        let total = segments.len();
        let mut scored: Vec<ScoredSegment> = segments
            .into_iter()
            .map(|segment| {
                let (heuristic_score, breakdown) = self.heuristic_score(&segment);
                let mut scored = ScoredSegment {
                    segment,
                    heuristic_score,
                    llm_score: None,
                    final_score: 0.0,
                    breakdown,
                };
                scored.finalize();
                scored
            })
            .collect();

        // Identify the top candidates by heuristic before re-ranking
        scored.sort_by(|a, b| {
            b.heuristic_score
                .total_cmp(&a.heuristic_score)
                .then_with(|| a.segment.start_ms.cmp(&b.segment.start_ms))
        });

        if let Some(llm) = &self.llm {
            let top_k = self.config.llm_top_k.min(scored.len());
            let mut rescored = 0usize;

            for candidate in scored.iter_mut().take(top_k) {
                match self.rerank_one(llm, &candidate.segment).await {
                    Some(llm_score) => {
                        candidate.llm_score = Some(llm_score);
                        candidate.finalize();
                        rescored += 1;
                    }
                    None => {
                        debug!(
                            start_ms = candidate.segment.start_ms,
                            "Keeping heuristic score for segment"
                        );
                    }
                }
            }

            info!(rescored, candidates = top_k, "LLM re-ranking completed");
        }

        scored.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.segment.start_ms.cmp(&b.segment.start_ms))
        });

        info!(
            segments = total,
            top_score = scored.first().map(|s| s.final_score).unwrap_or(0.0),
            "Segment scoring completed"
        );

        scored
    }

    /// One LLM scoring call under an LLM slot; every failure is non-fatal
    async fn rerank_one(&self, llm: &LlmClient, segment: &TopicSegment) -> Option<f64> {
        let _slot = match self.gate.acquire_llm().await {
            Ok(slot) => slot,
            Err(err) => {
                warn!(error = %err, "LLM slot unavailable, keeping heuristic score");
                return None;
            }
        };

        let prompt = clip_worthiness_prompt(segment);
        match llm.generate(&prompt, &GenerateOptions::scoring()).await {
            Ok(response) => {
                let score = parse_score(&response);
                if score.is_none() {
                    warn!(response = %response, "No usable score in LLM response");
                }
                score
            }
            Err(err) => {
                warn!(error = %err, start_ms = segment.start_ms, "LLM scoring failed");
                None
            }
        }
    }
}

/// Prompt asking the model for a bare scalar in [0, 1]
fn clip_worthiness_prompt(segment: &TopicSegment) -> String {
    let duration_s = segment.duration_ms() as f64 / 1000.0;
    format!(
        "Evaluate this video segment for social media clip worthiness on a scale of 0-1.\n\
         \n\
         Consider these factors:\n\
         - Hook potential (engaging opening)\n\
         - Shareability and viral potential\n\
         - Clear, standalone message\n\
         - Emotional impact or entertainment value\n\
         - Educational or informational value\n\
         - Appropriate length for social media ({duration_s:.1} seconds)\n\
         \n\
         Segment text:\n\
         \"{}\"\n\
         \n\
         Respond with just a number between 0 and 1, where:\n\
         - 0.0-0.3: Poor clip potential\n\
         - 0.4-0.6: Moderate clip potential\n\
         - 0.7-0.9: Good clip potential\n\
         - 0.9-1.0: Excellent clip potential\n\
         \n\
         Score:",
        segment.text()
    )
}
