//! Topic segmentation
//!
//! Groups sentences into coherent topic segments: boundary detection runs
//! kernel change-point detection over sentence-embedding cosine distances,
//! with a penalty search steering the result toward a target segment
//! count, then a duration policy merges short segments and splits long
//! ones. Falls back to a uniform partition whenever detection cannot run.

pub mod pelt;

mod policy;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use clip_common::{PipelineError, Result, Sentence};
use pelt::KernelCpd;

/// Penalty multipliers tried in order during the search
const PENALTY_MULTIPLIERS: [f64; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0];
/// Lower multipliers used when too few segments were produced
const FORCE_MORE_MULTIPLIERS: [f64; 5] = [0.1, 0.2, 0.3, 0.4, 0.5];
/// Higher multipliers used when too many segments were produced
const FORCE_FEWER_MULTIPLIERS: [f64; 5] = [2.0, 3.0, 4.0, 5.0, 10.0];

/// Bounds on the target segment count for a typical episode
const MIN_TARGET_SEGMENTS: usize = 6;
const MAX_TARGET_SEGMENTS: usize = 20;

/// A contiguous run of sentences sharing a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSegment {
    pub sentences: Vec<Sentence>,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Mean sentence embedding, when embeddings were available
    pub embedding: Option<Vec<f32>>,
}

impl TopicSegment {
    /// Build a segment over a non-empty sentence run; bounds come from
    /// the first and last sentence.
    pub fn new(sentences: Vec<Sentence>) -> Result<Self> {
        let Some(first) = sentences.first() else {
            return Err(PipelineError::Validation {
                field: "segment.sentences".to_string(),
                message: "segment must contain at least one sentence".to_string(),
            });
        };
        let start_ms = first.start_ms;
        let end_ms = sentences.last().expect("non-empty checked above").end_ms;
        if start_ms >= end_ms {
            return Err(PipelineError::Validation {
                field: "segment.end_ms".to_string(),
                message: format!("start_ms {start_ms} not before end_ms {end_ms}"),
            });
        }
        Ok(Self {
            sentences,
            start_ms,
            end_ms,
            embedding: None,
        })
    }

    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Combined text of all sentences
    #[must_use]
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Duration policy for topic segments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub min_duration_ms: i64,
    pub max_duration_ms: i64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 20_000,
            max_duration_ms: 120_000,
        }
    }
}

/// Topic segmenter: boundary detection plus duration policy
#[derive(Debug, Clone, Default)]
pub struct TopicSegmenter {
    config: SegmenterConfig,
}

impl TopicSegmenter {
    #[must_use]
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Full segmentation pipeline: detect boundaries, build segments,
    /// enforce the duration policy. Deterministic for fixed input.
    pub fn segment(
        &self,
        sentences: Vec<Sentence>,
        embeddings: &Array2<f32>,
    ) -> Result<Vec<TopicSegment>> {
        if sentences.is_empty() {
            warn!("No sentences provided for segmentation");
            return Ok(Vec::new());
        }

        let total_duration_s = (sentences.last().expect("non-empty").end_ms
            - sentences.first().expect("non-empty").start_ms) as f64
            / 1000.0;
        let target_segments = ((total_duration_s / 180.0).round() as usize)
            .clamp(MIN_TARGET_SEGMENTS, MAX_TARGET_SEGMENTS);

        let boundaries = if embeddings.nrows() == sentences.len() && embeddings.ncols() > 0 {
            self.detect_boundaries(embeddings, target_segments)
        } else {
            warn!(
                rows = embeddings.nrows(),
                sentences = sentences.len(),
                "Embeddings unavailable or mismatched, using uniform partition"
            );
            uniform_boundaries(sentences.len(), target_segments)
        };

        let initial = build_segments(&sentences, &boundaries, embeddings)?;
        let constrained = policy::apply_duration_policy(initial, &self.config)?;

        info!(
            sentences = sentences.len(),
            target_segments,
            segments = constrained.len(),
            total_duration_s,
            "Topic segmentation completed"
        );

        Ok(constrained)
    }

    /// Boundary detection with penalty search.
    ///
    /// Tries a fixed multiplier ladder around the base penalty, keeping
    /// the run closest to the target count; exact hits short-circuit.
    /// Out-of-range results retry with the force ladders, then fall back
    /// to a uniform partition.
    fn detect_boundaries(&self, embeddings: &Array2<f32>, target_segments: usize) -> Vec<usize> {
        let n = embeddings.nrows();
        if n < 2 {
            debug!(sentences = n, "Not enough sentences for boundary detection");
            return Vec::new();
        }

        let distances = cosine_distance_matrix(embeddings);
        let cpd = KernelCpd::fit(&distances, 2);
        let base_penalty = base_penalty(n, target_segments);

        let mut best: Vec<usize> = Vec::new();
        let mut best_score = usize::MAX;
        for multiplier in PENALTY_MULTIPLIERS {
            let boundaries = cpd.predict(base_penalty * multiplier);
            let segments = boundaries.len() + 1;
            let score = segments.abs_diff(target_segments);
            debug!(multiplier, segments, score, "Penalty trial");
            if score < best_score {
                best_score = score;
                best = boundaries;
            }
            if score == 0 {
                break;
            }
        }

        let produced = best.len() + 1;
        if produced < MIN_TARGET_SEGMENTS {
            best = self.force_segment_count(&cpd, n, MIN_TARGET_SEGMENTS, &FORCE_MORE_MULTIPLIERS);
        } else if produced > MAX_TARGET_SEGMENTS {
            best = self.force_segment_count(&cpd, n, MAX_TARGET_SEGMENTS, &FORCE_FEWER_MULTIPLIERS);
        }

        let segments = best.len() + 1;
        if !(MIN_TARGET_SEGMENTS..=MAX_TARGET_SEGMENTS).contains(&segments) {
            warn!(
                segments,
                target_segments, "Segment count still out of range, using uniform partition"
            );
            return uniform_boundaries(n, target_segments);
        }

        best
    }

    /// Sweep a multiplier ladder until the produced count crosses the
    /// bound; falls back to a uniform partition when none does.
    fn force_segment_count(
        &self,
        cpd: &KernelCpd,
        n: usize,
        bound: usize,
        multipliers: &[f64],
    ) -> Vec<usize> {
        let base = base_penalty(n, bound);
        let force_more = multipliers[0] < 1.0;

        for &multiplier in multipliers {
            let boundaries = cpd.predict(base * multiplier);
            let segments = boundaries.len() + 1;
            let satisfied = if force_more {
                segments >= bound
            } else {
                segments <= bound
            };
            if satisfied {
                info!(segments, multiplier, "Forced segment count into range");
                return boundaries;
            }
        }

        warn!(bound, "Could not force segment count, using uniform partition");
        uniform_boundaries(n, bound)
    }
}

/// Base PELT penalty, scaled for very short or very long inputs
fn base_penalty(n_sentences: usize, target_segments: usize) -> f64 {
    let mut penalty = (n_sentences as f64 / target_segments as f64) * 2.0;
    if n_sentences < 50 {
        penalty *= 0.5;
    } else if n_sentences > 200 {
        penalty *= 1.5;
    }
    penalty
}

/// Uniform partition into roughly equal sentence-count buckets
fn uniform_boundaries(n_sentences: usize, target_segments: usize) -> Vec<usize> {
    if n_sentences <= target_segments {
        return (1..n_sentences).collect();
    }

    let segment_size = n_sentences / target_segments;
    let mut boundaries = Vec::with_capacity(target_segments.saturating_sub(1));
    for i in 1..target_segments {
        let boundary = i * segment_size;
        if boundary < n_sentences {
            boundaries.push(boundary);
        }
    }
    boundaries
}

/// Pairwise cosine distance between embedding rows
fn cosine_distance_matrix(embeddings: &Array2<f32>) -> Array2<f64> {
    let n = embeddings.nrows();
    let norms: Vec<f64> = (0..n)
        .map(|i| {
            embeddings
                .row(i)
                .iter()
                .map(|&v| f64::from(v) * f64::from(v))
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    let mut distances = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dot: f64 = embeddings
                .row(i)
                .iter()
                .zip(embeddings.row(j).iter())
                .map(|(&a, &b)| f64::from(a) * f64::from(b))
                .sum();
            let denom = norms[i] * norms[j];
            let similarity = if denom > 1e-12 { dot / denom } else { 0.0 };
            let distance = (1.0 - similarity).max(0.0);
            distances[[i, j]] = distance;
            distances[[j, i]] = distance;
        }
    }
    distances
}

/// Turn boundary indices into segments over half-open sentence ranges
fn build_segments(
    sentences: &[Sentence],
    boundaries: &[usize],
    embeddings: &Array2<f32>,
) -> Result<Vec<TopicSegment>> {
    let mut sorted = boundaries.to_vec();
    sorted.sort_unstable();
    sorted.push(sentences.len());

    let has_embeddings = embeddings.nrows() == sentences.len() && embeddings.ncols() > 0;

    let mut segments = Vec::new();
    let mut start = 0usize;
    for boundary in sorted {
        if boundary > start && boundary <= sentences.len() {
            let mut segment = TopicSegment::new(sentences[start..boundary].to_vec())?;
            if has_embeddings {
                segment.embedding = Some(mean_embedding(embeddings, start, boundary));
            }
            segments.push(segment);
            start = boundary;
        }
    }
    Ok(segments)
}

/// Mean of embedding rows `[start, end)`
fn mean_embedding(embeddings: &Array2<f32>, start: usize, end: usize) -> Vec<f32> {
    let dim = embeddings.ncols();
    let count = (end - start) as f32;
    let mut mean = vec![0.0f32; dim];
    for row in start..end {
        for (j, value) in embeddings.row(row).iter().enumerate() {
            mean[j] += value;
        }
    }
    for value in &mut mean {
        *value /= count;
    }
    mean
}
