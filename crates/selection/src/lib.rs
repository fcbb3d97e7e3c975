//! Clip selection
//!
//! Turns scored topic segments into clip specifications: per-duration-
//! bucket matching (whole segments or sub-clip windows over sentences),
//! score thresholds, per-segment and per-episode caps, and safe padding
//! around the final cut points. Platform presets override buckets, aspect
//! ratios, and the episode cap.

pub mod presets;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use clip_common::{PipelineError, Result};
use clip_scoring::ScoredSegment;

pub use presets::Platform;

/// Aspect ratios the renderer understands
pub const VALID_ASPECT_RATIOS: [&str; 3] = ["9x16", "16x9", "1x1"];

/// A named duration range with an optimal target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationBucket {
    pub min_ms: i64,
    pub max_ms: i64,
    pub optimal_ms: i64,
    pub name: String,
}

impl DurationBucket {
    pub fn new(min_ms: i64, max_ms: i64, optimal_ms: i64, name: &str) -> Result<Self> {
        if min_ms >= max_ms {
            return Err(PipelineError::Validation {
                field: "bucket.min_ms".to_string(),
                message: format!("min_ms {min_ms} must be below max_ms {max_ms}"),
            });
        }
        if !(min_ms < optimal_ms && optimal_ms <= max_ms) {
            return Err(PipelineError::Validation {
                field: "bucket.optimal_ms".to_string(),
                message: format!("optimal_ms {optimal_ms} outside ({min_ms}, {max_ms}]"),
            });
        }
        Ok(Self {
            min_ms,
            max_ms,
            optimal_ms,
            name: name.to_string(),
        })
    }

    fn contains(&self, duration_ms: i64) -> bool {
        (self.min_ms..=self.max_ms).contains(&duration_ms)
    }
}

/// Selection policies; platform presets produce alternative instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicies {
    pub duration_buckets: Vec<DurationBucket>,
    pub aspect_ratios: Vec<String>,
    pub min_score_threshold: f64,
    pub max_clips_per_segment: usize,
    pub max_clips_per_episode: usize,
    pub safe_padding_ms: i64,
}

impl Default for SelectionPolicies {
    fn default() -> Self {
        Self {
            duration_buckets: vec![
                DurationBucket::new(15_000, 30_000, 20_000, "short_hook")
                    .expect("default bucket is valid"),
                DurationBucket::new(30_000, 60_000, 45_000, "standard")
                    .expect("default bucket is valid"),
                DurationBucket::new(60_000, 120_000, 90_000, "long").expect("default bucket is valid"),
            ],
            aspect_ratios: vec!["9x16".to_string(), "16x9".to_string()],
            min_score_threshold: 0.3,
            max_clips_per_segment: 2,
            max_clips_per_episode: 8,
            safe_padding_ms: 500,
        }
    }
}

impl SelectionPolicies {
    /// Validate thresholds, caps, and aspect ratios
    pub fn validate(&self) -> Result<()> {
        if self.duration_buckets.is_empty() {
            return Err(PipelineError::Validation {
                field: "policies.duration_buckets".to_string(),
                message: "at least one duration bucket is required".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_score_threshold) {
            return Err(PipelineError::Validation {
                field: "policies.min_score_threshold".to_string(),
                message: format!("{} outside [0, 1]", self.min_score_threshold),
            });
        }
        if self.max_clips_per_segment == 0 || self.max_clips_per_episode == 0 {
            return Err(PipelineError::Validation {
                field: "policies.max_clips".to_string(),
                message: "caps must be at least 1".to_string(),
            });
        }
        if self.safe_padding_ms < 0 {
            return Err(PipelineError::Validation {
                field: "policies.safe_padding_ms".to_string(),
                message: "padding must be non-negative".to_string(),
            });
        }
        for ratio in &self.aspect_ratios {
            if !VALID_ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(PipelineError::Validation {
                    field: "policies.aspect_ratios".to_string(),
                    message: format!("unknown aspect ratio {ratio}"),
                });
            }
        }
        Ok(())
    }
}

/// Specification for one clip to render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSpec {
    pub id: String,
    pub episode_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
    pub aspect_ratios: Vec<String>,
    pub score: f64,
    pub bucket_name: String,
    /// Bounds of the source topic segment, pre-padding
    pub source_segment_start_ms: i64,
    pub source_segment_end_ms: i64,
    pub title: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl ClipSpec {
    /// Validated constructor; enforces the clip invariants
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        episode_id: &str,
        start_ms: i64,
        end_ms: i64,
        aspect_ratios: Vec<String>,
        score: f64,
        bucket_name: &str,
        source_segment_start_ms: i64,
        source_segment_end_ms: i64,
    ) -> Result<Self> {
        if start_ms < 0 {
            return Err(PipelineError::Validation {
                field: "clip.start_ms".to_string(),
                message: format!("negative start_ms {start_ms}"),
            });
        }
        if end_ms <= start_ms {
            return Err(PipelineError::Validation {
                field: "clip.end_ms".to_string(),
                message: format!("end_ms {end_ms} not after start_ms {start_ms}"),
            });
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(PipelineError::Validation {
                field: "clip.score".to_string(),
                message: format!("score {score} outside [0, 1]"),
            });
        }
        for ratio in &aspect_ratios {
            if !VALID_ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(PipelineError::Validation {
                    field: "clip.aspect_ratios".to_string(),
                    message: format!("unknown aspect ratio {ratio}"),
                });
            }
        }

        Ok(Self {
            id: fresh_clip_id(),
            episode_id: episode_id.to_string(),
            start_ms,
            end_ms,
            duration_ms: end_ms - start_ms,
            aspect_ratios,
            score,
            bucket_name: bucket_name.to_string(),
            source_segment_start_ms,
            source_segment_end_ms,
            title: None,
            caption: None,
            hashtags: Vec::new(),
        })
    }
}

/// Short random clip token
fn fresh_clip_id() -> String {
    format!("clip_{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Applies selection policies to scored segments
#[derive(Debug, Clone, Default)]
pub struct ClipSelector {
    policies: SelectionPolicies,
}

impl ClipSelector {
    #[must_use]
    pub fn new(policies: SelectionPolicies) -> Self {
        Self { policies }
    }

    #[must_use]
    pub fn policies(&self) -> &SelectionPolicies {
        &self.policies
    }

    /// Select clips for an episode.
    ///
    /// Candidates are gathered per duration bucket, globally sorted by
    /// score (ties by start time), capped per bucket and per episode, and
    /// finally padded. Items failing validation are dropped with a
    /// warning; the selection continues.
    pub fn select(&self, scored_segments: &[ScoredSegment], episode_id: &str) -> Vec<ClipSpec> {
        if scored_segments.is_empty() {
            warn!("No segments provided for clip selection");
            return Vec::new();
        }

        let qualified: Vec<&ScoredSegment> = scored_segments
            .iter()
            .filter(|s| s.final_score >= self.policies.min_score_threshold)
            .collect();

        debug!(
            qualified = qualified.len(),
            threshold = self.policies.min_score_threshold,
            "Segments after score filtering"
        );

        if qualified.is_empty() {
            warn!("No segments meet the score threshold");
            return Vec::new();
        }

        let mut candidates: Vec<ClipSpec> = Vec::new();
        for bucket in &self.policies.duration_buckets {
            candidates.extend(self.candidates_for_bucket(&qualified, episode_id, bucket));
        }

        // Sub-clip windows inherit a scaled-down score; emitted clips
        // must still clear the episode threshold.
        candidates.retain(|clip| clip.score >= self.policies.min_score_threshold);

        // Global ordering: score descending, ties by start ascending
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_segment_start_ms.cmp(&b.source_segment_start_ms))
                .then_with(|| a.start_ms.cmp(&b.start_ms))
        });

        // Episode cap plus a per-bucket cap to preserve variety
        let bucket_cap = self
            .policies
            .max_clips_per_episode
            .div_ceil(self.policies.duration_buckets.len());

        let mut per_bucket: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();
        let mut selected: Vec<ClipSpec> = Vec::new();
        for candidate in candidates {
            if selected.len() >= self.policies.max_clips_per_episode {
                break;
            }
            let used = per_bucket.entry(candidate.bucket_name.clone()).or_insert(0);
            if *used >= bucket_cap {
                continue;
            }
            *used += 1;
            selected.push(candidate);
        }

        let padded: Vec<ClipSpec> = selected
            .into_iter()
            .filter_map(|clip| match self.apply_safe_padding(&clip) {
                Ok(padded) => Some(padded),
                Err(err) => {
                    warn!(clip_id = %clip.id, error = %err, "Dropping clip that failed padding");
                    None
                }
            })
            .collect();

        info!(
            episode_id,
            selected = padded.len(),
            max = self.policies.max_clips_per_episode,
            "Clip selection completed"
        );

        padded
    }

    /// Candidates for one duration bucket: whole segments that fit, and
    /// sub-clip windows carved out of longer segments.
    fn candidates_for_bucket(
        &self,
        segments: &[&ScoredSegment],
        episode_id: &str,
        bucket: &DurationBucket,
    ) -> Vec<ClipSpec> {
        let mut clips = Vec::new();

        for scored in segments {
            let segment = &scored.segment;
            let duration = segment.duration_ms();

            if duration < bucket.min_ms {
                continue;
            }

            if bucket.contains(duration) {
                match ClipSpec::new(
                    episode_id,
                    segment.start_ms,
                    segment.end_ms,
                    self.policies.aspect_ratios.clone(),
                    scored.final_score,
                    &bucket.name,
                    segment.start_ms,
                    segment.end_ms,
                ) {
                    Ok(clip) => clips.push(clip),
                    Err(err) => warn!(error = %err, "Skipping invalid whole-segment clip"),
                }
            } else {
                clips.extend(self.sub_clips(scored, episode_id, bucket));
            }
        }

        clips
    }

    /// Enumerate contiguous sentence windows of a long segment that land
    /// in the bucket; keep the best few.
    ///
    /// Window score is the segment score scaled by the fraction of
    /// sentences covered, so longer windows within the bucket win.
    fn sub_clips(
        &self,
        scored: &ScoredSegment,
        episode_id: &str,
        bucket: &DurationBucket,
    ) -> Vec<ClipSpec> {
        let sentences = &scored.segment.sentences;
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut windows: Vec<ClipSpec> = Vec::new();

        for start_idx in 0..sentences.len() {
            let mut accumulated = 0i64;

            for end_idx in start_idx..sentences.len() {
                let sentence = &sentences[end_idx];
                let sentence_duration = sentence.end_ms - sentence.start_ms;
                if accumulated + sentence_duration > bucket.max_ms {
                    break;
                }
                accumulated += sentence_duration;

                if accumulated < bucket.min_ms {
                    continue;
                }

                let covered = end_idx - start_idx + 1;
                let window_score =
                    scored.final_score * (covered as f64 / sentences.len() as f64);

                match ClipSpec::new(
                    episode_id,
                    sentences[start_idx].start_ms,
                    sentence.end_ms,
                    self.policies.aspect_ratios.clone(),
                    window_score,
                    &bucket.name,
                    scored.segment.start_ms,
                    scored.segment.end_ms,
                ) {
                    Ok(clip) => windows.push(clip),
                    Err(err) => warn!(error = %err, "Skipping invalid sub-clip window"),
                }
            }
        }

        // Best windows first, capped per segment
        windows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.start_ms.cmp(&b.start_ms))
        });
        windows.truncate(self.policies.max_clips_per_segment);
        windows
    }

    /// Pad the cut points symmetrically, clamping the start at zero.
    ///
    /// Emits a fresh spec; the source segment bounds are preserved so the
    /// pre-padding provenance stays visible.
    pub fn apply_safe_padding(&self, clip: &ClipSpec) -> Result<ClipSpec> {
        let padding = self.policies.safe_padding_ms;
        let start_ms = (clip.start_ms - padding).max(0);
        let end_ms = clip.end_ms + padding;

        let mut padded = ClipSpec::new(
            &clip.episode_id,
            start_ms,
            end_ms,
            clip.aspect_ratios.clone(),
            clip.score,
            &clip.bucket_name,
            clip.source_segment_start_ms,
            clip.source_segment_end_ms,
        )?;
        // Identity and metadata carry over; only the cut points moved
        padded.id = clip.id.clone();
        padded.title = clip.title.clone();
        padded.caption = clip.caption.clone();
        padded.hashtags = clip.hashtags.clone();

        debug!(
            clip_id = %padded.id,
            start_ms,
            end_ms,
            padding_ms = padding,
            "Applied safe padding"
        );

        Ok(padded)
    }
}
