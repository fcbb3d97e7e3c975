//! Sentence alignment
//!
//! Converts word-level timestamps from transcription into sentence-level
//! units and attaches speaker labels from diarization. Sentence boundaries
//! come from punctuation and timing gaps; speaker labels come from weighted
//! temporal overlap with fallback strategies for misaligned boundaries.

pub mod cleaner;
pub mod speakers;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clip_common::{RawDiarization, Sentence, Word};

/// Strong sentence boundaries (always split)
static STRONG_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s*$").unwrap());

/// Weak boundaries (split only with a timing gap)
static WEAK_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,:;]\s*$").unwrap());

/// Configuration for sentence alignment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Maximum gap between words before forcing a sentence boundary
    pub max_gap_ms: i64,
    /// Gap required for a weak-punctuation split
    pub weak_gap_ms: i64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            max_gap_ms: 2200,
            weak_gap_ms: 1000,
        }
    }
}

/// Merges words into sentences and attaches speaker labels
#[derive(Debug, Clone, Default)]
pub struct SentenceAligner {
    config: AlignerConfig,
}

impl SentenceAligner {
    #[must_use]
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Group validated words into sentences.
    ///
    /// The output covers the same time interval as the input, in order,
    /// without overlap. An empty input produces an empty output; alignment
    /// never fails on alignment data alone.
    pub fn align(&self, words: &[Word]) -> Vec<Sentence> {
        if words.is_empty() {
            warn!("No words provided for sentence alignment");
            return Vec::new();
        }

        let mut sentences = Vec::new();
        let mut current: Vec<Word> = Vec::new();

        for (i, word) in words.iter().enumerate() {
            current.push(word.clone());

            let last = i == words.len() - 1;
            if last || self.should_split(word, words.get(i + 1)) {
                match Sentence::from_words(std::mem::take(&mut current)) {
                    Ok(sentence) => sentences.push(sentence),
                    Err(err) => {
                        // Zero-duration runs (e.g. duplicated timestamps) are
                        // dropped per-item; the rest of the episode continues.
                        warn!(error = %err, "Discarding invalid sentence");
                    }
                }
            }
        }

        info!(
            words = words.len(),
            sentences = sentences.len(),
            "Sentence alignment completed"
        );

        sentences
    }

    /// Attach speaker labels using temporal overlap with diarization.
    ///
    /// Invalid diarization turns are skipped with a warning. Sentences that
    /// cannot be matched directly are resolved in a context post-pass.
    pub fn attach_speakers(&self, sentences: &mut [Sentence], diarization: &RawDiarization) {
        speakers::attach(sentences, diarization);
    }

    fn should_split(&self, word: &Word, next: Option<&Word>) -> bool {
        if STRONG_BOUNDARY.is_match(&word.text) {
            return true;
        }

        if let Some(next) = next {
            let gap_ms = ((next.start - word.end) * 1000.0) as i64;
            if gap_ms > self.config.max_gap_ms {
                return true;
            }
            if WEAK_BOUNDARY.is_match(&word.text) && gap_ms > self.config.weak_gap_ms {
                return true;
            }
        }

        false
    }
}
