/// Common types and utilities for episode clip discovery
pub mod error;
pub mod transcript;

pub use error::{PipelineError, Result};
pub use transcript::{RawDiarization, RawSpeakerTurn, RawTranscript, RawWord};

use serde::{Deserialize, Serialize};

/// A single transcribed word with timing in float seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

impl Word {
    /// Construct a validated word from raw transcription data.
    ///
    /// Rejects empty text and inverted timestamps; both show up in
    /// real transcripts and must not reach the aligner.
    pub fn from_raw(text: &str, start: f64, end: f64, confidence: f64) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::Validation {
                field: "word.text".to_string(),
                message: "empty word text".to_string(),
            });
        }
        if end < start {
            return Err(PipelineError::Validation {
                field: "word.end".to_string(),
                message: format!("end {end} precedes start {start}"),
            });
        }
        Ok(Self {
            text: text.to_string(),
            start,
            end,
            confidence,
        })
    }

    /// Word duration in seconds
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A sentence assembled from consecutive words, with optional speaker label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub words: Vec<Word>,
    pub speaker: Option<String>,
    pub confidence: f64,
}

impl Sentence {
    /// Build a sentence from a non-empty run of words.
    ///
    /// Timing is derived from the first and last word; confidence is the
    /// mean of word confidences.
    pub fn from_words(words: Vec<Word>) -> Result<Self> {
        let Some(first) = words.first() else {
            return Err(PipelineError::Validation {
                field: "sentence.words".to_string(),
                message: "cannot build a sentence from zero words".to_string(),
            });
        };
        let last = words.last().expect("non-empty checked above");

        let start_ms = (first.start * 1000.0) as i64;
        let end_ms = (last.end * 1000.0) as i64;
        if end_ms <= start_ms {
            return Err(PipelineError::Validation {
                field: "sentence.end_ms".to_string(),
                message: format!("end_ms {end_ms} does not exceed start_ms {start_ms}"),
            });
        }

        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence = words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64;

        Ok(Self {
            text,
            start_ms,
            end_ms,
            words,
            speaker: None,
            confidence,
        })
    }

    /// Sentence duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Render status of a persisted clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Rendered,
    Failed,
}

impl ClipStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rendered => "rendered",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word::from_raw(text, start, end, 0.9).unwrap()
    }

    #[test]
    fn test_word_rejects_empty_text() {
        assert!(Word::from_raw("   ", 0.0, 1.0, 0.9).is_err());
    }

    #[test]
    fn test_word_rejects_inverted_timing() {
        assert!(Word::from_raw("hello", 2.0, 1.0, 0.9).is_err());
    }

    #[test]
    fn test_sentence_from_words() {
        let sentence =
            Sentence::from_words(vec![word("hello", 1.0, 1.4), word("world.", 1.5, 2.0)]).unwrap();

        assert_eq!(sentence.text, "hello world.");
        assert_eq!(sentence.start_ms, 1000);
        assert_eq!(sentence.end_ms, 2000);
        assert_eq!(sentence.duration_ms(), 1000);
        assert!(sentence.speaker.is_none());
        assert!((sentence.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_sentence_requires_words() {
        assert!(Sentence::from_words(Vec::new()).is_err());
    }

    #[test]
    fn test_clip_status_serialization() {
        let json = serde_json::to_string(&ClipStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        assert_eq!(ClipStatus::Rendered.as_str(), "rendered");
    }
}
