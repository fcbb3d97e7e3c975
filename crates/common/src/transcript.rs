//! Input contract for transcripts handed over by the transcription stage
//!
//! Upstream transcribers disagree on field names (`word` vs `text`,
//! `probability` vs `confidence`) and on whether per-word timing exists at
//! all. Everything is normalized here into a single schema-checked struct
//! before the pipeline sees it.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Word;

/// Word-level entry as produced by the transcriber
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWord {
    /// Word text; some transcribers emit `word`, others `text`
    #[serde(alias = "word")]
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Recognition confidence; some transcribers emit `probability`
    #[serde(default, alias = "probability")]
    pub confidence: f64,
}

/// Coarse transcription segment, used when word timing is absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<RawWord>,
}

/// One speaker turn from diarization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Diarization output: who spoke when
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDiarization {
    #[serde(default)]
    pub segments: Vec<RawSpeakerTurn>,
}

/// Complete transcript for one episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTranscript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<RawWord>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
    #[serde(default)]
    pub diarization: Option<RawDiarization>,
}

impl RawTranscript {
    /// Whether the transcript carries any usable timing data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    /// Normalize to validated `Word` values.
    ///
    /// Prefers word-level timing. When only segments are available, timing
    /// is synthesized by dividing each segment's duration uniformly across
    /// its words, marked with confidence 0.5. Words that fail validation
    /// are skipped with a warning rather than failing the episode.
    pub fn to_words(&self) -> Vec<Word> {
        if !self.words.is_empty() {
            return self
                .words
                .iter()
                .filter_map(|raw| {
                    match Word::from_raw(&raw.text, raw.start, raw.end, raw.confidence) {
                        Ok(word) => Some(word),
                        Err(err) => {
                            tracing::warn!(text = %raw.text, error = %err, "Skipping invalid word");
                            None
                        }
                    }
                })
                .collect();
        }

        let mut words = Vec::new();
        for segment in &self.segments {
            if !segment.words.is_empty() {
                for raw in &segment.words {
                    match Word::from_raw(&raw.text, raw.start, raw.end, raw.confidence) {
                        Ok(word) => words.push(word),
                        Err(err) => {
                            tracing::warn!(text = %raw.text, error = %err, "Skipping invalid word")
                        }
                    }
                }
            } else if let Ok(estimated) = estimate_word_timing(&segment.text, segment.start, segment.end)
            {
                words.extend(estimated);
            }
        }
        words
    }
}

/// Synthesize per-word timing by dividing a segment uniformly
fn estimate_word_timing(text: &str, start: f64, end: f64) -> Result<Vec<Word>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let word_duration = (end - start).max(0.0) / tokens.len() as f64;
    let mut words = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        let word_start = start + i as f64 * word_duration;
        words.push(Word::from_raw(
            token,
            word_start,
            word_start + word_duration,
            0.5,
        )?);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_field_aliases() {
        let json = r#"{"word": "hello", "start": 0.0, "end": 0.5, "probability": 0.93}"#;
        let raw: RawWord = serde_json::from_str(json).unwrap();
        assert_eq!(raw.text, "hello");
        assert!((raw.confidence - 0.93).abs() < 1e-9);
    }

    #[test]
    fn test_to_words_prefers_word_timing() {
        let transcript = RawTranscript {
            words: vec![RawWord {
                text: "hi".to_string(),
                start: 0.0,
                end: 0.4,
                confidence: 0.8,
            }],
            segments: vec![RawSegment {
                start: 0.0,
                end: 10.0,
                text: "this should be ignored".to_string(),
                words: Vec::new(),
            }],
            ..Default::default()
        };

        let words = transcript.to_words();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "hi");
    }

    #[test]
    fn test_to_words_synthesizes_timing_from_segments() {
        let transcript = RawTranscript {
            segments: vec![RawSegment {
                start: 0.0,
                end: 4.0,
                text: "one two three four".to_string(),
                words: Vec::new(),
            }],
            ..Default::default()
        };

        let words = transcript.to_words();
        assert_eq!(words.len(), 4);
        assert!((words[0].end - 1.0).abs() < 1e-9);
        assert!((words[3].start - 3.0).abs() < 1e-9);
        assert!(words.iter().all(|w| (w.confidence - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_invalid_words_are_skipped() {
        let transcript = RawTranscript {
            words: vec![
                RawWord {
                    text: "  ".to_string(),
                    start: 0.0,
                    end: 0.2,
                    confidence: 0.9,
                },
                RawWord {
                    text: "kept".to_string(),
                    start: 0.3,
                    end: 0.6,
                    confidence: 0.9,
                },
            ],
            ..Default::default()
        };

        let words = transcript.to_words();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "kept");
    }

    #[test]
    fn test_empty_detection() {
        assert!(RawTranscript::default().is_empty());
    }
}
