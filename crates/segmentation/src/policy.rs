//! Segment duration policy
//!
//! Merges segments below the minimum duration into neighbors (forward
//! leaning) and splits segments above the maximum at natural points.
//! A single segment shorter than the minimum with no merge partner is
//! kept as-is: it means the whole episode is that short.

use tracing::{debug, info};

use clip_common::Result;

use crate::{SegmenterConfig, TopicSegment};

/// Apply the duration policy: merge short, then split long
pub fn apply_duration_policy(
    segments: Vec<TopicSegment>,
    config: &SegmenterConfig,
) -> Result<Vec<TopicSegment>> {
    if segments.is_empty() {
        return Ok(segments);
    }

    let merged = merge_short(segments, config)?;
    split_long(merged, config)
}

/// Merge short segments left-to-right, repeating until no segment is
/// short or no merge makes progress.
fn merge_short(
    mut segments: Vec<TopicSegment>,
    config: &SegmenterConfig,
) -> Result<Vec<TopicSegment>> {
    loop {
        let before = segments.len();
        segments = merge_short_pass(segments, config)?;
        let still_short = segments
            .iter()
            .any(|s| s.duration_ms() < config.min_duration_ms);
        if !still_short || segments.len() == before {
            break;
        }
    }
    Ok(segments)
}

fn merge_short_pass(
    segments: Vec<TopicSegment>,
    config: &SegmenterConfig,
) -> Result<Vec<TopicSegment>> {
    if segments.len() <= 1 {
        return Ok(segments);
    }

    let mut merged: Vec<TopicSegment> = Vec::with_capacity(segments.len());
    let mut i = 0;

    while i < segments.len() {
        let current = &segments[i];

        if current.duration_ms() >= config.min_duration_ms {
            merged.push(current.clone());
            i += 1;
            continue;
        }

        match merge_candidate(&segments, i, config) {
            Some(target) if target > i => {
                // Merge current through target into one segment
                let mut sentences = Vec::new();
                for segment in &segments[i..=target] {
                    sentences.extend(segment.sentences.iter().cloned());
                }
                let combined = TopicSegment::new(sentences)?;
                debug!(
                    from = i,
                    to = target,
                    duration_ms = combined.duration_ms(),
                    "Merged short segment forward"
                );
                merged.push(combined);
                i = target + 1;
            }
            Some(_) if !merged.is_empty() => {
                // Merge into the previous (already emitted) segment
                let previous = merged.pop().expect("checked non-empty");
                let mut sentences = previous.sentences;
                sentences.extend(current.sentences.iter().cloned());
                let combined = TopicSegment::new(sentences)?;
                debug!(
                    duration_ms = combined.duration_ms(),
                    "Merged short segment into previous"
                );
                merged.push(combined);
                i += 1;
            }
            _ => {
                // No merge partner; keep the short segment
                debug!(
                    duration_ms = current.duration_ms(),
                    "Keeping short segment (no merge candidate)"
                );
                merged.push(current.clone());
                i += 1;
            }
        }
    }

    info!(
        input_segments = segments.len(),
        output_segments = merged.len(),
        "Short segment merging completed"
    );

    Ok(merged)
}

/// Pick the merge target for the short segment at `index`.
///
/// Prefers the next segment when the combination stays under the maximum,
/// then the next two, then the previous segment.
fn merge_candidate(
    segments: &[TopicSegment],
    index: usize,
    config: &SegmenterConfig,
) -> Option<usize> {
    let current = &segments[index];

    if index + 1 < segments.len() {
        let next = &segments[index + 1];
        let combined = current.duration_ms() + next.duration_ms();
        if combined <= config.max_duration_ms {
            return Some(index + 1);
        }

        if next.duration_ms() < config.min_duration_ms && index + 2 < segments.len() {
            let triple = combined + segments[index + 2].duration_ms();
            if triple <= config.max_duration_ms {
                return Some(index + 2);
            }
        }
    }

    if index > 0 {
        return Some(index - 1);
    }

    None
}

/// Split every segment above the maximum duration
fn split_long(
    segments: Vec<TopicSegment>,
    config: &SegmenterConfig,
) -> Result<Vec<TopicSegment>> {
    let mut result = Vec::with_capacity(segments.len());

    for segment in segments {
        if segment.duration_ms() <= config.max_duration_ms {
            result.push(segment);
        } else {
            let original_duration = segment.duration_ms();
            let pieces = split_segment(segment, config)?;
            debug!(
                original_duration_ms = original_duration,
                pieces = pieces.len(),
                "Split long segment"
            );
            result.extend(pieces);
        }
    }

    Ok(result)
}

/// Split one over-long segment.
///
/// Aims at 75% of the maximum, force-splits at 90%, and from 80% of the
/// target onward takes any natural point: a speaker change, a silence gap
/// over 2 s, or strong sentence-final punctuation. A too-short tail is
/// merged back into the previous piece.
fn split_segment(segment: TopicSegment, config: &SegmenterConfig) -> Result<Vec<TopicSegment>> {
    let sentences = segment.sentences;
    let target = config.max_duration_ms as f64 * 0.75;
    let force_at = config.max_duration_ms as f64 * 0.9;

    let mut pieces: Vec<TopicSegment> = Vec::new();
    let mut current: Vec<clip_common::Sentence> = Vec::new();
    let mut current_start_ms = sentences[0].start_ms;

    for (i, sentence) in sentences.iter().enumerate() {
        current.push(sentence.clone());
        let duration = (sentence.end_ms - current_start_ms) as f64;

        let should_split = if current.len() > 1 && duration >= target {
            true
        } else if current.len() > 1 && duration >= force_at {
            true
        } else {
            duration >= target * 0.8 && natural_split_point(&sentences, i)
        };

        if should_split && duration >= config.min_duration_ms as f64 {
            pieces.push(TopicSegment::new(std::mem::take(&mut current))?);
            if let Some(next) = sentences.get(i + 1) {
                current_start_ms = next.start_ms;
            }
        }
    }

    if !current.is_empty() {
        let tail_duration = current.last().expect("non-empty").end_ms - current_start_ms;
        if tail_duration < config.min_duration_ms && !pieces.is_empty() {
            // Tail too short: fold it back into the previous piece
            let previous = pieces.pop().expect("checked non-empty");
            let mut sentences = previous.sentences;
            sentences.extend(current);
            pieces.push(TopicSegment::new(sentences)?);
        } else {
            pieces.push(TopicSegment::new(current)?);
        }
    }

    Ok(pieces)
}

/// Natural split points: speaker change, silence over 2 s, or strong
/// punctuation at the sentence end. Never at the segment edges.
fn natural_split_point(sentences: &[clip_common::Sentence], index: usize) -> bool {
    if index == 0 || index + 1 >= sentences.len() {
        return false;
    }

    let sentence = &sentences[index];
    let next = &sentences[index + 1];

    if let (Some(a), Some(b)) = (&sentence.speaker, &next.speaker) {
        if a != b {
            return true;
        }
    }

    if next.start_ms - sentence.end_ms > 2000 {
        return true;
    }

    sentence
        .text
        .trim_end()
        .ends_with(['.', '!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_common::{Sentence, Word};

    fn sentence(text: &str, start_s: f64, end_s: f64) -> Sentence {
        Sentence::from_words(vec![Word::from_raw(text, start_s, end_s, 0.9).unwrap()]).unwrap()
    }

    fn segment(start_s: f64, end_s: f64) -> TopicSegment {
        TopicSegment::new(vec![sentence("text", start_s, end_s)]).unwrap()
    }

    fn config() -> SegmenterConfig {
        SegmenterConfig::default()
    }

    #[test]
    fn test_short_merges_with_next() {
        let segments = vec![segment(0.0, 12.0), segment(12.0, 52.0)];
        let merged = apply_duration_policy(segments, &config()).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].duration_ms(), 52_000);
    }

    #[test]
    fn test_short_tail_merges_with_previous() {
        // Last segment short; next-merge impossible, so it goes backward
        let segments = vec![segment(0.0, 110.0), segment(110.0, 118.0)];
        let merged = apply_duration_policy(segments, &config()).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].duration_ms(), 118_000);
    }

    #[test]
    fn test_adequate_segments_untouched() {
        let segments = vec![segment(0.0, 40.0), segment(40.0, 90.0)];
        let result = apply_duration_policy(segments, &config()).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_single_short_segment_kept() {
        let segments = vec![segment(0.0, 9.0)];
        let result = apply_duration_policy(segments, &config()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].duration_ms(), 9_000);
    }

    #[test]
    fn test_long_segment_is_split() {
        // 300 s of 10 s sentences ending with periods
        let sentences: Vec<Sentence> = (0..30)
            .map(|i| sentence("words end.", i as f64 * 10.0, i as f64 * 10.0 + 9.8))
            .collect();
        let long = TopicSegment::new(sentences).unwrap();

        let pieces = apply_duration_policy(vec![long], &config()).unwrap();
        assert!(pieces.len() >= 2);
        for piece in &pieces {
            assert!(piece.duration_ms() <= 120_000, "piece {} ms", piece.duration_ms());
            assert!(piece.duration_ms() >= 20_000);
        }
    }

    #[test]
    fn test_split_prefers_silence_gap() {
        // 150 s total with a 3 s silence at 80 s; no punctuation
        let mut sentences = Vec::new();
        for i in 0..8 {
            sentences.push(sentence("no punct", i as f64 * 10.0, i as f64 * 10.0 + 9.8));
        }
        // gap: previous ends 79.8, next starts 83.0
        for i in 0..7 {
            sentences.push(sentence("tail part", 83.0 + i as f64 * 10.0, 83.0 + i as f64 * 10.0 + 9.8));
        }
        let long = TopicSegment::new(sentences).unwrap();

        let pieces = apply_duration_policy(vec![long], &config()).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].end_ms, 79_800);
        assert_eq!(pieces[1].start_ms, 83_000);
    }

    #[test]
    fn test_short_tail_folds_back() {
        // 210 s of 10 s sentences, no natural points: splits land at
        // ~100 s and ~200 s, leaving a 10 s tail that must fold back.
        let sentences: Vec<Sentence> = (0..21)
            .map(|i| sentence("plain words", i as f64 * 10.0, i as f64 * 10.0 + 9.8))
            .collect();
        let long = TopicSegment::new(sentences).unwrap();

        let pieces = apply_duration_policy(vec![long], &config()).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].end_ms, 209_800);
        for piece in &pieces {
            assert!(piece.duration_ms() >= 20_000);
            assert!(piece.duration_ms() <= 120_000);
        }
    }
}
