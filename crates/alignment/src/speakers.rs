//! Speaker attachment
//!
//! Maps diarization turns onto sentences by temporal overlap. Diarization
//! boundaries rarely line up with sentence boundaries, so assignment uses a
//! weighted overlap score with a ladder of fallbacks, then a context
//! post-pass for whatever is left unassigned.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use clip_common::{RawDiarization, RawSpeakerTurn, Sentence};

/// Overlap of one sentence with one diarization turn
struct SpeakerOverlap<'a> {
    speaker: &'a str,
    overlap_s: f64,
    sentence_ratio: f64,
    weighted: f64,
}

/// Attach speaker labels to sentences in place
pub fn attach(sentences: &mut [Sentence], diarization: &RawDiarization) {
    let turns = validate_turns(&diarization.segments);
    if turns.is_empty() {
        warn!("No valid speaker turns in diarization data");
        return;
    }

    let mut unassigned = 0usize;
    for sentence in sentences.iter_mut() {
        sentence.speaker = find_speaker(sentence, &turns).map(str::to_string);
        if sentence.speaker.is_none() {
            unassigned += 1;
        }
    }

    if unassigned > 0 {
        resolve_from_context(sentences);
    }

    let mut distribution: HashMap<&str, usize> = HashMap::new();
    for sentence in sentences.iter() {
        *distribution
            .entry(sentence.speaker.as_deref().unwrap_or("unknown"))
            .or_insert(0) += 1;
    }
    info!(
        sentences = sentences.len(),
        unassigned,
        speakers = distribution.len(),
        "Speaker attachment completed"
    );
}

/// Drop turns with missing or inverted timing, sort the rest by start
fn validate_turns(turns: &[RawSpeakerTurn]) -> Vec<RawSpeakerTurn> {
    let mut valid: Vec<RawSpeakerTurn> = turns
        .iter()
        .filter(|turn| {
            let ok = turn.start < turn.end && turn.start >= 0.0;
            if !ok {
                warn!(
                    start = turn.start,
                    end = turn.end,
                    speaker = %turn.speaker,
                    "Skipping invalid speaker turn"
                );
            }
            ok
        })
        .cloned()
        .collect();
    valid.sort_by(|a, b| a.start.total_cmp(&b.start));
    valid
}

/// Assignment ladder, first match wins:
/// 1. best sentence-overlap ratio >= 0.5
/// 2. ratio >= 0.3 and weighted score >= 0.4
/// 3. single candidate with ratio >= 0.1
/// 4. multiple candidates: largest absolute overlap
/// 5. no overlap: nearest turn center within 5 s
fn find_speaker<'a>(sentence: &Sentence, turns: &'a [RawSpeakerTurn]) -> Option<&'a str> {
    let start_s = sentence.start_ms as f64 / 1000.0;
    let end_s = sentence.end_ms as f64 / 1000.0;
    let duration_s = end_s - start_s;
    if duration_s <= 0.0 {
        warn!(
            start_ms = sentence.start_ms,
            end_ms = sentence.end_ms,
            "Invalid sentence duration"
        );
        return None;
    }

    let mut overlaps: Vec<SpeakerOverlap<'a>> = Vec::new();
    for turn in turns {
        let overlap_s = (end_s.min(turn.end) - start_s.max(turn.start)).max(0.0);
        if overlap_s <= 0.0 {
            continue;
        }
        let turn_duration = turn.end - turn.start;
        let sentence_ratio = overlap_s / duration_s;
        let turn_ratio = if turn_duration > 0.0 {
            overlap_s / turn_duration
        } else {
            0.0
        };
        overlaps.push(SpeakerOverlap {
            speaker: &turn.speaker,
            overlap_s,
            sentence_ratio,
            weighted: sentence_ratio * 0.7 + turn_ratio * 0.3,
        });
    }

    if overlaps.is_empty() {
        return nearest_speaker(start_s, end_s, turns);
    }

    overlaps.sort_by(|a, b| b.weighted.total_cmp(&a.weighted));
    let best = &overlaps[0];

    if best.sentence_ratio >= 0.5 {
        return Some(best.speaker);
    }
    if best.sentence_ratio >= 0.3 && best.weighted >= 0.4 {
        return Some(best.speaker);
    }
    if overlaps.len() == 1 && best.sentence_ratio >= 0.1 {
        debug!(
            speaker = best.speaker,
            ratio = best.sentence_ratio,
            "Weak speaker assignment"
        );
        return Some(best.speaker);
    }
    if overlaps.len() > 1 {
        // Sentence spans multiple speakers; take the dominant one
        return overlaps
            .iter()
            .max_by(|a, b| a.overlap_s.total_cmp(&b.overlap_s))
            .map(|o| o.speaker);
    }

    None
}

/// Nearest turn by center distance, within 5 seconds
fn nearest_speaker<'a>(start_s: f64, end_s: f64, turns: &'a [RawSpeakerTurn]) -> Option<&'a str> {
    let center = (start_s + end_s) / 2.0;

    let (speaker, distance) = turns
        .iter()
        .map(|turn| {
            let turn_center = (turn.start + turn.end) / 2.0;
            (turn.speaker.as_str(), (center - turn_center).abs())
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    if distance <= 5.0 {
        debug!(speaker, distance_s = distance, "Using nearest speaker fallback");
        Some(speaker)
    } else {
        None
    }
}

/// Second pass: fill unassigned sentences from neighbors, then from the
/// most common speaker within a 10 s window either way.
fn resolve_from_context(sentences: &mut [Sentence]) {
    for i in 0..sentences.len() {
        if sentences[i].speaker.is_some() {
            continue;
        }

        if i > 0 {
            if let Some(prev) = sentences[i - 1].speaker.clone() {
                if sentences[i].start_ms - sentences[i - 1].end_ms < 3000 {
                    sentences[i].speaker = Some(prev);
                    continue;
                }
            }
        }

        if i + 1 < sentences.len() {
            if let Some(next) = sentences[i + 1].speaker.clone() {
                if sentences[i + 1].start_ms - sentences[i].end_ms < 3000 {
                    sentences[i].speaker = Some(next);
                    continue;
                }
            }
        }

        let anchor = sentences[i].start_ms;
        let mut nearby: HashMap<String, usize> = HashMap::new();
        for other in sentences.iter() {
            if let Some(speaker) = &other.speaker {
                if (other.start_ms - anchor).abs() < 10_000 {
                    *nearby.entry(speaker.clone()).or_insert(0) += 1;
                }
            }
        }
        // Break count ties by name so the pass stays deterministic
        sentences[i].speaker = nearby
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(speaker, _)| speaker);
    }
}
