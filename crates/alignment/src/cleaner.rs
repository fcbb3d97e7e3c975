//! Transcript cleanup
//!
//! Whisper-style transcribers hallucinate under silence or music: the same
//! sentence repeated dozens of times, or a word stuttered with commas.
//! These helpers collapse the repetitions in the text view of a transcript.
//! Word-level timing is never touched.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)[^.!?]*[.!?]*").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static MANY_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([.,!?;:])").unwrap());

/// Apply all cleanup passes to raw transcript text
#[must_use]
pub fn clean_transcript(text: &str) -> String {
    let text = collapse_word_repetitions(text);
    let text = collapse_sentence_repetitions(&text, 2);

    let text = MULTI_SPACE.replace_all(&text, " ");
    let text = MANY_DOTS.replace_all(&text, "...");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    text.trim().to_string()
}

/// Collapse a sentence repeated more than `max_repeats` times in a row.
#[must_use]
pub fn collapse_sentence_repetitions(text: &str, max_repeats: usize) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut recent: Vec<String> = Vec::new();

    for piece in SENTENCE_SPLIT.find_iter(text) {
        let piece = piece.as_str().trim();
        if piece.is_empty() {
            continue;
        }

        let normalized = piece
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_lowercase();
        let window_start = recent.len().saturating_sub(max_repeats);
        if recent[window_start..].contains(&normalized) {
            continue;
        }

        kept.push(piece.to_string());
        recent.push(normalized);
        if recent.len() > max_repeats * 2 {
            recent.remove(0);
        }
    }

    kept.join(" ")
}

/// Collapse comma-separated single-word repetitions of 4+ ("no, no, no, no")
/// down to one occurrence. The regex crate has no backreferences, so this is
/// a plain token scan.
#[must_use]
pub fn collapse_word_repetitions(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());

    let mut i = 0;
    while i < tokens.len() {
        let base = tokens[i].trim_end_matches(',').to_lowercase();
        let mut run = 1;
        while i + run < tokens.len()
            && tokens[i + run - 1].ends_with(',')
            && tokens[i + run].trim_end_matches(',').to_lowercase() == base
        {
            run += 1;
        }

        if run >= 4 {
            out.push(tokens[i + run - 1]);
        } else {
            out.extend(&tokens[i..i + run]);
        }
        i += run;
    }

    out.join(" ")
}
