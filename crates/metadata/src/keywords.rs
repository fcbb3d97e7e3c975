//! Keyword extraction
//!
//! The deterministic backbone of metadata generation: high-frequency
//! meaningful terms, pattern-captured phrases (action verbs, question
//! words, superlatives, numbers, time references), and capitalized
//! tokens standing in for named entities. Used directly for hashtags and
//! as the fallback source for titles and captions.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

pub static ACTION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(learn|discover|find|get|make|create|build|start|stop|avoid|prevent|improve|increase|decrease)\b").unwrap()
});
pub static QUESTION_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(how|what|why|when|where|who|which)\b").unwrap());
pub static SUPERLATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(best|worst|top|bottom|first|last|biggest|smallest|most|least)\b").unwrap()
});
static NUMBERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").unwrap());
static TIME_REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(today|now|future|past|years?|months?|days?|minutes?|seconds?)\b").unwrap()
});
static CAPITALIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-z]{2,}\b").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());

pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
        "did", "will", "would", "could", "should", "may", "might", "can", "this", "that",
        "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
        "them",
    ]
    .into_iter()
    .collect()
});

/// Extract up to 10 keywords: frequency terms, pattern captures, and
/// capitalized tokens, deduplicated case-insensitively and sorted by
/// length descending then alphabetically.
#[must_use]
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    keywords.extend(frequency_keywords(text));
    keywords.extend(pattern_keywords(text));

    let mut unique: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for keyword in keywords {
        let lower = keyword.to_lowercase();
        if keyword.len() >= 3 && !STOP_WORDS.contains(lower.as_str()) && seen.insert(lower) {
            unique.push(keyword);
        }
    }

    unique.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
    });
    unique.truncate(10);
    unique
}

/// Meaningful words appearing at least twice, most common first
fn frequency_keywords(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for m in WORD.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if !STOP_WORDS.contains(word.as_str()) {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut frequent: Vec<(String, usize)> =
        counts.into_iter().filter(|&(_, count)| count >= 2).collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    frequent.into_iter().take(10).map(|(word, _)| word).collect()
}

/// Pattern-captured terms plus leading capitalized tokens
fn pattern_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();

    for pattern in [
        &*ACTION_WORDS,
        &*QUESTION_WORDS,
        &*SUPERLATIVES,
        &*NUMBERS,
        &*TIME_REFERENCES,
    ] {
        for m in pattern.find_iter(text) {
            keywords.push(m.as_str().to_string());
        }
    }

    keywords.extend(
        CAPITALIZED
            .find_iter(text)
            .take(5)
            .map(|m| m.as_str().to_string()),
    );

    keywords
}
