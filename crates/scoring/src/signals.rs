//! Heuristic scoring signals
//!
//! Five fast, local signals over segment text: hook phrases, named-entity
//! density, sentiment peaks, question/answer patterns, and a compression
//! proxy over word count. Each signal yields a value in [0, 1].

use once_cell::sync::Lazy;
use regex::Regex;

use clip_segmentation::TopicSegment;

/// Pluggable named-entity tagger.
///
/// Returns `(entity_count, distinct_type_count)` over the types worth
/// counting (people, organizations, places, money, dates, events), or
/// `None` when the tagger cannot process the text. Without a tagger the
/// scorer falls back to a capitalization heuristic.
pub trait EntityTagger: Send + Sync {
    fn tag(&self, text: &str) -> Option<(usize, usize)>;
}

/// Pluggable sentiment analyzer: `(polarity in [-1, 1], subjectivity in [0, 1])`
pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> (f64, f64);
}

static HOOK_IMPERATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(you need to|you should|you must|you have to|let me tell you|here's what|listen|look)\b").unwrap()
});
static HOOK_CLAIMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(the truth is|the fact is|what really happens|the reality is|here's the thing|the problem is)\b").unwrap()
});
static HOOK_STATISTICS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d+%|\d+\s*percent|\d+\s*times|statistics show|studies show|research shows)").unwrap()
});
static HOOK_SUPERLATIVES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(most|best|worst|biggest|smallest|fastest|slowest|never|always|everyone|nobody)\b").unwrap()
});
static HOOK_CONTROVERSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(controversial|shocking|surprising|unbelievable|incredible|amazing|terrible|awful)\b").unwrap()
});

static QUESTION_DIRECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?").unwrap());
static QUESTION_RHETORICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(why|how|what|when|where|who)\b.*\?").unwrap());
static QUESTION_LEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(did you know|have you ever|can you imagine|what if)\b").unwrap()
});

static ANSWER_DEFINITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(the answer is|it turns out|actually|in fact|basically|essentially)\b")
        .unwrap()
});
static ANSWER_EXPLANATORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(because|since|due to|as a result|therefore|so)\b").unwrap());

static EMPHASIS_CAPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,}\b").unwrap());
static INTENSIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(very|really|extremely|incredibly|absolutely|totally|completely)\b")
        .unwrap()
});

static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

const EMOTIONAL_WORDS: [&str; 14] = [
    "amazing",
    "incredible",
    "shocking",
    "unbelievable",
    "fantastic",
    "terrible",
    "awful",
    "horrible",
    "wonderful",
    "brilliant",
    "devastating",
    "heartbreaking",
    "inspiring",
    "motivating",
];

/// Kind of question, used to weight the following answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionKind {
    Direct,
    Rhetorical,
    Leading,
}

fn question_kind(sentence: &str) -> Option<QuestionKind> {
    if QUESTION_DIRECT.is_match(sentence) {
        Some(QuestionKind::Direct)
    } else if QUESTION_RHETORICAL.is_match(sentence) {
        Some(QuestionKind::Rhetorical)
    } else if QUESTION_LEADING.is_match(sentence) {
        Some(QuestionKind::Leading)
    } else {
        None
    }
}

/// Hook score over the opening of the segment.
///
/// Each matched hook class contributes its own weight, with a bonus for
/// multiple classes and for a digit in the first sentence.
#[must_use]
pub fn hook_score(text: &str) -> f64 {
    let opening: String = text.chars().take(100).collect::<String>().to_lowercase();

    let mut score: f64 = 0.0;
    let mut matched = 0;

    for (pattern, weight) in [
        (&*HOOK_IMPERATIVE, 0.40),
        (&*HOOK_CLAIMS, 0.35),
        (&*HOOK_STATISTICS, 0.30),
        (&*HOOK_SUPERLATIVES, 0.20),
        (&*HOOK_CONTROVERSY, 0.25),
    ] {
        if pattern.is_match(&opening) {
            score += weight;
            matched += 1;
        }
    }

    if matched > 1 {
        score += 0.1;
    }

    let first_sentence: String = match text.find('.') {
        Some(pos) => text[..pos].to_string(),
        None => text.chars().take(200).collect(),
    };
    if DIGIT.is_match(&first_sentence) {
        score += 0.1;
    }

    score.min(1.0)
}

/// Entity density, via the tagger when present, else a capitalization
/// heuristic.
#[must_use]
pub fn entity_score(text: &str, tagger: Option<&dyn EntityTagger>) -> f64 {
    let word_count = text.split_whitespace().count();
    if word_count == 0 {
        return 0.0;
    }

    if let Some((entities, types)) = tagger.and_then(|t| t.tag(text)) {
        let density = entities as f64 / word_count as f64;
        let base = (density * 10.0).min(1.0);
        let diversity = (types as f64 * 0.05).min(0.2);
        return (base + diversity).min(1.0);
    }

    // No model: capitalized words and digit-bearing tokens stand in for
    // named entities, with a slightly lower multiplier.
    let mut estimated = 0usize;
    for word in text.split_whitespace() {
        let capitalized =
            word.chars().next().is_some_and(char::is_uppercase) && word.chars().count() > 1;
        let has_digit = word.chars().any(|c| c.is_ascii_digit());
        if capitalized || has_digit {
            estimated += 1;
        }
    }

    (estimated as f64 / word_count as f64 * 8.0).min(1.0)
}

/// Sentiment peaks: emphasis markers, optional analyzer output, and a
/// curated emotional-word list.
#[must_use]
pub fn sentiment_score(text: &str, analyzer: Option<&dyn SentimentAnalyzer>) -> f64 {
    let mut score = 0.0;

    let caps = EMPHASIS_CAPS.find_iter(text).count();
    score += (caps as f64 * 0.1).min(0.3);

    let repetitions = adjacent_repetitions(text);
    score += (repetitions as f64 * 0.1).min(0.2);

    let intensifiers = INTENSIFIERS.find_iter(text).count();
    score += (intensifiers as f64 * 0.05).min(0.25);

    if let Some(analyzer) = analyzer {
        let (polarity, subjectivity) = analyzer.analyze(text);
        score += polarity.abs() * 0.4 + subjectivity * 0.2;
    }

    let lower = text.to_lowercase();
    let emotional = EMOTIONAL_WORDS
        .iter()
        .filter(|word| lower.contains(*word))
        .count();
    score += (emotional as f64 * 0.1).min(0.3);

    score.min(1.0)
}

/// Adjacent duplicated words ("the the"); backreferences are unsupported
/// by the regex engine, so this is a token scan.
fn adjacent_repetitions(text: &str) -> usize {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();

    words
        .windows(2)
        .filter(|pair| !pair[0].is_empty() && pair[0] == pair[1])
        .count()
}

/// Question/answer structure across the segment's sentences
#[must_use]
pub fn qa_score(segment: &TopicSegment) -> f64 {
    let sentences: Vec<&str> = segment.sentences.iter().map(|s| s.text.as_str()).collect();
    if sentences.len() < 2 {
        return 0.0;
    }

    let mut score = 0.0;

    for pair in sentences.windows(2) {
        let Some(kind) = question_kind(pair[0]) else {
            continue;
        };

        let mut answer = if ANSWER_DEFINITIVE.is_match(pair[1]) {
            0.4
        } else if ANSWER_EXPLANATORY.is_match(pair[1]) {
            0.3
        } else {
            // A statement after a question still pays off the setup
            0.2
        };

        match kind {
            QuestionKind::Rhetorical => answer *= 1.2,
            QuestionKind::Leading => answer *= 1.1,
            QuestionKind::Direct => {}
        }

        score += answer;
    }

    if question_kind(sentences[0]).is_some() {
        score += 0.2;
    }

    let question_count = sentences
        .iter()
        .filter(|s| question_kind(s).is_some())
        .count();
    if question_count > 1 {
        score += ((question_count - 1) as f64 * 0.1).min(0.2);
    }

    score.min(1.0)
}

/// Compression proxy: focused segments in the 50-150 word range clip best
#[must_use]
pub fn compression_score(word_count: usize) -> f64 {
    match word_count {
        0 => 0.0,
        1..=50 => 0.6,
        51..=100 => 1.0,
        101..=150 => 0.8,
        151..=200 => 0.6,
        _ => 0.4,
    }
}

/// Small polarity/subjectivity lexicon, standing in for a full sentiment
/// model. Deterministic and dependency-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentiment;

const POSITIVE: [&str; 12] = [
    "amazing",
    "great",
    "excellent",
    "wonderful",
    "fantastic",
    "love",
    "brilliant",
    "inspiring",
    "best",
    "success",
    "happy",
    "incredible",
];

const NEGATIVE: [&str; 12] = [
    "terrible",
    "awful",
    "horrible",
    "worst",
    "hate",
    "failure",
    "devastating",
    "heartbreaking",
    "bad",
    "wrong",
    "problem",
    "shocking",
];

impl SentimentAnalyzer for LexiconSentiment {
    fn analyze(&self, text: &str) -> (f64, f64) {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .collect();
        if words.is_empty() {
            return (0.0, 0.0);
        }

        let positive = words.iter().filter(|w| POSITIVE.contains(&w.as_str())).count();
        let negative = words.iter().filter(|w| NEGATIVE.contains(&w.as_str())).count();
        let charged = positive + negative;
        if charged == 0 {
            return (0.0, 0.0);
        }

        let polarity = (positive as f64 - negative as f64) / charged as f64;
        let subjectivity = (charged as f64 / words.len() as f64 * 5.0).min(1.0);
        (polarity, subjectivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_common::{Sentence, Word};

    fn segment_from(texts: &[&str]) -> TopicSegment {
        let sentences: Vec<Sentence> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let words: Vec<Word> = text
                    .split_whitespace()
                    .enumerate()
                    .map(|(j, w)| {
                        let start = i as f64 * 10.0 + j as f64 * 0.4;
                        Word::from_raw(w, start, start + 0.35, 0.9).unwrap()
                    })
                    .collect();
                Sentence::from_words(words).unwrap()
            })
            .collect();
        TopicSegment::new(sentences).unwrap()
    }

    #[test]
    fn test_hook_imperative_beats_plain_text() {
        let hooked = hook_score("you need to hear this before investing");
        let plain = hook_score("we talked for a while and then moved on");
        assert!(hooked > plain);
        assert!((hooked - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_hook_multiple_classes_get_bonus() {
        // Imperative + claim + bonus
        let score = hook_score("you need to know the truth is out there");
        assert!((score - (0.4 + 0.35 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_hook_statistics_and_digit_bonus() {
        let score = hook_score("studies show 75% of people get this wrong.");
        // statistics class + digit in first sentence
        assert!(score >= 0.4);
    }

    #[test]
    fn test_hook_caps_at_one() {
        let score =
            hook_score("you need to know the truth is shocking statistics show 90% never always");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_entity_fallback_counts_capitalized_and_digits() {
        let dense = entity_score("Alice met Bob at Google in 2019 with Satya", None);
        let sparse = entity_score("we just talked about random stuff for a while", None);
        assert!(dense > sparse);
        assert_eq!(sparse, 0.0);
    }

    #[test]
    fn test_entity_tagger_path() {
        struct Fixed;
        impl EntityTagger for Fixed {
            fn tag(&self, _text: &str) -> Option<(usize, usize)> {
                Some((4, 3))
            }
        }

        // 10 words, 4 entities, 3 types: base 0.4 + diversity 0.15
        let score = entity_score("one two three four five six seven eight nine ten", Some(&Fixed));
        assert!((score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_sentiment_emphasis_markers() {
        let loud = sentiment_score("this is REALLY IMPORTANT and absolutely incredible", None);
        let flat = sentiment_score("we discussed the quarterly schedule", None);
        assert!(loud > flat);
    }

    #[test]
    fn test_sentiment_with_lexicon_analyzer() {
        let analyzer = LexiconSentiment;
        let charged = sentiment_score("this is a terrible awful failure", Some(&analyzer));
        let neutral = sentiment_score("the meeting starts at noon", Some(&analyzer));
        assert!(charged > neutral);
    }

    #[test]
    fn test_adjacent_repetitions() {
        assert_eq!(adjacent_repetitions("the the same word"), 1);
        assert_eq!(adjacent_repetitions("all distinct words here"), 0);
    }

    #[test]
    fn test_qa_pair_scores() {
        let with_qa = segment_from(&[
            "why does this keep happening to everyone?",
            "it turns out the answer is simpler than you think",
        ]);
        let without = segment_from(&[
            "we kept going for a while",
            "and then the show wrapped up",
        ]);

        assert!(qa_score(&with_qa) > qa_score(&without));
        assert_eq!(qa_score(&without), 0.0);
    }

    #[test]
    fn test_qa_leading_question_bonus() {
        let segment = segment_from(&[
            "have you ever wondered about this",
            "because the reasons are fascinating",
        ]);
        // leading question (0.3 explanatory * 1.1) + first-sentence bonus
        let score = qa_score(&segment);
        assert!((score - (0.3 * 1.1 + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_qa_single_sentence_is_zero() {
        let segment = segment_from(&["is this a question?"]);
        assert_eq!(qa_score(&segment), 0.0);
    }

    #[test]
    fn test_compression_step_function() {
        assert_eq!(compression_score(0), 0.0);
        assert_eq!(compression_score(40), 0.6);
        assert_eq!(compression_score(80), 1.0);
        assert_eq!(compression_score(120), 0.8);
        assert_eq!(compression_score(180), 0.6);
        assert_eq!(compression_score(500), 0.4);
    }

    #[test]
    fn test_lexicon_polarity_direction() {
        let analyzer = LexiconSentiment;
        let (positive, _) = analyzer.analyze("what an amazing wonderful success");
        let (negative, _) = analyzer.analyze("a terrible horrible failure");
        assert!(positive > 0.0);
        assert!(negative < 0.0);
    }
}
