//! Clip metadata generation
//!
//! Produces titles, captions, and hashtags for clip specifications.
//! An LLM path runs first when enabled, with strict response parsing;
//! every item has a deterministic keyword-based fallback, and nothing in
//! this crate ever fails the pipeline.

pub mod keywords;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clip_alignment::cleaner::clean_transcript;
use clip_llm::{GenerateOptions, LlmClient};
use clip_resource::ResourceGate;
use clip_segmentation::TopicSegment;

static INLINE_HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").unwrap());

const TITLE_PREFIXES: [&str; 8] = [
    "Title:",
    "title:",
    "TITLE:",
    "Here's the title:",
    "The title is:",
    "Generated title:",
    "Social media title:",
    "Hook title:",
];

const CAPTION_PREFIXES: [&str; 7] = [
    "Caption:",
    "caption:",
    "CAPTION:",
    "Here's the caption:",
    "The caption is:",
    "Generated caption:",
    "Social media caption:",
];

const PLATFORM_HASHTAGS: [&str; 6] = ["#fyp", "#viral", "#trending", "#shorts", "#reels", "#tiktok"];

const TOPIC_CATEGORIES: [(&str, [&str; 4]); 10] = [
    ("business", ["#business", "#entrepreneur", "#success", "#money"]),
    ("technology", ["#tech", "#innovation", "#ai", "#future"]),
    ("health", ["#health", "#wellness", "#fitness", "#lifestyle"]),
    ("education", ["#education", "#learning", "#knowledge", "#tips"]),
    ("entertainment", ["#entertainment", "#fun", "#comedy", "#viral"]),
    ("news", ["#news", "#breaking", "#current", "#update"]),
    ("sports", ["#sports", "#fitness", "#athlete", "#competition"]),
    ("travel", ["#travel", "#adventure", "#explore", "#wanderlust"]),
    ("food", ["#food", "#cooking", "#recipe", "#delicious"]),
    ("fashion", ["#fashion", "#style", "#outfit", "#trend"]),
];

/// How the metadata was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Llm,
    Fallback,
}

/// Generated metadata for one clip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMetadata {
    pub title: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub keywords: Vec<String>,
    pub method: GenerationMethod,
}

/// Metadata generator configuration
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub max_title_length: usize,
    pub max_hashtags: usize,
    /// Retries after the first failed LLM attempt
    pub llm_retries: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            max_title_length: 60,
            max_hashtags: 6,
            llm_retries: 2,
        }
    }
}

/// Connection settings for the metadata LLM path.
///
/// A fresh client (fresh connection pool) is built per attempt, so a
/// wedged connection never poisons the retries.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

/// Title/caption/hashtag generator
pub struct MetadataGenerator {
    config: MetadataConfig,
    llm: Option<LlmSettings>,
    gate: Arc<ResourceGate>,
}

impl MetadataGenerator {
    /// Build a generator; `llm: None` keeps everything on the fallback path
    #[must_use]
    pub fn new(config: MetadataConfig, llm: Option<LlmSettings>, gate: Arc<ResourceGate>) -> Self {
        Self { config, llm, gate }
    }

    /// Generate complete metadata for a segment. Never fails: the
    /// deterministic path covers every LLM outage.
    pub async fn generate(&self, segment: &TopicSegment) -> GeneratedMetadata {
        let text = clean_transcript(&segment.text());
        let keywords = keywords::extract_keywords(&text);

        let llm_title = self.generate_title_llm(segment).await;
        let llm_caption = self.generate_caption_llm(segment).await;
        let used_llm = llm_title.is_some() || llm_caption.is_some();

        let title = llm_title.unwrap_or_else(|| self.fallback_title(&text, &keywords));
        let caption = llm_caption.unwrap_or_else(|| self.fallback_caption(&text, &keywords));
        let hashtags = self.hashtags(&text, &keywords);

        GeneratedMetadata {
            title,
            caption,
            hashtags,
            keywords,
            method: if used_llm {
                GenerationMethod::Llm
            } else {
                GenerationMethod::Fallback
            },
        }
    }

    async fn generate_title_llm(&self, segment: &TopicSegment) -> Option<String> {
        let prompt = title_prompt(segment);
        let response = self.call_llm(&prompt).await?;
        let title = parse_title(&response)?;
        Some(self.truncate_title(&title))
    }

    async fn generate_caption_llm(&self, segment: &TopicSegment) -> Option<String> {
        let prompt = caption_prompt(segment);
        let response = self.call_llm(&prompt).await?;
        parse_caption(&response)
    }

    /// LLM call with slot acquisition and fresh-connection retries
    async fn call_llm(&self, prompt: &str) -> Option<String> {
        let settings = self.llm.as_ref()?;

        for attempt in 0..=self.config.llm_retries {
            let _slot = match self.gate.acquire_llm().await {
                Ok(slot) => slot,
                Err(err) => {
                    warn!(error = %err, attempt = attempt + 1, "LLM slot unavailable");
                    continue;
                }
            };

            let client = match LlmClient::new(&settings.host, &settings.model, settings.timeout) {
                Ok(client) => client,
                Err(err) => {
                    warn!(error = %err, "Failed to build LLM client");
                    return None;
                }
            };

            match client.generate(prompt, &GenerateOptions::creative()).await {
                Ok(response) => return Some(response),
                Err(err) => {
                    warn!(
                        error = %err,
                        attempt = attempt + 1,
                        attempts = self.config.llm_retries + 1,
                        "LLM metadata call failed"
                    );
                }
            }
        }

        debug!("All LLM attempts failed, using deterministic fallback");
        None
    }

    /// Deterministic title: question, imperative/claim sentence, keyword
    /// template, then the opening words.
    fn fallback_title(&self, text: &str, keywords: &[String]) -> String {
        let opening: String = text.chars().take(100).collect();
        let first_sentence = split_first_sentence(text);

        if opening.contains('?') {
            let question = format!("{}?", text.split('?').next().unwrap_or(""));
            let question = question.trim().to_string();
            if !question.is_empty() && question.len() <= self.config.max_title_length {
                return question;
            }
        }

        let lower = first_sentence.to_lowercase();
        let imperative = ["you need", "you should", "you must", "learn", "discover"]
            .iter()
            .any(|marker| lower.contains(marker));
        if imperative {
            return self.truncate_title(&first_sentence);
        }

        let has_key_phrase = keywords::ACTION_WORDS.is_match(&opening)
            || keywords::QUESTION_WORDS.is_match(&opening)
            || keywords::SUPERLATIVES.is_match(&opening);
        if has_key_phrase {
            return self.truncate_title(&first_sentence);
        }

        if let Some(first) = keywords.first() {
            let title = match keywords.get(1) {
                Some(second) => format!("The Truth About {first} and {second}"),
                None => format!("What You Need to Know About {first}"),
            };
            return self.truncate_title(&title);
        }

        let words: Vec<&str> = text.split_whitespace().take(8).collect();
        let title = words.join(" ");
        if title.is_empty() {
            "Worth A Listen".to_string()
        } else {
            self.truncate_title(&title)
        }
    }

    /// Deterministic caption: first one or two sentences, plus an
    /// engagement question when none is present.
    fn fallback_caption(&self, text: &str, keywords: &[String]) -> String {
        let sentences: Vec<&str> = text
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut caption = match sentences.len() {
            0 => {
                let short: String = text.chars().take(150).collect();
                if text.chars().count() > 150 {
                    format!("{short}...")
                } else {
                    short
                }
            }
            1 => format!("{}.", sentences[0]),
            _ => format!("{}. {}.", sentences[0], sentences[1]),
        };

        if let Some(keyword) = keywords.first() {
            if !caption.contains('?') {
                caption.push_str(&format!(
                    " What do you think about {}?",
                    keyword.to_lowercase()
                ));
            }
        }

        caption
    }

    /// Keyword tags, then topic-category tags, then platform tags; first
    /// `max_hashtags` in that order.
    fn hashtags(&self, text: &str, keywords: &[String]) -> Vec<String> {
        let mut hashtags: Vec<String> = Vec::new();

        for keyword in keywords.iter().take(3) {
            if let Some(tag) = keyword_to_hashtag(keyword) {
                if !hashtags.contains(&tag) {
                    hashtags.push(tag);
                }
            }
        }

        for tag in topic_hashtags(text) {
            if hashtags.len() >= self.config.max_hashtags {
                break;
            }
            if !hashtags.contains(&tag) {
                hashtags.push(tag);
            }
        }

        for tag in PLATFORM_HASHTAGS {
            if hashtags.len() >= self.config.max_hashtags {
                break;
            }
            let tag = tag.to_string();
            if !hashtags.contains(&tag) {
                hashtags.push(tag);
            }
        }

        hashtags.truncate(self.config.max_hashtags);
        hashtags
    }

    /// Truncate at a word boundary with an ellipsis
    fn truncate_title(&self, title: &str) -> String {
        let max = self.config.max_title_length;
        if title.chars().count() <= max {
            return title.to_string();
        }

        let truncated: String = title.chars().take(max.saturating_sub(3)).collect();
        match truncated.rfind(' ') {
            Some(pos) if pos > max / 2 => format!("{}...", &truncated[..pos]),
            _ => format!("{truncated}..."),
        }
    }
}

/// First sentence, cut at the earliest strong punctuation
fn split_first_sentence(text: &str) -> String {
    let mut sentence = text;
    for stop in ['.', '!', '?'] {
        if let Some(pos) = sentence.find(stop) {
            sentence = &sentence[..pos];
        }
    }
    sentence.trim().to_string()
}

/// Strip quotes and label prefixes; reject implausibly long titles
fn parse_title(response: &str) -> Option<String> {
    let mut title = response.trim().to_string();

    title = strip_quotes(&title);
    for prefix in TITLE_PREFIXES {
        if let Some(stripped) = title.strip_prefix(prefix) {
            title = stripped.trim().to_string();
        }
    }
    title = strip_quotes(&title);

    if title.is_empty() || title.chars().count() > 100 {
        return None;
    }
    Some(title)
}

/// Strip quotes, prefixes, and inline hashtags; accept 1-3 sentences
fn parse_caption(response: &str) -> Option<String> {
    let mut caption = response.trim().to_string();

    caption = strip_quotes(&caption);
    for prefix in CAPTION_PREFIXES {
        if let Some(stripped) = caption.strip_prefix(prefix) {
            caption = stripped.trim().to_string();
        }
    }
    caption = INLINE_HASHTAG.replace_all(&caption, "").trim().to_string();

    let sentence_count = caption.split('.').filter(|s| !s.trim().is_empty()).count();
    if sentence_count <= 3 && caption.len() > 10 {
        Some(caption)
    } else {
        None
    }
}

fn strip_quotes(text: &str) -> String {
    let trimmed = text.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Lowercased alphanumeric hashtag, at least 3 characters
fn keyword_to_hashtag(keyword: &str) -> Option<String> {
    let clean = NON_ALNUM.replace_all(&keyword.to_lowercase(), "").to_string();
    if clean.len() >= 3 {
        Some(format!("#{clean}"))
    } else {
        None
    }
}

/// Two tags from the first topic category whose keyword appears in text
fn topic_hashtags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    for (topic, tags) in TOPIC_CATEGORIES {
        if lower.contains(topic) {
            return tags.iter().take(2).map(|t| t.to_string()).collect();
        }
    }
    Vec::new()
}

fn title_prompt(segment: &TopicSegment) -> String {
    let text: String = segment.text().chars().take(300).collect();
    let duration_s = segment.duration_ms() as f64 / 1000.0;
    format!(
        "Create an engaging social media title for this video clip. The title should:\n\
         - Be maximum 60 characters\n\
         - Create curiosity or urgency\n\
         - Be suitable for platforms like TikTok, Instagram, YouTube Shorts\n\
         - Capture the main hook or key point\n\
         - Use active, engaging language\n\
         \n\
         Video clip ({duration_s:.1} seconds):\n\
         \"{text}\"\n\
         \n\
         Generate only the title, no explanation:"
    )
}

fn caption_prompt(segment: &TopicSegment) -> String {
    let text: String = segment.text().chars().take(400).collect();
    let duration_s = segment.duration_ms() as f64 / 1000.0;
    format!(
        "Create an engaging social media caption for this video clip. The caption should:\n\
         - Be 1-2 sentences maximum\n\
         - Provide context and hook viewers\n\
         - Be conversational and engaging\n\
         - Encourage engagement (comments, shares)\n\
         - Be suitable for TikTok, Instagram, YouTube Shorts\n\
         \n\
         Video clip ({duration_s:.1} seconds):\n\
         \"{text}\"\n\
         \n\
         Generate only the caption, no hashtags or explanation:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_common::{Sentence, Word};
    use clip_resource::{ResourceGate, ResourceLimits};

    fn segment_from(texts: &[&str]) -> TopicSegment {
        let sentences: Vec<Sentence> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let words: Vec<Word> = text
                    .split_whitespace()
                    .enumerate()
                    .map(|(j, w)| {
                        let start = i as f64 * 15.0 + j as f64 * 0.5;
                        Word::from_raw(w, start, start + 0.45, 0.9).unwrap()
                    })
                    .collect();
                Sentence::from_words(words).unwrap()
            })
            .collect();
        TopicSegment::new(sentences).unwrap()
    }

    fn generator() -> MetadataGenerator {
        MetadataGenerator::new(
            MetadataConfig::default(),
            None,
            Arc::new(ResourceGate::new(ResourceLimits::default())),
        )
    }

    #[tokio::test]
    async fn test_fallback_title_within_limit() {
        let generator = generator();
        let segment = segment_from(&[
            "you need to rethink how you plan your mornings every single week of the year.",
            "most people never review their own calendar habits honestly.",
        ]);

        let metadata = generator.generate(&segment).await;
        assert!(metadata.title.chars().count() <= 60);
        assert_eq!(metadata.method, GenerationMethod::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_caption_has_no_hashtags() {
        let generator = generator();
        let segment = segment_from(&[
            "the business pivot saved the business entirely.",
            "margins doubled within a quarter.",
        ]);

        let metadata = generator.generate(&segment).await;
        assert!(!metadata.caption.contains('#'));
        assert!(metadata.hashtags.len() <= 6);
    }

    #[tokio::test]
    async fn test_question_becomes_title() {
        let generator = generator();
        let segment = segment_from(&[
            "why do most diets fail in february?",
            "the answer is simpler than people admit.",
        ]);

        let metadata = generator.generate(&segment).await;
        assert_eq!(metadata.title, "why do most diets fail in february?");
    }

    #[tokio::test]
    async fn test_caption_appends_engagement_question() {
        let generator = generator();
        let segment = segment_from(&[
            "compounding rewards patience and compounding punishes urgency.",
            "the patience rewards arrive very late.",
        ]);

        let metadata = generator.generate(&segment).await;
        assert!(metadata.caption.contains('?'));
    }

    #[tokio::test]
    async fn test_topic_hashtags_from_category() {
        let generator = generator();
        let segment = segment_from(&[
            "running a business means watching the business cash flow.",
            "every business founder learns this eventually.",
        ]);

        let metadata = generator.generate(&segment).await;
        assert!(metadata.hashtags.iter().any(|t| t == "#business"));
    }

    #[test]
    fn test_parse_title_strips_decoration() {
        assert_eq!(
            parse_title("Title: \"The Hidden Cost of Meetings\"").as_deref(),
            Some("The Hidden Cost of Meetings")
        );
        assert_eq!(parse_title("   ").as_deref(), None);

        let long = "x".repeat(150);
        assert_eq!(parse_title(&long), None);
    }

    #[test]
    fn test_parse_caption_rejects_rambling() {
        let rambling = "One. Two. Three. Four. Five.";
        assert!(parse_caption(rambling).is_none());

        let good = "Here is a tight caption. It lands well.";
        assert_eq!(parse_caption(good).as_deref(), Some(good));
    }

    #[test]
    fn test_parse_caption_strips_inline_hashtags() {
        let caption = parse_caption("Wild story from the studio #podcast #fyp").unwrap();
        assert!(!caption.contains('#'));
    }

    #[test]
    fn test_keyword_to_hashtag() {
        assert_eq!(keyword_to_hashtag("Machine-Learning").as_deref(), Some("#machinelearning"));
        assert_eq!(keyword_to_hashtag("AI"), None);
        assert_eq!(keyword_to_hashtag("--"), None);
    }

    #[test]
    fn test_truncate_title_word_boundary() {
        let generator = generator();
        let long = "a very long title that keeps going well past the sixty character limit easily";
        let truncated = generator.truncate_title(long);
        assert!(truncated.chars().count() <= 60);
        assert!(truncated.ends_with("..."));
        assert!(!truncated.trim_end_matches("...").ends_with(' '));
    }

    #[test]
    fn test_split_first_sentence() {
        assert_eq!(split_first_sentence("Hello there. Next."), "Hello there");
        assert_eq!(split_first_sentence("What now? Later."), "What now");
        assert_eq!(split_first_sentence("no punctuation at all"), "no punctuation at all");
    }
}
