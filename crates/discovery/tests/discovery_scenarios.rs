//! End-to-end discovery scenarios
//!
//! These tests drive the full pipeline with the LLM disabled and no
//! embedding model on disk, so the deterministic fallback paths carry
//! every stage. That keeps the suite hermetic: same input, same clips.

use std::path::Path;

use tempfile::TempDir;

use clip_alignment::SentenceAligner;
use clip_common::{RawDiarization, RawSpeakerTurn, RawTranscript, RawWord};
use clip_discovery::{ClipDiscovery, DiscoverOptions, DiscoveryConfig};
use clip_selection::VALID_ASPECT_RATIOS;
use clip_storage::sidecar::Sidecar;

/// Four-sentence rotation with hooks, statistics, and Q&A so heuristic
/// scores clear the selection threshold.
const SENTENCE_CYCLE: [&str; 4] = [
    "You need to know the truth about saving money today.",
    "Studies show 75 percent of people never review their spending.",
    "Why does budgeting always feel so hard for everyone?",
    "Because the incentives are actually working against your daily habits.",
];

/// Build a word-timed transcript covering roughly `total_s` seconds:
/// ten-word sentences in five-second windows, with a 3 s pause after the
/// 120 s and 240 s marks.
fn build_transcript(total_s: f64) -> RawTranscript {
    let mut words = Vec::new();
    let mut sentence_index = 0usize;
    let mut clock = 0.0f64;
    let mut paused_at_120 = false;
    let mut paused_at_240 = false;

    while clock + 5.0 <= total_s {
        if clock >= 120.0 && !paused_at_120 {
            clock += 3.0;
            paused_at_120 = true;
        }
        if clock >= 240.0 && !paused_at_240 {
            clock += 3.0;
            paused_at_240 = true;
        }

        let sentence = SENTENCE_CYCLE[sentence_index % SENTENCE_CYCLE.len()];
        for (i, token) in sentence.split_whitespace().enumerate() {
            let start = clock + i as f64 * 0.5;
            words.push(RawWord {
                text: token.to_string(),
                start,
                end: start + 0.45,
                confidence: 0.92,
            });
        }

        sentence_index += 1;
        clock += 5.0;
    }

    RawTranscript {
        words,
        ..RawTranscript::default()
    }
}

/// Hermetic engine: fallback embeddings, LLM off, temp cache and meta dirs
fn test_engine(dir: &Path, with_db: bool) -> ClipDiscovery {
    let mut config = DiscoveryConfig::default().without_llm();
    config.embedding.model_dir = dir.join("missing-models");
    config.embedding.cache_dir = dir.join("cache");
    config.meta_dir = dir.join("meta");
    if with_db {
        config.db_path = Some(dir.join("clips.db"));
    }
    ClipDiscovery::new(config).unwrap()
}

#[tokio::test]
async fn happy_path_produces_valid_clips() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    let transcript = build_transcript(600.0);

    let clips = engine
        .discover_clips("ep_happy", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();

    assert!(!clips.is_empty(), "expected at least one clip");
    assert!(clips.len() <= 8);

    for clip in &clips {
        assert!(clip.start_ms >= 0);
        assert!(clip.start_ms < clip.end_ms);
        assert_eq!(clip.duration_ms, clip.end_ms - clip.start_ms);
        assert!((0.0..=1.0).contains(&clip.score));
        assert!(clip.score >= 0.3);
        for ratio in &clip.aspect_ratios {
            assert!(VALID_ASPECT_RATIOS.contains(&ratio.as_str()));
        }

        let title = clip.title.as_ref().expect("clip has a title");
        assert!(title.chars().count() <= 60, "title too long: {title}");

        let caption = clip.caption.as_ref().expect("clip has a caption");
        assert!(!caption.contains('#'), "caption holds hashtags: {caption}");

        assert!(clip.hashtags.len() <= 6);

        // Pre-padding bounds sit inside the source segment
        assert!(clip.source_segment_start_ms <= clip.start_ms + 500);
        assert!(clip.end_ms - 500 <= clip.source_segment_end_ms);
    }

    // Clips come back best-first
    for pair in clips.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn happy_path_writes_sidecar() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    let transcript = build_transcript(600.0);

    let clips = engine
        .discover_clips("ep_sidecar", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();

    let sidecar = Sidecar::read(&dir.path().join("meta"), "ep_sidecar").unwrap();
    assert_eq!(sidecar.clips_count, clips.len());
    assert_eq!(sidecar.episode_id, "ep_sidecar");
}

#[tokio::test]
async fn empty_transcript_returns_empty_without_sidecar() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);

    let clips = engine
        .discover_clips("ep_empty", &RawTranscript::default(), &DiscoverOptions::default())
        .await
        .unwrap();

    assert!(clips.is_empty());
    assert!(Sidecar::read(&dir.path().join("meta"), "ep_empty").is_err());
}

#[tokio::test]
async fn very_short_episode_yields_no_clips_but_writes_sidecar() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    // 15 s episode: a single segment below every duration bucket
    let transcript = build_transcript(15.0);

    let clips = engine
        .discover_clips("ep_short", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();

    assert!(clips.is_empty());
    let sidecar = Sidecar::read(&dir.path().join("meta"), "ep_short").unwrap();
    assert_eq!(sidecar.clips_count, 0);
}

#[tokio::test]
async fn discovery_is_deterministic_modulo_ids() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    let transcript = build_transcript(600.0);

    let first = engine
        .discover_clips("ep_det", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();
    let second = engine
        .discover_clips("ep_det", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.start_ms, b.start_ms);
        assert_eq!(a.end_ms, b.end_ms);
        assert_eq!(a.bucket_name, b.bucket_name);
        assert!((a.score - b.score).abs() < 1e-9);
        assert_eq!(a.title, b.title);
        assert_eq!(a.caption, b.caption);
        assert_eq!(a.hashtags, b.hashtags);
        assert_ne!(a.id, b.id);
    }
}

#[tokio::test]
async fn clips_are_persisted_to_store() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), true);
    let transcript = build_transcript(600.0);

    let clips = engine
        .discover_clips("ep_store", &transcript, &DiscoverOptions::default())
        .await
        .unwrap();
    assert!(!clips.is_empty());

    let store = clip_storage::ClipStore::open(dir.path().join("clips.db")).unwrap();
    let stored = store.clips_for_episode("ep_store").unwrap();
    assert_eq!(stored.len(), clips.len());
    assert!(stored.iter().all(|r| r.status == clip_common::ClipStatus::Pending));
}

#[tokio::test]
async fn platform_preset_overrides_aspect_ratios() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    let transcript = build_transcript(600.0);

    let opts = DiscoverOptions {
        platform: Some(clip_selection::Platform::Tiktok),
        max_clips: 6,
        ..DiscoverOptions::default()
    };
    let clips = engine
        .discover_clips("ep_tiktok", &transcript, &opts)
        .await
        .unwrap();

    assert!(clips.len() <= 6);
    for clip in &clips {
        assert_eq!(clip.aspect_ratios, vec!["9x16".to_string()]);
        assert!(clip.bucket_name.starts_with("tiktok_"));
    }
}

#[tokio::test]
async fn max_clips_option_caps_output() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(dir.path(), false);
    let transcript = build_transcript(600.0);

    let opts = DiscoverOptions {
        max_clips: 2,
        ..DiscoverOptions::default()
    };
    let clips = engine
        .discover_clips("ep_capped", &transcript, &opts)
        .await
        .unwrap();
    assert!(clips.len() <= 2);
}

#[test]
fn diarization_overlap_assigns_expected_speakers() {
    // Two-speaker diarization over the happy-path words: A, then B, then A
    let transcript = build_transcript(450.0);
    let aligner = SentenceAligner::default();

    let words = transcript.to_words();
    let mut sentences = aligner.align(&words);
    let diarization = RawDiarization {
        segments: vec![
            RawSpeakerTurn {
                start: 0.0,
                end: 150.0,
                speaker: "A".to_string(),
            },
            RawSpeakerTurn {
                start: 150.0,
                end: 300.0,
                speaker: "B".to_string(),
            },
            RawSpeakerTurn {
                start: 300.0,
                end: 450.0,
                speaker: "A".to_string(),
            },
        ],
    };
    aligner.attach_speakers(&mut sentences, &diarization);

    for sentence in &sentences {
        let start_s = sentence.start_ms as f64 / 1000.0;
        let end_s = sentence.end_ms as f64 / 1000.0;

        if end_s <= 150.0 {
            assert_eq!(sentence.speaker.as_deref(), Some("A"), "at {start_s}s");
        } else if start_s >= 150.0 && end_s <= 300.0 {
            assert_eq!(sentence.speaker.as_deref(), Some("B"), "at {start_s}s");
        } else if start_s >= 300.0 {
            assert_eq!(sentence.speaker.as_deref(), Some("A"), "at {start_s}s");
        }
        assert!(sentence.speaker.is_some(), "unassigned at {start_s}s");
    }
}
