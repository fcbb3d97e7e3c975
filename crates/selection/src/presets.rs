//! Platform presets
//!
//! Configuration snapshots for the major short-form platforms. Each
//! preset overrides duration buckets, aspect ratios, and the episode cap;
//! the selection algorithm itself is shared.

use serde::{Deserialize, Serialize};

use crate::{DurationBucket, SelectionPolicies};

/// Supported target platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    InstagramReels,
    YoutubeShorts,
    Twitter,
    Linkedin,
    Facebook,
}

impl Platform {
    /// Parse a platform name as it appears in discovery options
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tiktok" => Some(Self::Tiktok),
            "instagram_reels" => Some(Self::InstagramReels),
            "youtube_shorts" => Some(Self::YoutubeShorts),
            "twitter" => Some(Self::Twitter),
            "linkedin" => Some(Self::Linkedin),
            "facebook" => Some(Self::Facebook),
            _ => None,
        }
    }

    /// Selection policies tuned for this platform
    #[must_use]
    pub fn policies(&self) -> SelectionPolicies {
        let mut policies = SelectionPolicies::default();

        let bucket = |min: i64, max: i64, opt: i64, name: &str| {
            DurationBucket::new(min, max, opt, name).expect("preset bucket is valid")
        };

        match self {
            Self::Tiktok => {
                policies.duration_buckets = vec![
                    bucket(15_000, 30_000, 20_000, "tiktok_hook"),
                    bucket(30_000, 60_000, 45_000, "tiktok_standard"),
                ];
                policies.aspect_ratios = vec!["9x16".to_string()];
                policies.max_clips_per_episode = 6;
            }
            Self::InstagramReels => {
                policies.duration_buckets = vec![
                    bucket(15_000, 30_000, 25_000, "reel_hook"),
                    bucket(30_000, 90_000, 60_000, "reel_standard"),
                ];
                policies.aspect_ratios = vec!["9x16".to_string()];
                policies.max_clips_per_episode = 8;
            }
            Self::YoutubeShorts => {
                policies.duration_buckets = vec![
                    bucket(15_000, 30_000, 20_000, "shorts_hook"),
                    bucket(30_000, 60_000, 45_000, "shorts_standard"),
                ];
                policies.aspect_ratios = vec!["9x16".to_string()];
                policies.max_clips_per_episode = 5;
            }
            Self::Twitter => {
                policies.duration_buckets = vec![bucket(15_000, 45_000, 30_000, "twitter_clip")];
                policies.aspect_ratios = vec!["16x9".to_string(), "1x1".to_string()];
                policies.max_clips_per_episode = 4;
            }
            Self::Linkedin => {
                policies.duration_buckets = vec![
                    bucket(30_000, 90_000, 60_000, "linkedin_insight"),
                    bucket(60_000, 180_000, 120_000, "linkedin_deep_dive"),
                ];
                policies.aspect_ratios = vec!["16x9".to_string(), "1x1".to_string()];
                policies.max_clips_per_episode = 6;
            }
            Self::Facebook => {
                policies.duration_buckets = vec![
                    bucket(15_000, 60_000, 30_000, "facebook_short"),
                    bucket(60_000, 180_000, 90_000, "facebook_long"),
                ];
                policies.aspect_ratios =
                    vec!["16x9".to_string(), "1x1".to_string(), "9x16".to_string()];
                policies.max_clips_per_episode = 8;
            }
        }

        policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Platform::from_name("tiktok"), Some(Platform::Tiktok));
        assert_eq!(Platform::from_name("TikTok"), Some(Platform::Tiktok));
        assert_eq!(
            Platform::from_name("instagram_reels"),
            Some(Platform::InstagramReels)
        );
        assert_eq!(Platform::from_name("myspace"), None);
    }

    #[test]
    fn test_presets_are_valid_policies() {
        for platform in [
            Platform::Tiktok,
            Platform::InstagramReels,
            Platform::YoutubeShorts,
            Platform::Twitter,
            Platform::Linkedin,
            Platform::Facebook,
        ] {
            platform.policies().validate().unwrap();
        }
    }

    #[test]
    fn test_tiktok_is_vertical_only() {
        let policies = Platform::Tiktok.policies();
        assert_eq!(policies.aspect_ratios, vec!["9x16".to_string()]);
        assert_eq!(policies.max_clips_per_episode, 6);
    }

    #[test]
    fn test_twitter_single_bucket() {
        let policies = Platform::Twitter.policies();
        assert_eq!(policies.duration_buckets.len(), 1);
        assert_eq!(policies.duration_buckets[0].name, "twitter_clip");
    }

    #[test]
    fn test_serde_names_match_options_contract() {
        let json = serde_json::to_string(&Platform::YoutubeShorts).unwrap();
        assert_eq!(json, "\"youtube_shorts\"");
    }
}
