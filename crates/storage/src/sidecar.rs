//! JSON sidecar
//!
//! One file per episode at `data/meta/{episode_id}_clips.json`, written
//! on (possibly empty) success. Hard failures upstream never produce a
//! sidecar: its presence means discovery ran to completion.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use clip_common::{ClipStatus, Result};
use clip_selection::ClipSpec;

/// A clip entry in the sidecar file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarClip {
    pub id: String,
    pub episode_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
    pub score: f64,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Vec<String>,
    pub status: ClipStatus,
    pub created_at: DateTime<Utc>,
}

/// Sidecar document for one episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    pub episode_id: String,
    pub clips_count: usize,
    pub clips: Vec<SidecarClip>,
    pub generated_at: DateTime<Utc>,
}

impl Sidecar {
    /// Assemble the document from final clip specs
    #[must_use]
    pub fn from_specs(episode_id: &str, specs: &[ClipSpec]) -> Self {
        let now = Utc::now();
        let clips = specs
            .iter()
            .map(|spec| SidecarClip {
                id: spec.id.clone(),
                episode_id: spec.episode_id.clone(),
                start_ms: spec.start_ms,
                end_ms: spec.end_ms,
                duration_ms: spec.duration_ms,
                score: spec.score,
                title: spec.title.clone(),
                caption: spec.caption.clone(),
                hashtags: spec.hashtags.clone(),
                status: ClipStatus::Pending,
                created_at: now,
            })
            .collect();

        Self {
            episode_id: episode_id.to_string(),
            clips_count: specs.len(),
            clips,
            generated_at: now,
        }
    }

    /// Write to `<meta_dir>/<episode_id>_clips.json`, creating directories
    pub fn write(&self, meta_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(meta_dir)?;
        let path = meta_dir.join(format!("{}_clips.json", self.episode_id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!(
            path = %path.display(),
            clips = self.clips_count,
            "Wrote clips sidecar"
        );
        Ok(path)
    }

    /// Read a previously written sidecar
    pub fn read(meta_dir: &Path, episode_id: &str) -> Result<Self> {
        let path = meta_dir.join(format!("{episode_id}_clips.json"));
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(start_ms: i64, end_ms: i64) -> ClipSpec {
        let mut spec = ClipSpec::new(
            "ep1",
            start_ms,
            end_ms,
            vec!["9x16".to_string()],
            0.7,
            "standard",
            start_ms,
            end_ms,
        )
        .unwrap();
        spec.title = Some("Title".to_string());
        spec.caption = Some("Caption".to_string());
        spec.hashtags = vec!["#tag".to_string()];
        spec
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sidecar = Sidecar::from_specs("ep1", &[spec(0, 30_000), spec(40_000, 75_000)]);

        let path = sidecar.write(dir.path()).unwrap();
        assert!(path.ends_with("ep1_clips.json"));

        let loaded = Sidecar::read(dir.path(), "ep1").unwrap();
        assert_eq!(loaded.clips_count, 2);
        assert_eq!(loaded.clips[0].status, ClipStatus::Pending);
        assert_eq!(loaded.clips[1].duration_ms, 35_000);
    }

    #[test]
    fn test_empty_success_writes_zero_count() {
        let dir = TempDir::new().unwrap();
        let sidecar = Sidecar::from_specs("ep2", &[]);
        sidecar.write(dir.path()).unwrap();

        let loaded = Sidecar::read(dir.path(), "ep2").unwrap();
        assert_eq!(loaded.clips_count, 0);
        assert!(loaded.clips.is_empty());
    }

    #[test]
    fn test_missing_sidecar_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Sidecar::read(dir.path(), "nope").is_err());
    }
}
