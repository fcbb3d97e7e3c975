//! Clip persistence
//!
//! Two outputs per episode: rows in the SQLite `clips`/`clip_assets`
//! tables, and a JSON sidecar next to the media metadata. SQLite access
//! opens a connection per operation and closes it after the transaction
//! so locks are never retained across calls; writers use exclusive
//! transactions with a busy timeout.

pub mod sidecar;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use clip_common::{ClipStatus, PipelineError, Result};
use clip_selection::ClipSpec;

/// A clip row as persisted
#[derive(Debug, Clone)]
pub struct ClipRecord {
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

impl ClipRecord {
    /// Snapshot a clip spec for persistence, stamped now and pending
    #[must_use]
    pub fn from_spec(spec: &ClipSpec) -> Self {
        Self {
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
            created_at: Utc::now(),
        }
    }
}

/// A rendered asset row
#[derive(Debug, Clone)]
pub struct ClipAsset {
    pub id: String,
    pub clip_id: String,
    pub path: PathBuf,
    pub variant: String,
    pub aspect_ratio: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed clip store
#[derive(Debug, Clone)]
pub struct ClipStore {
    db_path: PathBuf,
}

impl ClipStore {
    /// Open (and create if needed) the store at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        store.with_connection(|conn| {
            conn.execute_batch(SCHEMA).map_err(storage_error)?;
            Ok(())
        })?;
        info!(path = %store.db_path.display(), "Clip store ready");
        Ok(store)
    }

    /// Insert clips for an episode inside one exclusive transaction
    pub fn insert_clips(&self, records: &[ClipRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Exclusive)
                .map_err(storage_error)?;

            for record in records {
                let hashtags_json =
                    serde_json::to_string(&record.hashtags).map_err(PipelineError::from)?;
                tx.execute(
                    "INSERT OR REPLACE INTO clips \
                     (id, episode_id, start_ms, end_ms, duration_ms, score, title, caption, \
                      hashtags_json, status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    rusqlite::params![
                        record.id,
                        record.episode_id,
                        record.start_ms,
                        record.end_ms,
                        record.duration_ms,
                        record.score,
                        record.title,
                        record.caption,
                        hashtags_json,
                        record.status.as_str(),
                        record.created_at.to_rfc3339(),
                    ],
                )
                .map_err(storage_error)?;
            }

            tx.commit().map_err(storage_error)?;
            debug!(clips = records.len(), "Inserted clip records");
            Ok(records.len())
        })
    }

    /// Record a rendered asset for a clip
    pub fn insert_asset(&self, asset: &ClipAsset) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Exclusive)
                .map_err(storage_error)?;
            tx.execute(
                "INSERT OR REPLACE INTO clip_assets \
                 (id, clip_id, path, variant, aspect_ratio, size_bytes, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    asset.id,
                    asset.clip_id,
                    asset.path.to_string_lossy(),
                    asset.variant,
                    asset.aspect_ratio,
                    asset.size_bytes,
                    asset.created_at.to_rfc3339(),
                ],
            )
            .map_err(storage_error)?;
            tx.commit().map_err(storage_error)?;
            Ok(())
        })
    }

    /// Update a clip's render status
    pub fn set_status(&self, clip_id: &str, status: ClipStatus) -> Result<()> {
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE clips SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), clip_id],
                )
                .map_err(storage_error)?;
            if updated == 0 {
                return Err(PipelineError::Storage(format!("no such clip: {clip_id}")));
            }
            Ok(())
        })
    }

    /// All clips for an episode, best score first
    pub fn clips_for_episode(&self, episode_id: &str) -> Result<Vec<ClipRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, episode_id, start_ms, end_ms, duration_ms, score, title, \
                     caption, hashtags_json, status, created_at \
                     FROM clips WHERE episode_id = ?1 ORDER BY score DESC, start_ms ASC",
                )
                .map_err(storage_error)?;

            let rows = stmt
                .query_map([episode_id], |row| {
                    let hashtags_json: String = row.get(8)?;
                    let status: String = row.get(9)?;
                    let created_at: String = row.get(10)?;
                    Ok(ClipRecord {
                        id: row.get(0)?,
                        episode_id: row.get(1)?,
                        start_ms: row.get(2)?,
                        end_ms: row.get(3)?,
                        duration_ms: row.get(4)?,
                        score: row.get(5)?,
                        title: row.get(6)?,
                        caption: row.get(7)?,
                        hashtags: serde_json::from_str(&hashtags_json).unwrap_or_default(),
                        status: parse_status(&status),
                        created_at: DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    })
                })
                .map_err(storage_error)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(storage_error)?);
            }
            Ok(records)
        })
    }

    /// Open a connection, run `op`, close. Lock retention across calls
    /// is the main source of SQLITE_BUSY storms, so connections never
    /// outlive one operation.
    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(&self.db_path).map_err(storage_error)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_error)?;
        op(&mut conn)
    }
}

fn parse_status(status: &str) -> ClipStatus {
    match status {
        "rendered" => ClipStatus::Rendered,
        "failed" => ClipStatus::Failed,
        _ => ClipStatus::Pending,
    }
}

fn storage_error(err: rusqlite::Error) -> PipelineError {
    PipelineError::Storage(err.to_string())
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS clips (
    id TEXT PRIMARY KEY,
    episode_id TEXT NOT NULL,
    start_ms INTEGER NOT NULL,
    end_ms INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    score REAL NOT NULL,
    title TEXT,
    caption TEXT,
    hashtags_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'rendered', 'failed')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clip_assets (
    id TEXT PRIMARY KEY,
    clip_id TEXT NOT NULL REFERENCES clips(id),
    path TEXT NOT NULL,
    variant TEXT NOT NULL CHECK (variant IN ('clean', 'subtitled')),
    aspect_ratio TEXT NOT NULL CHECK (aspect_ratio IN ('9x16', '16x9', '1x1')),
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clips_episode ON clips(episode_id);
CREATE INDEX IF NOT EXISTS idx_clips_status ON clips(status);
CREATE INDEX IF NOT EXISTS idx_clips_score ON clips(score DESC);
CREATE INDEX IF NOT EXISTS idx_clip_assets_clip ON clip_assets(clip_id);
";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, episode: &str, score: f64) -> ClipRecord {
        ClipRecord {
            id: id.to_string(),
            episode_id: episode.to_string(),
            start_ms: 1000,
            end_ms: 31_000,
            duration_ms: 30_000,
            score,
            title: Some("A title".to_string()),
            caption: Some("A caption".to_string()),
            hashtags: vec!["#one".to_string(), "#two".to_string()],
            status: ClipStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path().join("clips.db")).unwrap();

        store
            .insert_clips(&[record("clip_a", "ep1", 0.4), record("clip_b", "ep1", 0.9)])
            .unwrap();

        let clips = store.clips_for_episode("ep1").unwrap();
        assert_eq!(clips.len(), 2);
        // Best score first
        assert_eq!(clips[0].id, "clip_b");
        assert_eq!(clips[0].hashtags, vec!["#one", "#two"]);
        assert_eq!(clips[0].status, ClipStatus::Pending);
    }

    #[test]
    fn test_other_episode_not_returned() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path().join("clips.db")).unwrap();

        store.insert_clips(&[record("clip_a", "ep1", 0.5)]).unwrap();
        assert!(store.clips_for_episode("ep2").unwrap().is_empty());
    }

    #[test]
    fn test_status_update() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path().join("clips.db")).unwrap();

        store.insert_clips(&[record("clip_a", "ep1", 0.5)]).unwrap();
        store.set_status("clip_a", ClipStatus::Rendered).unwrap();

        let clips = store.clips_for_episode("ep1").unwrap();
        assert_eq!(clips[0].status, ClipStatus::Rendered);

        assert!(store.set_status("missing", ClipStatus::Failed).is_err());
    }

    #[test]
    fn test_asset_insertion() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path().join("clips.db")).unwrap();

        store.insert_clips(&[record("clip_a", "ep1", 0.5)]).unwrap();
        store
            .insert_asset(&ClipAsset {
                id: "asset_1".to_string(),
                clip_id: "clip_a".to_string(),
                path: PathBuf::from("data/clips/clip_a_9x16.mp4"),
                variant: "clean".to_string(),
                aspect_ratio: "9x16".to_string(),
                size_bytes: 1024,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips.db");

        {
            let store = ClipStore::open(&path).unwrap();
            store.insert_clips(&[record("clip_a", "ep1", 0.5)]).unwrap();
        }

        let store = ClipStore::open(&path).unwrap();
        assert_eq!(store.clips_for_episode("ep1").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_insert_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path().join("clips.db")).unwrap();
        assert_eq!(store.insert_clips(&[]).unwrap(), 0);
    }
}
