//! On-disk embedding cache
//!
//! Entries are keyed on SHA-256 of `(episode_id, model_name, sentence
//! texts)` and stored as bincode under
//! `cache_dir/<episode_id>_<key16>.bin`. Loads are validated against the
//! current request; any mismatch regenerates. Writes are best-effort.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// How many leading sentence texts are kept for validation
const SAMPLE_TEXTS: usize = 10;

/// Cached embedding payload with enough metadata to validate reuse
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub model_name: String,
    pub sentence_count: usize,
    pub sample_sentence_texts: Vec<String>,
    pub dim: usize,
    pub embeddings: Vec<f32>,
    pub generated_at: String,
}

/// SHA-256 hex key over episode, model, and joined sentence texts
#[must_use]
pub fn cache_key(episode_id: &str, model_name: &str, texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(episode_id.as_bytes());
    hasher.update(b":");
    hasher.update(model_name.as_bytes());
    hasher.update(b":");
    hasher.update(texts.join(":").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache file path: `<episode_id>_<first 16 key chars>.bin`
#[must_use]
pub fn cache_path(cache_dir: &Path, episode_id: &str, key: &str) -> PathBuf {
    let short = &key[..key.len().min(16)];
    cache_dir.join(format!("{episode_id}_{short}.bin"))
}

/// Load and validate a cached entry; `None` means regenerate
#[must_use]
pub fn load(path: &Path, model_name: &str, texts: &[String]) -> Option<Array2<f32>> {
    if !path.exists() {
        return None;
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read embedding cache");
            return None;
        }
    };

    let entry: EmbeddingCacheEntry = match bincode::deserialize(&bytes) {
        Ok(entry) => entry,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to decode embedding cache");
            return None;
        }
    };

    if !validate(&entry, model_name, texts) {
        warn!(path = %path.display(), "Cache validation failed, regenerating embeddings");
        return None;
    }

    Array2::from_shape_vec((entry.sentence_count, entry.dim), entry.embeddings).ok()
}

/// Best-effort write; failures are warnings, not errors
pub fn store(path: &Path, model_name: &str, texts: &[String], embeddings: &Array2<f32>) {
    let entry = EmbeddingCacheEntry {
        model_name: model_name.to_string(),
        sentence_count: embeddings.nrows(),
        sample_sentence_texts: texts.iter().take(SAMPLE_TEXTS).cloned().collect(),
        dim: embeddings.ncols(),
        embeddings: embeddings.iter().copied().collect(),
        generated_at: unix_timestamp(),
    };

    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    })();

    match result {
        Ok(()) => info!(path = %path.display(), "Embeddings cached"),
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to cache embeddings"),
    }
}

/// Validate model name, sentence count, leading texts, and dimension
fn validate(entry: &EmbeddingCacheEntry, model_name: &str, texts: &[String]) -> bool {
    if entry.model_name != model_name {
        debug!(
            cached = %entry.model_name,
            current = model_name,
            "Cache model mismatch"
        );
        return false;
    }

    if entry.sentence_count != texts.len() {
        debug!(
            cached = entry.sentence_count,
            current = texts.len(),
            "Cache sentence count mismatch"
        );
        return false;
    }

    for (i, text) in texts.iter().take(SAMPLE_TEXTS).enumerate() {
        if entry.sample_sentence_texts.get(i) != Some(text) {
            debug!(index = i, "Cache sentence text mismatch");
            return false;
        }
    }

    if entry.dim == 0 || entry.embeddings.len() != entry.sentence_count * entry.dim {
        debug!("Cache embeddings shape mismatch");
        return false;
    }

    true
}

/// Seconds since the epoch; enough provenance for a cache payload
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.to_string()
}
