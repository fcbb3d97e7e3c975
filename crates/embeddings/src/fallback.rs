//! Keyword-based fallback embeddings
//!
//! When no transformer model can be loaded, sentences are embedded with
//! TF-IDF (unigrams + bigrams, English stop words, vocabulary capped at
//! 1000 terms, document frequency clipped to [1, 0.95]) followed by
//! truncated SVD down to `min(384, features, sentences)` dimensions and
//! L2 normalization. The whole path is deterministic: same sentences in,
//! same vectors out.

use std::collections::{BTreeMap, HashSet};

use nalgebra::DMatrix;
use ndarray::Array2;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use clip_common::{PipelineError, Result};

use crate::normalize_vector;

/// Vocabulary cap, matching the lightweight-model regime
const MAX_FEATURES: usize = 1000;
/// Terms in more than this fraction of sentences are dropped
const MAX_DF: f64 = 0.95;
/// Output dimensionality cap
const TARGET_DIM: usize = 384;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
        "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during",
        "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
        "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
        "itself", "just", "me", "might", "more", "most", "must", "my", "myself", "no", "nor",
        "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out",
        "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
        "their", "theirs", "them", "then", "there", "these", "they", "this", "those",
        "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what",
        "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
        "you", "your", "yours", "yourself",
    ]
    .into_iter()
    .collect()
});

/// Generate fallback embeddings, one row per input text
pub fn generate(texts: &[String]) -> Result<Array2<f32>> {
    if texts.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }

    info!(sentences = texts.len(), "Generating fallback embeddings (TF-IDF + SVD)");

    let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
    let vocabulary = build_vocabulary(&tokenized)?;
    let tfidf = tfidf_matrix(&tokenized, &vocabulary);

    let n = texts.len();
    let features = vocabulary.len();
    let target_dim = TARGET_DIM.min(features).min(n);

    let mut embeddings = if target_dim < features {
        truncated_svd(&tfidf, n, features, target_dim)?
    } else {
        tfidf
    };

    let dim = embeddings.len() / n;
    for row in embeddings.chunks_mut(dim) {
        normalize_vector(row);
    }

    debug!(
        sentences = n,
        features,
        dim,
        "Fallback embeddings generated"
    );

    Array2::from_shape_vec((n, dim), embeddings).map_err(|e| PipelineError::Embedding {
        model_name: crate::FALLBACK_MODEL_NAME.to_string(),
        message: format!("shape error: {e}"),
    })
}

/// Lowercased alphanumeric unigrams plus adjacent bigrams, stop words
/// removed at the unigram level
fn tokenize(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let unigrams: Vec<String> = words
        .iter()
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .cloned()
        .collect();

    let mut tokens = unigrams.clone();
    for pair in unigrams.windows(2) {
        tokens.push(format!("{} {}", pair[0], pair[1]));
    }
    tokens
}

/// Select up to MAX_FEATURES terms by document frequency, clipped at
/// MAX_DF, in deterministic (count desc, term asc) order
fn build_vocabulary(tokenized: &[Vec<String>]) -> Result<BTreeMap<String, usize>> {
    let n_docs = tokenized.len();
    let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();

    for tokens in tokenized {
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in unique {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    let max_count = ((n_docs as f64) * MAX_DF).floor() as usize;
    let mut candidates: Vec<(&str, usize)> = doc_freq
        .into_iter()
        .filter(|&(_, df)| n_docs == 1 || df <= max_count)
        .collect();

    if candidates.is_empty() {
        return Err(PipelineError::Embedding {
            model_name: crate::FALLBACK_MODEL_NAME.to_string(),
            message: "no usable terms in input sentences".to_string(),
        });
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    candidates.truncate(MAX_FEATURES);

    // Re-sort alphabetically so column order is independent of counts
    candidates.sort_by(|a, b| a.0.cmp(b.0));

    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(idx, (term, _))| (term.to_string(), idx))
        .collect())
}

/// Row-major TF-IDF matrix with smoothed idf: tf * (ln((1+n)/(1+df)) + 1)
fn tfidf_matrix(tokenized: &[Vec<String>], vocabulary: &BTreeMap<String, usize>) -> Vec<f32> {
    let n = tokenized.len();
    let features = vocabulary.len();

    let mut doc_freq = vec![0usize; features];
    for tokens in tokenized {
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in unique {
            if let Some(&idx) = vocabulary.get(term) {
                doc_freq[idx] += 1;
            }
        }
    }

    let mut matrix = vec![0.0f32; n * features];
    for (row, tokens) in tokenized.iter().enumerate() {
        for token in tokens {
            if let Some(&idx) = vocabulary.get(token.as_str()) {
                matrix[row * features + idx] += 1.0;
            }
        }
        for (idx, df) in doc_freq.iter().enumerate() {
            let tf = matrix[row * features + idx];
            if tf > 0.0 {
                let idf = ((1.0 + n as f64) / (1.0 + *df as f64)).ln() + 1.0;
                matrix[row * features + idx] = tf * idf as f32;
            }
        }
    }

    matrix
}

/// Project the TF-IDF matrix onto its top singular directions (U_k * S_k)
fn truncated_svd(matrix: &[f32], n: usize, features: usize, k: usize) -> Result<Vec<f32>> {
    let data: Vec<f64> = matrix.iter().map(|&v| f64::from(v)).collect();
    let m = DMatrix::from_row_slice(n, features, &data);

    let svd = m.svd(true, false);
    let u = svd.u.ok_or_else(|| PipelineError::Embedding {
        model_name: crate::FALLBACK_MODEL_NAME.to_string(),
        message: "SVD did not produce U".to_string(),
    })?;

    let rank = svd.singular_values.len().min(k);
    let mut reduced = vec![0.0f32; n * k];
    for row in 0..n {
        for col in 0..rank {
            reduced[row * k + col] = (u[(row, col)] * svd.singular_values[col]) as f32;
        }
    }

    Ok(reduced)
}
