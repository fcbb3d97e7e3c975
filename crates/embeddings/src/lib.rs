//! Sentence embedding service
//!
//! Produces dense sentence embeddings for topic segmentation:
//! - Transformer embeddings via ONNX Runtime (mean pooling + L2 norm)
//! - Filesystem cache keyed on episode, model, and sentence texts
//! - Deterministic TF-IDF + truncated-SVD fallback when no model loads
//!
//! A priority list of model candidates is attempted at construction; if
//! none loads the service runs in fallback mode and every `embed` call
//! uses the keyword path.

pub mod cache;
pub mod fallback;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use clip_common::{PipelineError, Result, Sentence};
use clip_resource::ResourceGate;

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Preferred model name (e.g. "bge-small-en")
    pub model_name: String,
    /// Directory holding `<model>.onnx` files and `tokenizer.json`
    pub model_dir: PathBuf,
    /// Batch size for embedding generation
    pub batch_size: usize,
    /// Directory for the on-disk embedding cache
    pub cache_dir: PathBuf,
    /// Maximum token sequence length
    pub max_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "bge-small-en".to_string(),
            model_dir: PathBuf::from("models/embeddings"),
            batch_size: 32,
            cache_dir: PathBuf::from("data/cache/embeddings"),
            max_length: 256,
        }
    }
}

/// Model name reported by the fallback path
pub const FALLBACK_MODEL_NAME: &str = "tfidf-svd-fallback";

/// Loaded transformer model state, shared read-only across calls
struct TransformerEmbedder {
    model_name: String,
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    max_length: usize,
}

impl TransformerEmbedder {
    /// Load one model candidate from the model directory
    fn load(model_dir: &Path, model_name: &str, max_length: usize) -> Result<Self> {
        let model_path = model_dir.join(format!("{}.onnx", model_file_stem(model_name)));
        let tokenizer_path = model_dir.join("tokenizer.json");

        let session = Session::builder()
            .map_err(|e| embedding_error(model_name, format!("session builder: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                embedding_error(
                    model_name,
                    format!("load {}: {e}", model_path.display()),
                )
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| embedding_error(model_name, format!("load tokenizer: {e}")))?;

        info!(model = model_name, path = %model_path.display(), "Embedding model loaded");

        Ok(Self {
            model_name: model_name.to_string(),
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            max_length,
        })
    }

    /// Embed a batch of texts: tokenize, run the session, mean-pool the
    /// hidden states weighted by attention mask, L2-normalize.
    fn embed_texts(
        session: &mut Session,
        tokenizer: &Tokenizer,
        model_name: &str,
        max_length: usize,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let mut result = Vec::with_capacity(texts.len());

        for text in texts {
            let encoding = tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| embedding_error(model_name, format!("tokenization: {e}")))?;

            let tokens = encoding.get_ids();
            let attention_mask = encoding.get_attention_mask();
            let seq_len = tokens.len().min(max_length);

            let mut input_ids = Vec::with_capacity(seq_len);
            input_ids.extend(tokens.iter().take(seq_len).map(|&t| i64::from(t)));
            let mut mask_i64 = Vec::with_capacity(seq_len);
            mask_i64.extend(attention_mask.iter().take(seq_len).map(|&m| i64::from(m)));
            let token_type_ids = vec![0i64; seq_len];

            let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| embedding_error(model_name, format!("input_ids shape: {e}")))?;
            let mask_array = Array2::from_shape_vec((1, seq_len), mask_i64)
                .map_err(|e| embedding_error(model_name, format!("attention_mask shape: {e}")))?;
            let token_type_array = Array2::from_shape_vec((1, seq_len), token_type_ids)
                .map_err(|e| embedding_error(model_name, format!("token_type_ids shape: {e}")))?;

            let input_ids_tensor = TensorRef::from_array_view(input_ids_array.view())
                .map_err(|e| embedding_error(model_name, format!("input_ids tensor: {e}")))?;
            let mask_tensor = TensorRef::from_array_view(mask_array.view())
                .map_err(|e| embedding_error(model_name, format!("attention_mask tensor: {e}")))?;
            let token_type_tensor = TensorRef::from_array_view(token_type_array.view())
                .map_err(|e| embedding_error(model_name, format!("token_type_ids tensor: {e}")))?;

            let outputs = session
                .run(ort::inputs![input_ids_tensor, mask_tensor, token_type_tensor])
                .map_err(|e| embedding_error(model_name, format!("inference: {e}")))?;

            // last_hidden_state: [1, seq_len, hidden_dim]
            let (shape, hidden_states) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| embedding_error(model_name, format!("extract tensor: {e}")))?;

            let hidden_dim = shape[2] as usize;
            let mut pooled = vec![0.0f32; hidden_dim];
            let mut mask_sum = 0.0f32;

            for (i, &mask_val) in attention_mask.iter().enumerate().take(seq_len) {
                let mask_val = mask_val as f32;
                mask_sum += mask_val;
                for (j, pooled_val) in pooled.iter_mut().enumerate() {
                    *pooled_val += hidden_states[i * hidden_dim + j] * mask_val;
                }
            }

            if mask_sum > 0.0 {
                for val in &mut pooled {
                    *val /= mask_sum;
                }
            }

            normalize_vector(&mut pooled);
            result.push(pooled);
        }

        Ok(result)
    }
}

/// Embedding service with caching and fallback
pub struct EmbeddingService {
    config: EmbeddingConfig,
    transformer: Option<TransformerEmbedder>,
    gate: Arc<ResourceGate>,
}

impl EmbeddingService {
    /// Build the service, trying each model candidate in priority order.
    ///
    /// A service with no loadable transformer is still usable; it runs in
    /// fallback mode. Construction only fails on unusable configuration.
    pub fn new(config: EmbeddingConfig, gate: Arc<ResourceGate>) -> Self {
        let mut candidates = vec![config.model_name.clone()];
        for fallback in [
            "all-MiniLM-L6-v2",
            "all-mpnet-base-v2",
            "paraphrase-MiniLM-L6-v2",
        ] {
            if !candidates.iter().any(|c| c == fallback) {
                candidates.push(fallback.to_string());
            }
        }

        let mut transformer = None;
        for (attempt, candidate) in candidates.iter().enumerate() {
            match TransformerEmbedder::load(&config.model_dir, candidate, config.max_length) {
                Ok(embedder) => {
                    transformer = Some(embedder);
                    break;
                }
                Err(err) => {
                    warn!(
                        model = %candidate,
                        attempt = attempt + 1,
                        total = candidates.len(),
                        error = %err,
                        "Failed to load embedding model"
                    );
                }
            }
        }

        if transformer.is_none() {
            warn!("No embedding model available, service runs in keyword-fallback mode");
        }

        Self {
            config,
            transformer,
            gate,
        }
    }

    /// Active model name (the loaded candidate, or the fallback marker)
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.transformer
            .as_ref()
            .map_or(FALLBACK_MODEL_NAME, |t| t.model_name.as_str())
    }

    /// Whether a transformer model is resident
    #[must_use]
    pub fn has_model(&self) -> bool {
        self.transformer.is_some()
    }

    /// Produce one embedding row per sentence.
    ///
    /// Results are cached on disk under a key derived from the episode id,
    /// the model name, and the sentence texts; a valid cache entry is
    /// returned byte-for-byte. Cache write failures are warnings.
    pub async fn embed(&self, sentences: &[Sentence], episode_id: &str) -> Result<Array2<f32>> {
        if sentences.is_empty() {
            warn!("No sentences provided for embedding generation");
            return Ok(Array2::zeros((0, 0)));
        }

        let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
        let key = cache::cache_key(episode_id, self.model_name(), &texts);
        let cache_path = cache::cache_path(&self.config.cache_dir, episode_id, &key);

        if let Some(cached) = cache::load(&cache_path, self.model_name(), &texts) {
            info!(
                episode_id,
                sentences = sentences.len(),
                "Using cached embeddings"
            );
            return Ok(cached);
        }

        // Memory pressure is only a warning: the resident model must not
        // be evicted in the middle of a batch.
        self.gate.check_embedding_memory();

        // Fallback output after a model failure is not cached: it must
        // not masquerade as the transformer's vectors on the next run.
        let mut cacheable = true;
        let embeddings = match &self.transformer {
            Some(_) => match self.generate_with_model(&texts).await {
                Ok(embeddings) => embeddings,
                Err(err) => {
                    warn!(error = %err, "Embedding generation failed, attempting keyword fallback");
                    cacheable = false;
                    fallback::generate(&texts).map_err(|fallback_err| {
                        embedding_error(
                            self.model_name(),
                            format!("model failed ({err}); fallback failed ({fallback_err})"),
                        )
                    })?
                }
            },
            None => fallback::generate(&texts)
                .map_err(|err| embedding_error(FALLBACK_MODEL_NAME, err.to_string()))?,
        };

        if cacheable {
            cache::store(&cache_path, self.model_name(), &texts, &embeddings);
        }

        info!(
            episode_id,
            sentences = sentences.len(),
            dim = embeddings.ncols(),
            model = self.model_name(),
            "Embeddings generated"
        );

        Ok(embeddings)
    }

    /// Run transformer inference on a blocking thread, batch by batch
    async fn generate_with_model(&self, texts: &[String]) -> Result<Array2<f32>> {
        let embedder = self
            .transformer
            .as_ref()
            .expect("generate_with_model requires a loaded model");

        let session = Arc::clone(&embedder.session);
        let tokenizer = Arc::clone(&embedder.tokenizer);
        let model_name = embedder.model_name.clone();
        let max_length = embedder.max_length;
        let batch_size = self.config.batch_size.max(1);
        let texts = texts.to_vec();

        let rows = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut session = session
                .lock()
                .map_err(|_| embedding_error(&model_name, "session mutex poisoned".to_string()))?;

            let mut rows = Vec::with_capacity(texts.len());
            for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
                debug!(
                    batch = batch_idx,
                    batch_len = batch.len(),
                    total = texts.len(),
                    "Processing embedding batch"
                );
                rows.extend(TransformerEmbedder::embed_texts(
                    &mut session,
                    &tokenizer,
                    &model_name,
                    max_length,
                    batch,
                )?);
            }
            Ok(rows)
        })
        .await
        .map_err(|e| embedding_error(self.model_name(), format!("task join: {e}")))??;

        rows_to_matrix(rows).ok_or_else(|| {
            embedding_error(self.model_name(), "model produced ragged embeddings".to_string())
        })
    }
}

/// Stack equal-length rows into a matrix
fn rows_to_matrix(rows: Vec<Vec<f32>>) -> Option<Array2<f32>> {
    let n = rows.len();
    let dim = rows.first()?.len();
    if rows.iter().any(|r| r.len() != dim) {
        return None;
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, dim), flat).ok()
}

/// Normalize a vector to unit length (L2 normalization)
pub(crate) fn normalize_vector(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Translate a published model name into its ONNX file stem
fn model_file_stem(model_name: &str) -> String {
    model_name.to_lowercase().replace('-', "_")
}

fn embedding_error(model_name: &str, message: String) -> PipelineError {
    PipelineError::Embedding {
        model_name: model_name.to_string(),
        message,
    }
}
