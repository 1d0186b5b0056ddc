//! Text-to-vector embedding providers.
//!
//! Provides the async [`EmbeddingProvider`] trait and three implementations:
//! a local ONNX Runtime model (all-MiniLM-L6-v2), an OpenAI-compatible HTTP
//! client, and a deterministic feature-hashing embedder that needs no model.
//! Providers are created via [`create_provider`] from configuration.

pub mod hashing;
pub mod local;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Result, VigilError};

/// Number of dimensions produced by all-MiniLM-L6-v2.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Converts text to a fixed-dimension vector.
///
/// Callers truncate input to [`max_input_chars`](EmbeddingProvider::max_input_chars)
/// before calling [`embed`](EmbeddingProvider::embed) (see [`truncate_input`]).
/// A failed call is fatal for the calling operation; there is no fallback vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector of [`dimensions`](Self::dimensions) floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Longest input (in characters) the provider accepts.
    fn max_input_chars(&self) -> usize;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `local` fails if the model files are missing. Run `vigil model download` first.
/// `openai` fails with a configuration error when no API key is set.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Arc::new(provider))
        }
        "openai" => {
            let provider = openai::OpenAiEmbeddingProvider::new(config)?;
            Ok(Arc::new(provider))
        }
        "hashing" => Ok(Arc::new(hashing::HashingEmbeddingProvider::new(
            config.dimensions,
            config.max_input_chars,
        ))),
        other => Err(VigilError::config(format!(
            "unknown embedding provider: {other}. Supported: local, openai, hashing"
        ))),
    }
}

/// Cut `text` to at most `max_chars` characters, respecting UTF-8 boundaries.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// True when every component is zero. Such a vector has no direction and
/// cannot be compared under cosine distance.
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Cosine similarity of two vectors; 0.0 when either has zero norm or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}
