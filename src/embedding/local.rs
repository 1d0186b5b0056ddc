//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] using the all-MiniLM-L6-v2 model via `ort`.
//! Handles tokenization, inference, mean pooling, and L2 normalization. Inference
//! is CPU-bound and runs under `spawn_blocking`.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, LOCAL_EMBEDDING_DIM};
use crate::config::EmbeddingConfig;
use crate::error::{Result, VigilError};

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    model: Arc<OnnxModel>,
    max_input_chars: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(VigilError::config(format!(
                "ONNX model not found at {}. Run `vigil model download` first.",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(VigilError::config(format!(
                "Tokenizer not found at {}. Run `vigil model download` first.",
                tokenizer_path.display()
            )));
        }

        let model = load_model(&model_path, &tokenizer_path).map_err(VigilError::embedding)?;

        Ok(Self {
            model: Arc::new(model),
            max_input_chars: config.max_input_chars,
        })
    }
}

fn load_model(
    model_path: &std::path::Path,
    tokenizer_path: &std::path::Path,
) -> anyhow::Result<OnnxModel> {
    let session = Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(model_path)
        .context("failed to load ONNX model")?;

    tracing::info!(model = %model_path.display(), "ONNX model loaded");

    let mut tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length: MAX_SEQ_LEN,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

    tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

    Ok(OnnxModel {
        session: Mutex::new(session),
        tokenizer,
    })
}

impl OnnxModel {
    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = input_ids.len();

        let shape = vec![1i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))?;
        // token_type_ids: all zeros (single sentence, no segment B)
        let token_type_ids_tensor =
            Tensor::from_array((shape, vec![0i64; seq_len].into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        // The output name varies by ONNX export. Try common names, fall back to index 0.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .context("failed to extract token_embeddings tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == LOCAL_EMBEDDING_DIM as i64,
            "unexpected token_embeddings shape: {dims:?}, expected [1, seq, {LOCAL_EMBEDDING_DIM}]"
        );
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        Ok(l2_normalize(&mean_pool(
            data,
            &attention_mask,
            actual_seq_len,
            hidden_dim,
        )))
    }
}

/// Mean-pool token embeddings over positions where the attention mask is set.
fn mean_pool(data: &[f32], mask: &[i64], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for s in 0..seq_len.min(mask.len()) {
        let m = mask[s] as f32;
        if m > 0.0 {
            let offset = s * hidden_dim;
            for d in 0..hidden_dim {
                sum[d] += data[offset + d] * m;
            }
            count += m;
        }
    }

    if count > 0.0 {
        for v in &mut sum {
            *v /= count;
        }
    }
    sum
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed_one(&text))
            .await
            .map_err(|e| VigilError::embedding(format!("embedding task failed: {e}")))?
            .map_err(VigilError::embedding)
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_respects_mask() {
        // seq_len 3, hidden 2; third token masked out
        let data = vec![1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = vec![1, 1, 0];
        let pooled = mean_pool(&data, &mask, 3, 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_all_masked() {
        let pooled = mean_pool(&[1.0, 1.0], &[0], 1, 2);
        assert_eq!(pooled, vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_is_configuration_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            cache_dir: tmp.path().to_string_lossy().into_owned(),
            ..EmbeddingConfig::default()
        };
        let err = LocalEmbeddingProvider::new(&config).err().unwrap();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("vigil model download"));
    }

    fn model_config() -> EmbeddingConfig {
        EmbeddingConfig::default()
    }

    #[tokio::test]
    #[ignore] // Requires model files; run with: cargo test -- --ignored
    async fn test_embed_produces_384_dims() {
        let provider = LocalEmbeddingProvider::new(&model_config()).unwrap();
        let embedding = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), LOCAL_EMBEDDING_DIM);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }

    #[tokio::test]
    #[ignore]
    async fn test_similar_texts_have_high_cosine_similarity() {
        let provider = LocalEmbeddingProvider::new(&model_config()).unwrap();
        let emb1 = provider.embed("The build fails on missing env var").await.unwrap();
        let emb2 = provider.embed("Build failing because an env var is missing").await.unwrap();
        let emb3 = provider.embed("Quantum computing uses qubits").await.unwrap();

        let sim_similar = crate::embedding::cosine_similarity(&emb1, &emb2);
        let sim_different = crate::embedding::cosine_similarity(&emb1, &emb3);
        assert!(sim_similar > sim_different);
    }
}
