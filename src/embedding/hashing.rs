//! Deterministic feature-hashing embedder.
//!
//! Lowercased alphanumeric tokens are hashed (FNV-1a) into a fixed number of
//! buckets with a sign bit, and the result is L2-normalized. Identical text
//! always yields identical vectors and texts sharing words land close together,
//! which is enough for offline use and for tests. It has no notion of synonyms.

use async_trait::async_trait;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashingEmbeddingProvider {
    dimensions: usize,
    max_input_chars: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize, max_input_chars: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            max_input_chars,
        }
    }

    /// Synchronous embedding, shared by the async trait method.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&v)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn identical_text_identical_vector() {
        let p = HashingEmbeddingProvider::new(384, 8000);
        assert_eq!(p.embed_sync("Fix the build"), p.embed_sync("fix the BUILD!"));
    }

    #[test]
    fn vectors_are_normalized() {
        let p = HashingEmbeddingProvider::new(64, 8000);
        let v = p.embed_sync("database migration failed on startup");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let p = HashingEmbeddingProvider::new(16, 8000);
        assert!(p.embed_sync("   ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_words_raise_similarity() {
        let p = HashingEmbeddingProvider::new(384, 8000);
        let a = p.embed_sync("postgres connection pool exhausted");
        let b = p.embed_sync("the postgres connection pool is exhausted again");
        let c = p.embed_sync("rename the css classes in header");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
        assert!(cosine_similarity(&a, &b) > 0.5);
    }
}
