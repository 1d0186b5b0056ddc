//! Vector index abstraction.
//!
//! A [`VectorIndex`] stores points (id, vector, JSON payload) in named
//! collections and answers cosine nearest-neighbour search, exact retrieval by
//! a keyword payload field, and counts. Two backends are provided:
//!
//! - [`sqlite::SqliteVectorIndex`]: embedded SQLite + sqlite-vec (default, in-memory)
//! - [`qdrant::QdrantVectorIndex`]: a Qdrant server over its REST API

pub mod qdrant;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::IndexConfig;
use crate::error::{Result, VigilError};

/// Arbitrary JSON payload attached to a point.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A point to upsert.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A point returned from search or scroll. `score` is cosine similarity for
/// search and `1.0` for exact retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: Payload,
}

/// Exact match on a keyword payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFilter {
    pub key: String,
    pub value: String,
}

impl PayloadFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Storage contract for per-session collections.
///
/// `create_collection`, `ensure_payload_index` and `delete_collection` are
/// idempotent: "already exists" and "not found" are success.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a cosine-distance collection for vectors of `dimension` floats.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Ensure a keyword index exists on payload field `field`.
    async fn ensure_payload_index(&self, name: &str, field: &str) -> Result<()>;

    async fn upsert(&self, name: &str, point: Point) -> Result<()>;

    /// Nearest-neighbour search, best match first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Exact retrieval of up to `limit` points matching `filter`, unranked.
    async fn scroll(
        &self,
        name: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, name: &str, filter: Option<&PayloadFilter>) -> Result<u64>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Create a vector index backend from config.
pub fn create_index(
    config: &IndexConfig,
    db_path: Option<&std::path::Path>,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "sqlite" => {
            let index = match db_path {
                Some(path) => sqlite::SqliteVectorIndex::open(path)?,
                None => sqlite::SqliteVectorIndex::open_in_memory()?,
            };
            Ok(Arc::new(index))
        }
        "qdrant" => Ok(Arc::new(qdrant::QdrantVectorIndex::new(config)?)),
        other => Err(VigilError::config(format!(
            "unknown index backend: {other}. Supported: sqlite, qdrant"
        ))),
    }
}

/// True if `name` only uses `[a-z0-9_]` and is non-empty. Collection and field
/// names are interpolated into SQL identifiers, so anything else is rejected.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Lowercase `raw` and replace every character outside `[a-z0-9]` with `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    let s: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() {
        "_".to_string()
    } else {
        s
    }
}
