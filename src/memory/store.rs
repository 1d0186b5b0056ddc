//! Session memory store: one collection per session, notes embedded on write.
//!
//! Writes and exact reads propagate embedding/index errors. Semantic search is
//! best-effort and degrades to an empty result with a warning.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use super::stats::{self, SessionStats};
use super::types::{NoteRecord, NoteType, SearchResult, SessionNote};
use crate::config::MemoryConfig;
use crate::embedding::{is_zero_vector, truncate_input, EmbeddingProvider};
use crate::error::{Result, VigilError};
use crate::index::{sanitize_identifier, PayloadFilter, Point, ScoredPoint, VectorIndex};

/// Payload field every collection is indexed on.
pub const TYPE_FIELD: &str = "type";

/// Build the collection name `<prefix>_<project dir>_<session id>`, sanitized
/// to `[a-z0-9_]`.
pub fn collection_name(prefix: &str, project_root: &Path, session_id: &str) -> String {
    let project = project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    format!(
        "{}_{}_{}",
        sanitize_identifier(prefix),
        sanitize_identifier(&project),
        sanitize_identifier(session_id)
    )
}

/// Ephemeral semantic memory for a single session.
pub struct SessionMemory {
    session_id: String,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: MemoryConfig,
}

impl SessionMemory {
    pub fn new(
        session_id: &str,
        collection: String,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            collection,
            embedder,
            index,
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub(crate) fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Create (or reuse) the backing collection and its `type` payload index.
    pub async fn initialize(&self) -> Result<()> {
        let dimension = self.embedder.dimensions();
        if !self.index.collection_exists(&self.collection).await? {
            self.index
                .create_collection(&self.collection, dimension)
                .await?;
            tracing::info!(
                session_id = %self.session_id,
                collection = %self.collection,
                dimension,
                backend = self.index.backend(),
                "session collection created"
            );
        }
        self.index
            .ensure_payload_index(&self.collection, TYPE_FIELD)
            .await?;
        Ok(())
    }

    /// Embed text, truncated to the provider's input limit.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_input(text, self.embedder.max_input_chars());
        self.embedder.embed(input).await
    }

    /// Persist a plain note. Constraint notes go through the constraint tracker.
    pub async fn save_note(&self, note: &SessionNote) -> Result<String> {
        if note.content.trim().is_empty() {
            return Err(VigilError::validation("note content must not be empty"));
        }
        let record = NoteRecord::from_note(note, Utc::now()).ok_or_else(|| {
            VigilError::validation("constraint notes must be saved via track_constraint")
        })?;
        self.save_record(&record).await
    }

    /// Embed a record's content and upsert it under a fresh UUID v7.
    pub async fn save_record(&self, record: &NoteRecord) -> Result<String> {
        let vector = self.embed(record.content()).await?;
        if is_zero_vector(&vector) {
            return Err(VigilError::validation(
                "note content has no text the embedding provider can represent",
            ));
        }
        let payload = record
            .to_payload()
            .map_err(|e| VigilError::validation(format!("unserializable note: {e}")))?;
        let id = uuid::Uuid::now_v7().to_string();

        self.index
            .upsert(
                &self.collection,
                Point {
                    id: id.clone(),
                    vector,
                    payload,
                },
            )
            .await?;

        tracing::debug!(
            session_id = %self.session_id,
            note_type = %record.note_type(),
            id = %id,
            "note saved"
        );
        Ok(id)
    }

    /// Semantic search, best match first. Failures yield an empty list.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        match self.try_search(query, limit).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "search failed, returning no results"
                );
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let vector = self.embed(query).await?;
        if is_zero_vector(&vector) {
            return Ok(Vec::new());
        }
        let points = self
            .index
            .search(&self.collection, &vector, limit, None)
            .await?;
        Ok(self.validate_points(points))
    }

    /// Semantic search restricted to `types`, best match first across all of
    /// them. The filter runs inside the index, so notes of other types never
    /// crowd the window. Failures yield an empty list.
    pub async fn search_types(
        &self,
        query: &str,
        types: &[NoteType],
        limit: usize,
    ) -> Vec<SearchResult> {
        match self.try_search_types(query, types, limit).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "filtered search failed, returning no results"
                );
                Vec::new()
            }
        }
    }

    async fn try_search_types(
        &self,
        query: &str,
        types: &[NoteType],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 || types.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        if is_zero_vector(&vector) {
            return Ok(Vec::new());
        }
        let mut points = Vec::new();
        for note_type in types {
            let filter = PayloadFilter::new(TYPE_FIELD, note_type.as_str());
            points.extend(
                self.index
                    .search(&self.collection, &vector, limit, Some(&filter))
                    .await?,
            );
        }
        let mut results = self.validate_points(points);
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }

    /// Notes semantically close to `description`, at or above `threshold`
    /// (the configured duplicate threshold when `None`).
    pub async fn check_duplicate(
        &self,
        description: &str,
        threshold: Option<f64>,
    ) -> Vec<SearchResult> {
        let threshold = threshold.unwrap_or(self.config.duplicate_threshold);
        self.search(description, 5)
            .await
            .into_iter()
            .filter(|r| r.score >= threshold)
            .collect()
    }

    /// All notes of one type (up to the configured cap), unranked, score 1.0.
    pub async fn get_notes_by_type(&self, note_type: NoteType) -> Result<Vec<SearchResult>> {
        let filter = PayloadFilter::new(TYPE_FIELD, note_type.as_str());
        let points = self
            .index
            .scroll(&self.collection, &filter, self.config.type_fetch_limit)
            .await?;
        Ok(self.validate_points(points))
    }

    /// Every non-constraint note, newest first.
    pub async fn extract_valuable_memories(&self) -> Result<Vec<SearchResult>> {
        let mut all = Vec::new();
        for note_type in NoteType::VALUABLE {
            all.extend(self.get_notes_by_type(note_type).await?);
        }
        all.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(all)
    }

    pub async fn get_stats(&self) -> Result<SessionStats> {
        stats::session_stats(self).await
    }

    /// Delete the backing collection. Already-absent is success.
    pub async fn cleanup(&self) -> Result<()> {
        self.index.delete_collection(&self.collection).await?;
        tracing::info!(
            session_id = %self.session_id,
            collection = %self.collection,
            "session collection deleted"
        );
        Ok(())
    }

    /// Convert index points to results, skipping payloads that fail validation.
    fn validate_points(&self, points: Vec<ScoredPoint>) -> Vec<SearchResult> {
        points
            .into_iter()
            .filter_map(|p| match NoteRecord::from_payload(p.payload) {
                Ok(record) => Some(SearchResult {
                    id: p.id,
                    score: p.score.clamp(0.0, 1.0),
                    record,
                }),
                Err(e) => {
                    tracing::warn!(
                        collection = %self.collection,
                        id = %p.id,
                        error = %e,
                        "skipping point with invalid payload"
                    );
                    None
                }
            })
            .collect()
    }
}
