//! Session lifecycle.
//!
//! A [`Coordinator`] owns the single active-session slot. Starting a session
//! creates its [`Session`] handle (memory store, constraint tracker, stuck
//! detector, recovery engine) and backing collection; finalizing deletes the
//! collection and clears the slot. Every public operation goes through the
//! handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::VigilConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, VigilError};
use crate::index::{self, VectorIndex};
use crate::memory::constraints::{ConstraintTracker, ViolationCheck};
use crate::memory::stats::SessionStats;
use crate::memory::store::{collection_name, SessionMemory};
use crate::memory::types::{
    Constraint, ConstraintScope, DetectedFrom, NoteType, SearchResult, SessionNote,
};
use crate::recovery::{RecoveryAnalysis, RecoveryEngine};
use crate::stuck::{StuckAnalysis, StuckDetector, StuckPattern};

/// Summary of a session, returned by `start_session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub project_root: String,
    pub collection: String,
    pub started_at: DateTime<Utc>,
    pub embedding_provider: String,
    pub index_backend: String,
}

/// Result of `finalize_session`. `finalized` is false when no session was active.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

/// Handle to the active session.
pub struct Session {
    info: SessionInfo,
    project_root: PathBuf,
    memory: Arc<SessionMemory>,
    constraints: ConstraintTracker,
    detector: StuckDetector,
    recovery: RecoveryEngine,
}

impl Session {
    fn new(
        session_id: &str,
        project_root: PathBuf,
        config: &VigilConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let collection =
            collection_name(&config.index.collection_prefix, &project_root, session_id);
        let info = SessionInfo {
            session_id: session_id.to_string(),
            project_root: project_root.display().to_string(),
            collection: collection.clone(),
            started_at: Utc::now(),
            embedding_provider: embedder.name().to_string(),
            index_backend: index.backend().to_string(),
        };

        let memory = Arc::new(SessionMemory::new(
            session_id,
            collection,
            embedder,
            index,
            config.memory.clone(),
        ));
        let constraints = ConstraintTracker::new(
            Arc::clone(&memory),
            config.constraints.violation_similarity,
        );
        let detector = StuckDetector::new(
            Arc::clone(&memory),
            project_root.clone(),
            config.detection.clone(),
        );
        let recovery = RecoveryEngine::new(Arc::clone(&memory), config.recovery.clone());

        Self {
            info,
            project_root,
            memory,
            constraints,
            detector,
            recovery,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.session_id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn collection(&self) -> &str {
        self.memory.collection()
    }

    pub fn memory(&self) -> &Arc<SessionMemory> {
        &self.memory
    }

    /// Save a note and return its id. Constraint notes are tracked as explicit,
    /// session-scoped constraints and return the constraint id.
    pub async fn save_note(&self, note: SessionNote) -> Result<String> {
        if note.note_type == NoteType::Constraint {
            let constraint = self
                .track_constraint(
                    &note.content,
                    DetectedFrom::Explicit,
                    ConstraintScope::Session,
                )
                .await?;
            return Ok(constraint.id);
        }
        self.memory.save_note(&note).await
    }

    /// Semantic search; `limit` defaults to the configured search limit.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchResult> {
        let limit = limit.unwrap_or(self.memory.config().default_search_limit);
        self.memory.search(query, limit).await
    }

    pub async fn check_duplicate(
        &self,
        description: &str,
        threshold: Option<f64>,
    ) -> Vec<SearchResult> {
        self.memory.check_duplicate(description, threshold).await
    }

    pub async fn track_constraint(
        &self,
        content: &str,
        detected_from: DetectedFrom,
        scope: ConstraintScope,
    ) -> Result<Constraint> {
        self.constraints
            .track_constraint(content, detected_from, scope)
            .await
    }

    pub async fn get_active_constraints(&self) -> Result<Vec<Constraint>> {
        self.constraints.get_active_constraints().await
    }

    pub async fn lift_constraint(&self, constraint_id: &str) -> Result<Constraint> {
        self.constraints.lift_constraint(constraint_id).await
    }

    pub async fn check_violation(&self, proposed_action: &str) -> Result<ViolationCheck> {
        self.constraints.check_violation(proposed_action).await
    }

    pub async fn extract_valuable_memories(&self) -> Result<Vec<SearchResult>> {
        self.memory.extract_valuable_memories().await
    }

    pub async fn get_stats(&self) -> Result<SessionStats> {
        self.memory.get_stats().await
    }

    /// Run stuck detection; `project_root` overrides the session's root.
    pub async fn check_stuck_pattern(&self, project_root: Option<&Path>) -> StuckAnalysis {
        self.detector.analyze(project_root).await
    }

    pub async fn get_recovery_suggestions(
        &self,
        pattern: StuckPattern,
        project_root: Option<&Path>,
        max_suggestions: Option<usize>,
    ) -> RecoveryAnalysis {
        self.recovery
            .analyze(pattern, project_root, max_suggestions)
            .await
    }

    /// Delete the session's collection. Safe to call more than once.
    pub async fn finalize(&self) -> Result<()> {
        self.memory.cleanup().await
    }
}

/// Owns the single active session of this process.
pub struct Coordinator {
    config: Arc<VigilConfig>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    active: Mutex<Option<Arc<Session>>>,
}

impl Coordinator {
    pub fn new(
        config: VigilConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            index,
            active: Mutex::new(None),
        }
    }

    /// Build the embedding provider and vector index named in `config`.
    pub fn from_config(config: VigilConfig) -> Result<Self> {
        config.validate()?;
        let embedder = embedding::create_provider(&config.embedding)?;
        let db_path = config.resolved_index_path();
        let index = index::create_index(&config.index, db_path.as_deref())?;
        tracing::info!(
            embedding = embedder.name(),
            index = index.backend(),
            "coordinator ready"
        );
        Ok(Self::new(config, embedder, index))
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Start a session. Fails with `DuplicateSession` while another is active.
    pub async fn start_session(
        &self,
        session_id: &str,
        project_root: impl Into<PathBuf>,
    ) -> Result<Arc<Session>> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(VigilError::validation("session_id must not be empty"));
        }

        let mut slot = self.active.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Err(VigilError::DuplicateSession(existing.id().to_string()));
        }

        let session = Arc::new(Session::new(
            session_id,
            project_root.into(),
            &self.config,
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
        ));
        session.memory.initialize().await?;
        *slot = Some(Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            collection = %session.collection(),
            project_root = %session.project_root().display(),
            "session started"
        );
        Ok(session)
    }

    /// The active session, or `SessionNotFound`.
    pub async fn active(&self) -> Result<Arc<Session>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(VigilError::SessionNotFound)
    }

    /// Delete the active session's collection and clear the slot.
    ///
    /// Without an active session this is a no-op. If the collection cannot be
    /// deleted the session stays active so the call can be retried.
    pub async fn finalize_session(&self) -> Result<FinalizeReport> {
        let mut slot = self.active.lock().await;
        let Some(session) = slot.as_ref().map(Arc::clone) else {
            return Ok(FinalizeReport {
                finalized: false,
                session_id: None,
                collection: None,
            });
        };

        session.finalize().await?;
        *slot = None;

        tracing::info!(session_id = %session.id(), "session finalized");
        Ok(FinalizeReport {
            finalized: true,
            session_id: Some(session.id().to_string()),
            collection: Some(session.collection().to_string()),
        })
    }
}
