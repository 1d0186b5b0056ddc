pub mod constraints;
pub mod notes;
pub mod session;
pub mod stuck;

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;

use constraints::{CheckViolationParams, LiftConstraintParams, TrackConstraintParams};
use notes::{CheckDuplicateParams, SaveNoteParams, SearchNotesParams};
use session::SessionStartParams;
use stuck::{CheckStuckParams, RecoverySuggestionsParams};

use crate::error::VigilError;
use crate::memory::types::{ConstraintScope, DetectedFrom, NoteType, SessionNote};
use crate::session::{Coordinator, Session};
use crate::stuck::StuckPattern;

/// Structured error body returned to the client.
fn error_json(err: &VigilError) -> String {
    serde_json::json!({ "error": err.kind(), "message": err.to_string() }).to_string()
}

fn respond<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| {
        serde_json::json!({ "error": "serialization_error", "message": e.to_string() })
            .to_string()
    })
}

fn invalid(msg: impl Into<String>) -> String {
    error_json(&VigilError::validation(msg))
}

/// The vigil MCP tool handler. Holds the session coordinator and exposes one
/// tool per session operation via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct VigilTools {
    tool_router: ToolRouter<Self>,
    coordinator: Arc<Coordinator>,
}

impl VigilTools {
    async fn session(&self) -> Result<Arc<Session>, String> {
        self.coordinator.active().await.map_err(|e| error_json(&e))
    }
}

#[tool_router]
impl VigilTools {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            coordinator,
        }
    }

    /// Start the session. Only one session can be active at a time.
    #[tool(description = "Start a coordination session for a project. Creates the session's memory. Fails if a session is already active.")]
    async fn session_start(
        &self,
        Parameters(params): Parameters<SessionStartParams>,
    ) -> Result<String, String> {
        let project_root = match params.project_root.filter(|p| !p.is_empty()) {
            Some(p) => PathBuf::from(p),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        tracing::info!(session_id = %params.session_id, "session_start called");

        let session = self
            .coordinator
            .start_session(&params.session_id, project_root)
            .await
            .map_err(|e| error_json(&e))?;
        respond(session.info())
    }

    /// Finalize the active session, deleting its memory.
    #[tool(description = "Finalize the active session and delete its memory. Safe to call when no session is active.")]
    async fn session_finalize(&self) -> Result<String, String> {
        tracing::info!("session_finalize called");
        let report = self
            .coordinator
            .finalize_session()
            .await
            .map_err(|e| error_json(&e))?;
        respond(&report)
    }

    /// Save a note into session memory.
    #[tool(description = "Save a session note. Types: decision, hypothesis, blocker, learning, pattern, constraint (tracked as a session constraint).")]
    async fn save_note(
        &self,
        Parameters(params): Parameters<SaveNoteParams>,
    ) -> Result<String, String> {
        let note_type: NoteType = params.r#type.parse().map_err(|e: String| invalid(e))?;
        let metadata = match params.metadata {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(serde_json::Value::Object(map)) => map,
            Some(_) => return Err(invalid("metadata must be a JSON object")),
        };

        let session = self.session().await?;
        tracing::info!(
            session_id = %session.id(),
            note_type = %note_type,
            content_len = params.content.len(),
            "save_note called"
        );

        let note = SessionNote::new(note_type, params.content).with_metadata(metadata);
        let id = session.save_note(note).await.map_err(|e| error_json(&e))?;
        respond(&serde_json::json!({ "id": id, "type": note_type }))
    }

    /// Semantic search over session notes.
    #[tool(description = "Search session notes by meaning. Returns notes ranked by similarity (0-1).")]
    async fn search_notes(
        &self,
        Parameters(params): Parameters<SearchNotesParams>,
    ) -> Result<String, String> {
        let session = self.session().await?;
        let results = session.search(&params.query, params.limit).await;
        respond(&serde_json::json!({ "results": results, "total": results.len() }))
    }

    /// Check whether similar work is already recorded.
    #[tool(description = "Check whether a described piece of work duplicates something already noted this session.")]
    async fn check_duplicate(
        &self,
        Parameters(params): Parameters<CheckDuplicateParams>,
    ) -> Result<String, String> {
        if let Some(t) = params.threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(invalid("threshold must be between 0.0 and 1.0"));
            }
        }
        let session = self.session().await?;
        let matches = session
            .check_duplicate(&params.description, params.threshold)
            .await;
        respond(&serde_json::json!({
            "duplicate": !matches.is_empty(),
            "matches": matches,
        }))
    }

    /// Track a behavioral constraint for the session.
    #[tool(description = "Track a constraint (a rule such as 'do not touch the migrations'). Keywords are extracted for violation checks.")]
    async fn track_constraint(
        &self,
        Parameters(params): Parameters<TrackConstraintParams>,
    ) -> Result<String, String> {
        let scope = match params.scope.as_deref() {
            Some(s) => s.parse::<ConstraintScope>().map_err(|e: String| invalid(e))?,
            None => ConstraintScope::Session,
        };
        let detected_from = match params.detected_from.as_deref() {
            Some(s) => s.parse::<DetectedFrom>().map_err(|e: String| invalid(e))?,
            None => DetectedFrom::Explicit,
        };

        let session = self.session().await?;
        let constraint = session
            .track_constraint(&params.content, detected_from, scope)
            .await
            .map_err(|e| error_json(&e))?;
        respond(&constraint)
    }

    /// List active constraints.
    #[tool(description = "List the session's active (not lifted) constraints, oldest first.")]
    async fn list_constraints(&self) -> Result<String, String> {
        let session = self.session().await?;
        let constraints = session
            .get_active_constraints()
            .await
            .map_err(|e| error_json(&e))?;
        respond(&serde_json::json!({ "constraints": constraints, "total": constraints.len() }))
    }

    /// Lift a constraint.
    #[tool(description = "Lift a constraint so it no longer applies. The history is kept.")]
    async fn lift_constraint(
        &self,
        Parameters(params): Parameters<LiftConstraintParams>,
    ) -> Result<String, String> {
        let session = self.session().await?;
        let constraint = session
            .lift_constraint(&params.constraint_id)
            .await
            .map_err(|e| error_json(&e))?;
        respond(&constraint)
    }

    /// Check a proposed action against active constraints.
    #[tool(description = "Check whether a proposed action would violate an active constraint (by keyword or meaning).")]
    async fn check_violation(
        &self,
        Parameters(params): Parameters<CheckViolationParams>,
    ) -> Result<String, String> {
        let session = self.session().await?;
        let check = session
            .check_violation(&params.proposed_action)
            .await
            .map_err(|e| error_json(&e))?;
        respond(&check)
    }

    /// Export the session's non-constraint notes.
    #[tool(description = "Return every decision, hypothesis, blocker, learning and pattern from this session, newest first.")]
    async fn extract_memories(&self) -> Result<String, String> {
        let session = self.session().await?;
        let memories = session
            .extract_valuable_memories()
            .await
            .map_err(|e| error_json(&e))?;
        respond(&serde_json::json!({ "memories": memories, "total": memories.len() }))
    }

    /// Session statistics.
    #[tool(description = "Get session memory statistics: total notes and counts per type.")]
    async fn session_stats(&self) -> Result<String, String> {
        let session = self.session().await?;
        let stats = session.get_stats().await.map_err(|e| error_json(&e))?;
        respond(&stats)
    }

    /// Run stuck detection.
    #[tool(description = "Analyze whether the session looks stuck: repeated blockers, no file changes, or an error loop.")]
    async fn check_stuck(
        &self,
        Parameters(params): Parameters<CheckStuckParams>,
    ) -> Result<String, String> {
        let session = self.session().await?;
        let root = params.project_root.filter(|p| !p.is_empty()).map(PathBuf::from);
        let analysis = session.check_stuck_pattern(root.as_deref()).await;
        respond(&analysis)
    }

    /// Recovery suggestions for a stuck pattern.
    #[tool(description = "Get ranked recovery suggestions for a stuck pattern from check_stuck, drawn from this session's decisions, learnings and patterns.")]
    async fn recovery_suggestions(
        &self,
        Parameters(params): Parameters<RecoverySuggestionsParams>,
    ) -> Result<String, String> {
        let pattern: StuckPattern = serde_json::from_value(params.pattern)
            .map_err(|e| invalid(format!("invalid stuck pattern: {e}")))?;
        let session = self.session().await?;
        let root = params.project_root.filter(|p| !p.is_empty()).map(PathBuf::from);
        let analysis = session
            .get_recovery_suggestions(pattern, root.as_deref(), params.max_suggestions)
            .await;
        respond(&analysis)
    }
}

#[tool_handler]
impl ServerHandler for VigilTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "vigil coordinates a single work session. Call session_start first, record \
                 progress with save_note, check work with check_duplicate and check_violation, \
                 and call check_stuck periodically. Finish with session_finalize."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VigilConfig;
    use crate::embedding::hashing::HashingEmbeddingProvider;
    use crate::index::sqlite::SqliteVectorIndex;
    use serde_json::Value;

    fn tools() -> VigilTools {
        let coordinator = Coordinator::new(
            VigilConfig::default(),
            Arc::new(HashingEmbeddingProvider::new(64, 8000)),
            Arc::new(SqliteVectorIndex::open_in_memory().unwrap()),
        );
        VigilTools::new(Arc::new(coordinator))
    }

    async fn start(tools: &VigilTools) {
        let tmp = std::env::temp_dir();
        tools
            .session_start(Parameters(SessionStartParams {
                session_id: "t1".into(),
                project_root: Some(tmp.display().to_string()),
            }))
            .await
            .unwrap();
    }

    fn error_kind(err: &str) -> String {
        let v: Value = serde_json::from_str(err).unwrap();
        v["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_tools_require_session() {
        let tools = tools();
        let err = tools.session_stats().await.unwrap_err();
        assert_eq!(error_kind(&err), "session_not_found");
    }

    #[tokio::test]
    async fn test_duplicate_start_is_structured_error() {
        let tools = tools();
        start(&tools).await;
        let err = tools
            .session_start(Parameters(SessionStartParams {
                session_id: "t2".into(),
                project_root: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), "duplicate_session");
    }

    #[tokio::test]
    async fn test_save_note_validates_type() {
        let tools = tools();
        start(&tools).await;
        let err = tools
            .save_note(Parameters(SaveNoteParams {
                r#type: "todo".into(),
                content: "x".into(),
                metadata: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), "validation_error");
    }

    #[tokio::test]
    async fn test_constraint_note_is_listed() {
        let tools = tools();
        start(&tools).await;
        tools
            .save_note(Parameters(SaveNoteParams {
                r#type: "constraint".into(),
                content: "never edit generated files".into(),
                metadata: None,
            }))
            .await
            .unwrap();

        let out = tools.list_constraints().await.unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["total"], 1);
        assert_eq!(v["constraints"][0]["scope"], "session");
        assert_eq!(v["constraints"][0]["detected_from"], "explicit");
    }

    #[tokio::test]
    async fn test_recovery_rejects_malformed_pattern() {
        let tools = tools();
        start(&tools).await;
        let err = tools
            .recovery_suggestions(Parameters(RecoverySuggestionsParams {
                pattern: serde_json::json!({"type": "bored"}),
                project_root: None,
                max_suggestions: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), "validation_error");
    }

    #[tokio::test]
    async fn test_finalize_twice() {
        let tools = tools();
        start(&tools).await;
        let first: Value =
            serde_json::from_str(&tools.session_finalize().await.unwrap()).unwrap();
        assert_eq!(first["finalized"], true);
        let second: Value =
            serde_json::from_str(&tools.session_finalize().await.unwrap()).unwrap();
        assert_eq!(second["finalized"], false);
    }
}
