//! Recovery suggestions for a detected stuck pattern.
//!
//! A query is built from the pattern's type and first evidence line, the
//! current session is searched for decisions, learnings and patterns, and the
//! candidates are ranked by a weighted mix of relevance, recency and recorded
//! success rate. Past sessions and a pattern library are recognised sources
//! but not searched.

pub mod extract;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::memory::store::SessionMemory;
use crate::memory::types::{NoteType, SearchResult};
use crate::stuck::{StuckPattern, StuckPatternType};

const NO_PROGRESS_QUERY: &str = "next step approach plan breakthrough progress solution";
const MIN_CANDIDATES: usize = 20;
/// Note types that can answer a stuck pattern.
const SUGGESTION_TYPES: [NoteType; 3] = [NoteType::Decision, NoteType::Learning, NoteType::Pattern];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    CurrentSession,
    PastSession,
    PatternLibrary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Implementation {
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_example: Option<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuggestionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoverySuggestion {
    pub title: String,
    pub description: String,
    pub source: SuggestionSource,
    /// Similarity of the note to the recovery query.
    pub relevance_score: f64,
    /// Weighted relevance, recency and success; suggestions are sorted by this.
    pub composite_score: f64,
    pub implementation: Implementation,
    pub metadata: SuggestionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAnalysis {
    pub stuck_pattern: StuckPattern,
    pub query: String,
    pub suggestions: Vec<RecoverySuggestion>,
    pub sources_searched: Vec<SuggestionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Drop a leading `[timestamp] ` prefix from an evidence line.
fn strip_timestamp(line: &str) -> &str {
    line.strip_prefix('[')
        .and_then(|rest| rest.split_once("] "))
        .map(|(_, text)| text)
        .unwrap_or(line)
        .trim()
}

/// Search query targeted at the pattern.
pub fn build_query(pattern: &StuckPattern) -> String {
    let evidence = pattern
        .details
        .evidence
        .first()
        .map(|l| strip_timestamp(l))
        .unwrap_or_default();
    let query = match pattern.pattern_type {
        StuckPatternType::RepeatedBlocker => format!("solution fix resolve {evidence}"),
        StuckPatternType::ErrorLoop => format!("fix error {evidence} solution"),
        StuckPatternType::NoProgress => NO_PROGRESS_QUERY.to_string(),
    };
    query.trim().to_string()
}

/// Recency bucket: under an hour 1.0, a day 0.7, a week 0.4, older 0.2.
pub fn recency_score(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now - timestamp;
    if age < Duration::hours(1) {
        1.0
    } else if age < Duration::hours(24) {
        0.7
    } else if age < Duration::days(7) {
        0.4
    } else {
        0.2
    }
}

pub fn composite_score(
    relevance: f64,
    recency: f64,
    success: f64,
    config: &RecoveryConfig,
) -> f64 {
    config.relevance_weight * relevance
        + config.recency_weight * recency
        + config.success_weight * success
}

/// Convert a note into an unranked suggestion.
pub fn to_suggestion(result: &SearchResult, session_id: &str) -> RecoverySuggestion {
    let content = result.content();
    let metadata = result.metadata();

    let references = metadata
        .get("references")
        .and_then(|v| v.as_array())
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let success_rate = metadata.get("success_rate").and_then(|v| v.as_f64());

    RecoverySuggestion {
        title: extract::extract_title(content),
        description: content.to_string(),
        source: SuggestionSource::CurrentSession,
        relevance_score: result.score,
        composite_score: result.score,
        implementation: Implementation {
            steps: extract::extract_steps(content),
            code_example: extract::extract_code_example(content),
            references,
        },
        metadata: SuggestionMetadata {
            session_id: Some(session_id.to_string()),
            timestamp: Some(result.timestamp()),
            success_rate,
        },
    }
}

/// Score, sort descending and truncate candidates.
pub fn rank(
    candidates: &[SearchResult],
    session_id: &str,
    limit: usize,
    config: &RecoveryConfig,
    now: DateTime<Utc>,
) -> Vec<RecoverySuggestion> {
    let mut suggestions: Vec<RecoverySuggestion> = candidates
        .iter()
        .map(|result| {
            let mut s = to_suggestion(result, session_id);
            let success = s
                .metadata
                .success_rate
                .unwrap_or(config.default_success_rate);
            s.composite_score = composite_score(
                result.score,
                recency_score(result.timestamp(), now),
                success,
                config,
            );
            s
        })
        .collect();
    suggestions.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    suggestions.truncate(limit);
    suggestions
}

pub struct RecoveryEngine {
    memory: Arc<SessionMemory>,
    config: RecoveryConfig,
}

impl RecoveryEngine {
    pub fn new(memory: Arc<SessionMemory>, config: RecoveryConfig) -> Self {
        Self { memory, config }
    }

    /// Ranked suggestions from the current session. Search failures yield none.
    pub async fn generate_suggestions(
        &self,
        pattern: &StuckPattern,
        limit: usize,
    ) -> Vec<RecoverySuggestion> {
        let query = build_query(pattern);
        self.suggest(&query, limit).await
    }

    async fn suggest(&self, query: &str, limit: usize) -> Vec<RecoverySuggestion> {
        if limit == 0 {
            return Vec::new();
        }
        let fetch = (limit * 4).max(MIN_CANDIDATES);
        let candidates = self
            .memory
            .search_types(query, &SUGGESTION_TYPES, fetch)
            .await;

        rank(
            &candidates,
            self.memory.session_id(),
            limit,
            &self.config,
            Utc::now(),
        )
    }

    /// Suggestions wrapped with the query and sources used.
    pub async fn analyze(
        &self,
        pattern: StuckPattern,
        project_root: Option<&Path>,
        limit: Option<usize>,
    ) -> RecoveryAnalysis {
        let limit = limit.unwrap_or(self.config.default_max_suggestions);
        let query = build_query(&pattern);
        let suggestions = self.suggest(&query, limit).await;

        tracing::info!(
            session_id = %self.memory.session_id(),
            pattern = %pattern.pattern_type,
            project_root = ?project_root,
            suggestions = suggestions.len(),
            "recovery suggestions generated"
        );

        RecoveryAnalysis {
            stuck_pattern: pattern,
            query,
            suggestions,
            sources_searched: vec![SuggestionSource::CurrentSession],
            project_root: project_root.map(|p| p.display().to_string()),
            generated_at: Utc::now(),
        }
    }
}
