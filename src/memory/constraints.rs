//! Session constraints: tracking, lifting and violation checks.
//!
//! Constraints are stored as `constraint` records in the session collection.
//! Records are never edited: lifting appends a second record with the same
//! `constraint_id` and `status: lifted`, and the active set is derived from the
//! latest record per id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use super::store::SessionMemory;
use super::types::{
    Constraint, ConstraintBody, ConstraintScope, ConstraintStatus, DetectedFrom, NoteRecord,
    NoteType, SearchResult, RECORD_SCHEMA_VERSION,
};
use crate::embedding::cosine_similarity;
use crate::error::{Result, VigilError};

/// Two-word indicators are matched before single words.
const PAIR_INDICATORS: [(&str, &str); 3] = [("must", "not"), ("should", "not"), ("do", "not")];
const WORD_INDICATORS: [&str; 8] = [
    "no", "not", "never", "don't", "avoid", "must", "only", "without",
];
/// Words captured after each indicator.
const CAPTURE_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub constraint_id: String,
    pub content: String,
    pub severity: Severity,
    pub similarity: f64,
    pub matched_keywords: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationCheck {
    pub violated: bool,
    pub violations: Vec<Violation>,
}

fn strip_punctuation(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Derive keywords from constraint text.
///
/// Scans lower-cased words for negation/requirement indicators and keeps
/// each indicator plus the next three words, stripped of surrounding
/// punctuation, longer than two characters, deduplicated in first-seen order.
pub fn extract_keywords(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let mut keywords: Vec<String> = Vec::new();

    // An indicator must end its whitespace token (no trailing punctuation) and
    // be followed by another word.
    let ends_with = |raw: &str, word: &str| raw.ends_with(word) && strip_punctuation(raw) == word;

    let mut i = 0;
    while i < words.len() {
        let pair = PAIR_INDICATORS.iter().find(|(a, b)| {
            i + 2 < words.len() && ends_with(words[i], *a) && ends_with(words[i + 1], *b)
        });
        let indicator_len = if pair.is_some() {
            2
        } else if i + 1 < words.len()
            && WORD_INDICATORS.iter().any(|w| ends_with(words[i], *w))
        {
            1
        } else {
            i += 1;
            continue;
        };

        let end = (i + indicator_len + CAPTURE_WORDS).min(words.len());
        for raw in &words[i..end] {
            let word = strip_punctuation(raw);
            if word.chars().count() > 2 && !keywords.iter().any(|k| k == word) {
                keywords.push(word.to_string());
            }
        }
        i += indicator_len;
    }

    keywords
}

/// Tracks constraints for one session on top of its [`SessionMemory`].
pub struct ConstraintTracker {
    memory: Arc<SessionMemory>,
    violation_similarity: f64,
}

impl ConstraintTracker {
    pub fn new(memory: Arc<SessionMemory>, violation_similarity: f64) -> Self {
        Self {
            memory,
            violation_similarity,
        }
    }

    /// Persist a new active constraint.
    pub async fn track_constraint(
        &self,
        content: &str,
        detected_from: DetectedFrom,
        scope: ConstraintScope,
    ) -> Result<Constraint> {
        if content.trim().is_empty() {
            return Err(VigilError::validation("constraint content must not be empty"));
        }

        let body = ConstraintBody {
            schema_version: RECORD_SCHEMA_VERSION,
            content: content.to_string(),
            timestamp: Utc::now(),
            constraint_id: uuid::Uuid::now_v7().to_string(),
            status: ConstraintStatus::Active,
            scope,
            detected_from,
            keywords: extract_keywords(content),
            violated_count: 0,
            metadata: Map::new(),
        };
        let constraint = Constraint::from(&body);
        self.memory.save_record(&NoteRecord::Constraint(body)).await?;

        tracing::info!(
            session_id = %self.memory.session_id(),
            constraint_id = %constraint.id,
            scope = %constraint.scope,
            keywords = constraint.keywords.len(),
            "constraint tracked"
        );
        Ok(constraint)
    }

    /// Constraints whose latest record is active, oldest first.
    pub async fn get_active_constraints(&self) -> Result<Vec<Constraint>> {
        let records = self.memory.get_notes_by_type(NoteType::Constraint).await?;
        Ok(active_constraints(&records))
    }

    /// Append a `lifted` record for `constraint_id`.
    ///
    /// Lifting an already-lifted constraint returns it without writing again.
    pub async fn lift_constraint(&self, constraint_id: &str) -> Result<Constraint> {
        let records = self.memory.get_notes_by_type(NoteType::Constraint).await?;
        let history: Vec<(&str, &ConstraintBody)> = records
            .iter()
            .filter_map(|r| r.record.as_constraint().map(|c| (r.id.as_str(), c)))
            .filter(|(_, c)| c.constraint_id == constraint_id)
            .collect();

        if history.is_empty() {
            return Err(VigilError::ConstraintNotFound(constraint_id.to_string()));
        }
        if let Some((_, latest)) = latest_record(&history) {
            if latest.status == ConstraintStatus::Lifted {
                return Ok(Constraint::from(latest));
            }
        }

        let (original_point, original) = history
            .iter()
            .filter(|(_, c)| c.status == ConstraintStatus::Active)
            .min_by_key(|(_, c)| c.timestamp)
            .copied()
            .unwrap_or(history[0]);

        let mut metadata = Map::new();
        metadata.insert("lifted_from".into(), Value::String(original_point.to_string()));
        let lifted = ConstraintBody {
            schema_version: RECORD_SCHEMA_VERSION,
            content: format!("[LIFTED] {}", original.content),
            timestamp: Utc::now(),
            constraint_id: original.constraint_id.clone(),
            status: ConstraintStatus::Lifted,
            scope: original.scope,
            detected_from: original.detected_from,
            keywords: original.keywords.clone(),
            violated_count: original.violated_count,
            metadata,
        };
        let constraint = Constraint::from(&lifted);
        self.memory
            .save_record(&NoteRecord::Constraint(lifted))
            .await?;

        tracing::info!(
            session_id = %self.memory.session_id(),
            constraint_id,
            "constraint lifted"
        );
        Ok(constraint)
    }

    /// Check a proposed action against every active constraint.
    pub async fn check_violation(&self, proposed_action: &str) -> Result<ViolationCheck> {
        let active = self.get_active_constraints().await?;
        if active.is_empty() {
            return Ok(ViolationCheck {
                violated: false,
                violations: Vec::new(),
            });
        }

        let action_vector = self.memory.embed(proposed_action).await?;
        let action_lower = proposed_action.to_lowercase();

        let mut violations = Vec::new();
        for constraint in active {
            let constraint_vector = self.memory.embed(&constraint.content).await?;
            let similarity = cosine_similarity(&action_vector, &constraint_vector);
            let matched_keywords: Vec<String> = constraint
                .keywords
                .iter()
                .filter(|k| action_lower.contains(k.as_str()))
                .cloned()
                .collect();

            if similarity <= self.violation_similarity && matched_keywords.is_empty() {
                continue;
            }

            let reason = if matched_keywords.is_empty() {
                format!(
                    "semantically similar to constraint ({:.0}% similarity)",
                    similarity * 100.0
                )
            } else {
                format!("matches constraint keywords: {}", matched_keywords.join(", "))
            };
            let severity = match constraint.scope {
                ConstraintScope::Session => Severity::High,
                ConstraintScope::Task | ConstraintScope::File => Severity::Medium,
            };

            violations.push(Violation {
                constraint_id: constraint.id,
                content: constraint.content,
                severity,
                similarity,
                matched_keywords,
                reason,
            });
        }

        if !violations.is_empty() {
            tracing::warn!(
                session_id = %self.memory.session_id(),
                count = violations.len(),
                "proposed action violates constraints"
            );
        }

        Ok(ViolationCheck {
            violated: !violations.is_empty(),
            violations,
        })
    }
}

/// Latest record by timestamp; on a tie the lifted record wins.
fn latest_record<'a>(
    history: &[(&'a str, &'a ConstraintBody)],
) -> Option<(&'a str, &'a ConstraintBody)> {
    history
        .iter()
        .max_by_key(|(_, c)| (c.timestamp, c.status == ConstraintStatus::Lifted))
        .copied()
}

/// Derive the active set from all constraint records.
pub fn active_constraints(records: &[SearchResult]) -> Vec<Constraint> {
    let mut by_id: HashMap<&str, Vec<(&str, &ConstraintBody)>> = HashMap::new();
    for r in records {
        if let Some(c) = r.record.as_constraint() {
            by_id
                .entry(c.constraint_id.as_str())
                .or_default()
                .push((r.id.as_str(), c));
        }
    }

    let mut active: Vec<Constraint> = by_id
        .values()
        .filter(|history| {
            latest_record(history).is_some_and(|(_, c)| c.status == ConstraintStatus::Active)
        })
        .filter_map(|history| {
            history
                .iter()
                .filter(|(_, c)| c.status == ConstraintStatus::Active)
                .min_by_key(|(_, c)| c.timestamp)
                .map(|(_, c)| Constraint::from(*c))
        })
        .collect();

    active.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_extract_keywords_basic() {
        assert_eq!(
            extract_keywords("Never use unwrap in library code"),
            vec!["never", "use", "unwrap"]
        );
    }

    #[test]
    fn test_extract_keywords_pair_indicator() {
        assert_eq!(
            extract_keywords("We must not modify the database schema."),
            vec!["must", "not", "modify", "the", "database"]
        );
    }

    #[test]
    fn test_extract_keywords_strips_punctuation_and_short_words() {
        assert_eq!(
            extract_keywords("Do not (ever) add a dependency!"),
            vec!["not", "ever", "add"]
        );
        // "no" is itself too short to keep.
        assert_eq!(extract_keywords("no new crates"), vec!["new", "crates"]);
    }

    #[test]
    fn test_extract_keywords_requires_word_boundary() {
        // "knot" and "nothing" are not indicators.
        assert!(extract_keywords("tie a knot here").is_empty());
        assert!(extract_keywords("nothing to see").is_empty());
        // Indicator at end of text is not followed by a space.
        assert!(extract_keywords("answer is no").is_empty());
    }

    #[test]
    fn test_extract_keywords_dedup_first_seen() {
        let kws = extract_keywords("avoid mocks, avoid mocks always");
        assert_eq!(kws, vec!["avoid", "mocks", "always"]);
    }

    #[test]
    fn test_extract_keywords_only_and_without() {
        assert_eq!(
            extract_keywords("only edit files without tests"),
            vec!["only", "edit", "files", "without", "tests"]
        );
    }

    fn record(point: &str, id: &str, status: ConstraintStatus, minute: i64) -> SearchResult {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        SearchResult {
            id: point.into(),
            score: 1.0,
            record: NoteRecord::Constraint(ConstraintBody {
                schema_version: 1,
                content: format!("{id} content"),
                timestamp: base + Duration::minutes(minute),
                constraint_id: id.into(),
                status,
                scope: ConstraintScope::Session,
                detected_from: DetectedFrom::Explicit,
                keywords: vec![],
                violated_count: 0,
                metadata: Map::new(),
            }),
        }
    }

    #[test]
    fn test_active_set_uses_latest_record() {
        let records = vec![
            record("p1", "a", ConstraintStatus::Active, 0),
            record("p2", "b", ConstraintStatus::Active, 1),
            record("p3", "a", ConstraintStatus::Lifted, 5),
        ];
        let active = active_constraints(&records);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "b");
    }

    #[test]
    fn test_lifted_wins_timestamp_tie() {
        let records = vec![
            record("p1", "a", ConstraintStatus::Active, 3),
            record("p2", "a", ConstraintStatus::Lifted, 3),
        ];
        assert!(active_constraints(&records).is_empty());
    }

    #[test]
    fn test_active_set_oldest_first() {
        let records = vec![
            record("p1", "late", ConstraintStatus::Active, 9),
            record("p2", "early", ConstraintStatus::Active, 1),
        ];
        let ids: Vec<_> = active_constraints(&records)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
