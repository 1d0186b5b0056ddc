//! Core session-memory type definitions.
//!
//! Defines [`NoteType`] (the six note categories), [`SessionNote`] (write input),
//! [`NoteRecord`] (the versioned payload stored with every point), and the
//! constraint vocabulary ([`Constraint`], [`ConstraintScope`], [`DetectedFrom`],
//! [`ConstraintStatus`]).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version written into every stored record.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Semantic category of a session note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// A choice that was made and why.
    Decision,
    /// Something believed but not yet verified.
    Hypothesis,
    /// Something currently preventing progress.
    Blocker,
    /// Something discovered that is worth keeping.
    Learning,
    /// A recurring approach that worked.
    Pattern,
    /// A standing rule for the session.
    Constraint,
}

impl NoteType {
    /// Every note type, in stable order.
    pub const ALL: [NoteType; 6] = [
        Self::Decision,
        Self::Hypothesis,
        Self::Blocker,
        Self::Learning,
        Self::Pattern,
        Self::Constraint,
    ];

    /// Types returned by `extract_valuable_memories`.
    pub const VALUABLE: [NoteType; 5] = [
        Self::Decision,
        Self::Hypothesis,
        Self::Blocker,
        Self::Learning,
        Self::Pattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Hypothesis => "hypothesis",
            Self::Blocker => "blocker",
            Self::Learning => "learning",
            Self::Pattern => "pattern",
            Self::Constraint => "constraint",
        }
    }
}

impl std::fmt::Display for NoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "hypothesis" => Ok(Self::Hypothesis),
            "blocker" => Ok(Self::Blocker),
            "learning" => Ok(Self::Learning),
            "pattern" => Ok(Self::Pattern),
            "constraint" => Ok(Self::Constraint),
            _ => Err(format!("unknown note type: {s}")),
        }
    }
}

/// Where a constraint applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintScope {
    #[default]
    Session,
    Task,
    File,
}

impl ConstraintScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Task => "task",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for ConstraintScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConstraintScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "task" => Ok(Self::Task),
            "file" => Ok(Self::File),
            _ => Err(format!("unknown constraint scope: {s}")),
        }
    }
}

/// How a constraint entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFrom {
    Auto,
    #[default]
    Explicit,
}

impl std::str::FromStr for DetectedFrom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "explicit" => Ok(Self::Explicit),
            _ => Err(format!("unknown constraint source: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    Active,
    Lifted,
}

/// A note to save. The store adds the timestamp and embedding.
#[derive(Debug, Clone)]
pub struct SessionNote {
    pub note_type: NoteType,
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl SessionNote {
    pub fn new(note_type: NoteType, content: impl Into<String>) -> Self {
        Self {
            note_type,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Body shared by the five plain note types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteBody {
    pub schema_version: u32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Body of a constraint record. Lifting appends a second record with the
/// same `constraint_id` and `status: lifted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintBody {
    pub schema_version: u32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub constraint_id: String,
    pub status: ConstraintStatus,
    pub scope: ConstraintScope,
    pub detected_from: DetectedFrom,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub violated_count: u32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Stored point payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteRecord {
    Decision(NoteBody),
    Hypothesis(NoteBody),
    Blocker(NoteBody),
    Learning(NoteBody),
    Pattern(NoteBody),
    Constraint(ConstraintBody),
}

impl NoteRecord {
    /// Build a plain record stamped with `timestamp`. Constraint notes must go
    /// through [`NoteRecord::Constraint`] directly.
    pub fn from_note(note: &SessionNote, timestamp: DateTime<Utc>) -> Option<Self> {
        let body = NoteBody {
            schema_version: RECORD_SCHEMA_VERSION,
            content: note.content.clone(),
            timestamp,
            metadata: note.metadata.clone(),
        };
        Some(match note.note_type {
            NoteType::Decision => Self::Decision(body),
            NoteType::Hypothesis => Self::Hypothesis(body),
            NoteType::Blocker => Self::Blocker(body),
            NoteType::Learning => Self::Learning(body),
            NoteType::Pattern => Self::Pattern(body),
            NoteType::Constraint => return None,
        })
    }

    pub fn note_type(&self) -> NoteType {
        match self {
            Self::Decision(_) => NoteType::Decision,
            Self::Hypothesis(_) => NoteType::Hypothesis,
            Self::Blocker(_) => NoteType::Blocker,
            Self::Learning(_) => NoteType::Learning,
            Self::Pattern(_) => NoteType::Pattern,
            Self::Constraint(_) => NoteType::Constraint,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Decision(b)
            | Self::Hypothesis(b)
            | Self::Blocker(b)
            | Self::Learning(b)
            | Self::Pattern(b) => &b.content,
            Self::Constraint(c) => &c.content,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Decision(b)
            | Self::Hypothesis(b)
            | Self::Blocker(b)
            | Self::Learning(b)
            | Self::Pattern(b) => b.timestamp,
            Self::Constraint(c) => c.timestamp,
        }
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        match self {
            Self::Constraint(c) => &c.metadata,
            Self::Decision(b)
            | Self::Hypothesis(b)
            | Self::Blocker(b)
            | Self::Learning(b)
            | Self::Pattern(b) => &b.metadata,
        }
    }

    pub fn as_constraint(&self) -> Option<&ConstraintBody> {
        match self {
            Self::Constraint(c) => Some(c),
            _ => None,
        }
    }

    /// Serialize into an index payload object.
    pub fn to_payload(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Validate a payload read back from the index.
    pub fn from_payload(payload: Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(payload))
    }
}

/// A note returned from search or typed retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Point id in the session collection.
    pub id: String,
    /// Cosine similarity in `[0, 1]`, or `1.0` for exact retrieval.
    pub score: f64,
    #[serde(flatten)]
    pub record: NoteRecord,
}

impl SearchResult {
    pub fn note_type(&self) -> NoteType {
        self.record.note_type()
    }

    pub fn content(&self) -> &str {
        self.record.content()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.record.timestamp()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        self.record.metadata()
    }
}

/// A session constraint, projected from its constraint records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub id: String,
    pub content: String,
    pub detected_from: DetectedFrom,
    pub timestamp: DateTime<Utc>,
    pub scope: ConstraintScope,
    pub status: ConstraintStatus,
    pub keywords: Vec<String>,
    pub violated_count: u32,
}

impl From<&ConstraintBody> for Constraint {
    fn from(body: &ConstraintBody) -> Self {
        Self {
            id: body.constraint_id.clone(),
            content: body.content.clone(),
            detected_from: body.detected_from,
            timestamp: body.timestamp,
            scope: body.scope,
            status: body.status,
            keywords: body.keywords.clone(),
            violated_count: body.violated_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn note_type_round_trips_through_str() {
        for t in NoteType::ALL {
            assert_eq!(t.as_str().parse::<NoteType>().unwrap(), t);
        }
        assert!("todo".parse::<NoteType>().is_err());
    }

    #[test]
    fn record_payload_is_tagged_by_type() {
        let note = SessionNote::new(NoteType::Blocker, "tests hang on CI");
        let record = NoteRecord::from_note(&note, Utc::now()).unwrap();
        let payload = record.to_payload().unwrap();
        assert_eq!(payload["type"], "blocker");
        assert_eq!(payload["content"], "tests hang on CI");
        assert_eq!(payload["schema_version"], 1);

        let back = NoteRecord::from_payload(payload).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn constraint_note_is_not_a_plain_record() {
        let note = SessionNote::new(NoteType::Constraint, "never touch prod");
        assert!(NoteRecord::from_note(&note, Utc::now()).is_none());
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let payload = json!({"type": "blocker", "content": 42});
        assert!(NoteRecord::from_payload(payload.as_object().unwrap().clone()).is_err());

        let unknown = json!({"type": "todo", "content": "x"});
        assert!(NoteRecord::from_payload(unknown.as_object().unwrap().clone()).is_err());
    }

    #[test]
    fn search_result_flattens_record() {
        let record = NoteRecord::from_note(
            &SessionNote::new(NoteType::Learning, "cache keys need the tenant"),
            Utc::now(),
        )
        .unwrap();
        let result = SearchResult {
            id: "p1".into(),
            score: 0.9,
            record,
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["id"], "p1");
        assert_eq!(v["type"], "learning");
        assert_eq!(v["content"], "cache keys need the tenant");
    }
}
