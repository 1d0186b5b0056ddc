use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SaveNoteParams {
    #[schemars(
        description = "Note type: 'decision', 'hypothesis', 'blocker', 'learning', 'pattern', or 'constraint' (tracked as an explicit session constraint)"
    )]
    pub r#type: String,

    #[schemars(description = "The note text")]
    pub content: String,

    #[schemars(
        description = "Optional JSON object of extra fields. 'references' (string array) and 'success_rate' (0.0-1.0) feed recovery suggestions."
    )]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchNotesParams {
    #[schemars(description = "Natural language query")]
    pub query: String,

    #[schemars(description = "Maximum results. Defaults to 5.")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckDuplicateParams {
    #[schemars(description = "Description of the work about to be done")]
    pub description: String,

    #[schemars(description = "Minimum similarity 0.0-1.0 to count as duplicate. Defaults to 0.85.")]
    pub threshold: Option<f64>,
}
