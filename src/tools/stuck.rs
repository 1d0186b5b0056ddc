use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckStuckParams {
    #[schemars(
        description = "Project directory to scan for file activity. Defaults to the session's project root."
    )]
    pub project_root: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecoverySuggestionsParams {
    #[schemars(
        description = "A stuck pattern as returned by check_stuck: {type, detected, confidence, details: {description, evidence}}"
    )]
    pub pattern: serde_json::Value,

    #[schemars(description = "Project directory, recorded with the analysis")]
    pub project_root: Option<String>,

    #[schemars(description = "Maximum suggestions. Defaults to 5.")]
    pub max_suggestions: Option<usize>,
}
