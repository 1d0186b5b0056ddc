use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionStartParams {
    #[schemars(description = "Identifier for the new session (e.g. a task or ticket id)")]
    pub session_id: String,

    #[schemars(
        description = "Absolute path of the project the session works on. Used for the collection name and file-progress checks. Defaults to the server's working directory."
    )]
    pub project_root: Option<String>,
}
