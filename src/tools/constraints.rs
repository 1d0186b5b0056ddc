use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TrackConstraintParams {
    #[schemars(description = "The rule, e.g. 'do not modify the public API'")]
    pub content: String,

    #[schemars(description = "Where it applies: 'session' (default), 'task', or 'file'")]
    pub scope: Option<String>,

    #[schemars(description = "How it was found: 'explicit' (default) or 'auto'")]
    pub detected_from: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LiftConstraintParams {
    #[schemars(description = "Constraint id returned by track_constraint")]
    pub constraint_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckViolationParams {
    #[schemars(description = "Description of the action about to be taken")]
    pub proposed_action: String,
}
