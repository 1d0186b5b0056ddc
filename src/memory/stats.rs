use std::collections::BTreeMap;

use serde::Serialize;

use super::store::{SessionMemory, TYPE_FIELD};
use super::types::NoteType;
use crate::error::Result;
use crate::index::PayloadFilter;

/// Response from `get_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub collection: String,
    pub total_points: u64,
    /// Count per note type; every type is present, zero-filled.
    pub by_type: BTreeMap<String, u64>,
}

/// Count the session's points in total and per note type.
pub async fn session_stats(memory: &SessionMemory) -> Result<SessionStats> {
    let index = memory.index();
    let collection = memory.collection();

    let total_points = index.count(collection, None).await?;

    let mut by_type = BTreeMap::new();
    for note_type in NoteType::ALL {
        let filter = PayloadFilter::new(TYPE_FIELD, note_type.as_str());
        let n = index.count(collection, Some(&filter)).await?;
        by_type.insert(note_type.as_str().to_string(), n);
    }

    Ok(SessionStats {
        session_id: memory.session_id().to_string(),
        collection: collection.to_string(),
        total_points,
        by_type,
    })
}
