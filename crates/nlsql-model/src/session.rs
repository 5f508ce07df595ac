use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;
use crate::query::QueryMetadata;

/// A conversation thread belonging to a user. Session name and `metadata`
/// are both mutated by flows as requests complete within it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_owner: String,
    pub name: String,
    pub tags: Vec<String>,
    pub parent: Option<SessionId>,
    pub refs: Option<Value>,
    pub metadata: Option<QueryMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_owner: impl Into<String>,
        name: impl Into<String>,
        tags: Vec<String>,
        parent: Option<SessionId>,
        refs: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_owner: user_owner.into(),
            name: name.into(),
            tags,
            parent,
            refs,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A per-request selection payload: the row/column data a user highlighted
/// in a previous result grid before issuing this follow-up request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SelectionRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cols: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Value>,
}
