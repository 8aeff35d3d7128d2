use serde::{Deserialize, Serialize};

/// Author snapshot taken at send time; never updated retroactively.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// A persisted chat message. Immutable once stored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned, monotonically increasing within the store.
    pub id: i64,
    pub semester_id: i64,
    pub sender: UserRef,
    pub text: String,
    /// Client correlation token, kept so history fetches retain it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Unix seconds, assigned at persistence time. Canonical sort key;
    /// `id` breaks same-second ties.
    pub created_at: i64,
}
