use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked user as persisted in the directory, soft-removed ones included.
///
/// Removal never deletes the record; it flips `removed` and stamps
/// `removedAt`, preserving history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedUser {
    /// Opaque numeric string, primary key.
    pub id: String,
    pub username: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub removed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

/// Normalized profile as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub username: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}
