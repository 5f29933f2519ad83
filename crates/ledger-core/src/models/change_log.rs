//! Change log model (append-only audit trail)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{Record, RecordId};
use super::uuid_id;

uuid_id!(
    /// Unique identifier of a change log entry
    ChangeId
);

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// What triggered the mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    UserCreate,
    UserEdit,
    UserDelete,
    SendStatusUpdate,
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

/// Immutable audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub change_id: ChangeId,
    pub record_id: RecordId,
    /// Unix ms
    pub created_at: i64,
    pub action: ChangeAction,
    pub before: Option<Record>,
    pub after: Option<Record>,
    /// Empty for `create` and `delete`
    pub diff: Vec<FieldChange>,
    pub source: ChangeSource,
}
