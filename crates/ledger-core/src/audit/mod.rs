//! Change log writer
//!
//! Diffs cover a fixed list of user-facing fields. `create` and `delete`
//! entries carry snapshots only.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{ChangeAction, ChangeId, ChangeLogEntry, ChangeSource, FieldChange, Record};

/// Fields compared when diffing two snapshots of a record
pub const TRACKED_FIELDS: [&str; 11] = [
    "txnType",
    "date",
    "docValue",
    "interest",
    "discount",
    "paidValue",
    "expenseType",
    "vendor",
    "notes",
    "categoryId",
    "status",
];

/// One entry per tracked field whose value differs, in `TRACKED_FIELDS` order
pub fn diff_records(before: &Record, after: &Record) -> Result<Vec<FieldChange>> {
    let before = snapshot_fields(before)?;
    let after = snapshot_fields(after)?;

    Ok(TRACKED_FIELDS
        .iter()
        .filter_map(|field| {
            let from = before.get(*field).cloned().unwrap_or(Value::Null);
            let to = after.get(*field).cloned().unwrap_or(Value::Null);
            (from != to).then(|| FieldChange {
                field: (*field).to_string(),
                from,
                to,
            })
        })
        .collect())
}

fn snapshot_fields(record: &Record) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

impl ChangeLogEntry {
    /// Entry for a newly created record
    pub fn created(after: &Record, source: ChangeSource, created_at: i64) -> Self {
        Self {
            change_id: ChangeId::new(),
            record_id: after.id.clone(),
            created_at,
            action: ChangeAction::Create,
            before: None,
            after: Some(after.clone()),
            diff: Vec::new(),
            source,
        }
    }

    /// Entry for an in-place change, with its field diff
    pub fn updated(
        before: &Record,
        after: &Record,
        source: ChangeSource,
        created_at: i64,
    ) -> Result<Self> {
        Ok(Self {
            change_id: ChangeId::new(),
            record_id: after.id.clone(),
            created_at,
            action: ChangeAction::Update,
            before: Some(before.clone()),
            after: Some(after.clone()),
            diff: diff_records(before, after)?,
            source,
        })
    }

    /// Entry written before a record is removed
    pub fn deleted(before: &Record, source: ChangeSource, created_at: i64) -> Self {
        Self {
            change_id: ChangeId::new(),
            record_id: before.id.clone(),
            created_at,
            action: ChangeAction::Delete,
            before: Some(before.clone()),
            after: None,
            diff: Vec::new(),
            source,
        }
    }
}
