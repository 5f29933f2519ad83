//! Financial record model

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

const REMOTE_TXN_ID_PREFIX: &str = "RemoteTxnId: ";

/// Opaque, stable identifier for a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the string form of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Transaction kind; decides which host submission type is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnType {
    /// Money going out
    #[default]
    Expense,
    /// Money coming in
    Income,
}

/// Stored status flag of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Not yet confirmed by the host
    #[default]
    Draft,
    /// Confirmed by the host with a remote transaction id
    Sent,
}

/// Deterministic `"{id}:{revision}"` key for one exact revision of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for the record's current revision
    pub fn for_record(record: &Record) -> Self {
        Self(format!("{}:{}", record.id, record.revision))
    }

    /// Borrow the key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-editable fields of a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    /// Expense or income
    #[serde(default)]
    pub txn_type: TxnType,
    /// Date the movement occurred
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Document value
    #[serde(default)]
    pub doc_value: f64,
    /// Interest and fines
    #[serde(default)]
    pub interest: f64,
    /// Discounts
    #[serde(default)]
    pub discount: f64,
    /// Amount actually paid; derived from the other values when absent
    #[serde(default)]
    pub paid_value: Option<f64>,
    /// Free-form category label
    #[serde(default)]
    pub expense_type: String,
    /// Vendor or payer
    #[serde(default)]
    pub vendor: String,
    /// Free-form notes
    #[serde(default)]
    pub notes: String,
    /// Host category identifier as entered (coerced when submitting)
    #[serde(default)]
    pub category_id: Option<serde_json::Value>,
}

impl RecordInput {
    /// Paid value, falling back to `doc_value + interest - discount`
    pub fn resolved_paid_value(&self) -> f64 {
        self.paid_value
            .unwrap_or(self.doc_value + self.interest - self.discount)
    }
}

/// A financial record (expense or income)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier
    pub id: RecordId,
    /// Starts at 1, incremented on every user edit
    pub revision: u32,
    #[serde(default)]
    pub txn_type: TxnType,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub doc_value: f64,
    #[serde(default)]
    pub interest: f64,
    #[serde(default)]
    pub discount: f64,
    /// Submitted amount; `None` when missing or not a finite number
    #[serde(default)]
    pub paid_value: Option<f64>,
    #[serde(default)]
    pub expense_type: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<serde_json::Value>,
    #[serde(default)]
    pub status: RecordStatus,
}

impl Record {
    /// Create a new draft record at revision 1
    #[must_use]
    pub fn new(input: RecordInput) -> Self {
        Self::with_id(RecordId::new(), input)
    }

    /// Create a new draft record with a caller-chosen id
    #[must_use]
    pub fn with_id(id: RecordId, input: RecordInput) -> Self {
        let paid_value = Some(input.resolved_paid_value());
        Self {
            id,
            revision: 1,
            txn_type: input.txn_type,
            date: input.date,
            doc_value: input.doc_value,
            interest: input.interest,
            discount: input.discount,
            paid_value,
            expense_type: input.expense_type,
            vendor: input.vendor,
            notes: input.notes,
            category_id: input.category_id,
            status: RecordStatus::Draft,
        }
    }

    /// Next revision with the edited fields; status is preserved
    #[must_use]
    pub fn edited(&self, input: RecordInput) -> Self {
        Self {
            revision: self.revision.saturating_add(1),
            status: self.status,
            ..Self::with_id(self.id.clone(), input)
        }
    }

    /// Same revision, marked sent, with the remote id recorded in the notes
    #[must_use]
    pub fn marked_sent(&self, remote_txn_id: &str) -> Self {
        let (notes, _) = append_remote_txn_id(&self.notes, remote_txn_id);
        Self {
            status: RecordStatus::Sent,
            notes,
            ..self.clone()
        }
    }

    /// Idempotency key of the current revision
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::for_record(self)
    }

    /// Paid value if it is a finite number
    pub fn amount(&self) -> Option<f64> {
        self.paid_value.filter(|value| value.is_finite())
    }
}

/// Append a `RemoteTxnId: <id>` line to `note` unless already present.
///
/// Returns the resulting note and whether it changed.
pub fn append_remote_txn_id(note: &str, remote_txn_id: &str) -> (String, bool) {
    let remote_txn_id = remote_txn_id.trim();
    if remote_txn_id.is_empty() {
        return (note.to_string(), false);
    }

    let line = format!("{REMOTE_TXN_ID_PREFIX}{remote_txn_id}");
    if note.contains(&line) {
        return (note.to_string(), false);
    }
    if note.trim().is_empty() {
        return (line, true);
    }
    (format!("{note}\n\n{line}"), true)
}
