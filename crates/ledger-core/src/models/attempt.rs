//! Send attempt model (outbox rows)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{append_remote_txn_id, IdempotencyKey, Record, RecordId, TxnType};
use super::uuid_id;
use crate::error::{Error, Result};

uuid_id!(
    /// Unique identifier of a send attempt
    AttemptId
);

/// Lifecycle of a send attempt; only `Pending` may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

/// Exact record snapshot submitted to the host, persisted on the attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub record_id: RecordId,
    pub txn_type: TxnType,
    pub date: String,
    pub paid_value: f64,
    pub doc_value: f64,
    pub interest: f64,
    pub discount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Value>,
    pub vendor: String,
    pub expense_type: String,
    pub notes: String,
    pub currency_code: String,
    pub revision: u32,
}

impl SendPayload {
    /// Build the payload for `record` in `currency_code`
    pub fn from_record(record: &Record, currency_code: &str) -> Self {
        Self {
            record_id: record.id.clone(),
            txn_type: record.txn_type,
            date: record
                .date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            paid_value: record.amount().unwrap_or_default(),
            doc_value: record.doc_value,
            interest: record.interest,
            discount: record.discount,
            category_id: record.category_id.clone(),
            vendor: record.vendor.clone(),
            expense_type: record.expense_type.clone(),
            notes: record.notes.clone(),
            currency_code: currency_code.to_string(),
            revision: record.revision,
        }
    }

    /// Annotate the notes with a previously confirmed remote id
    #[must_use]
    pub fn with_prior_remote_txn_id(mut self, remote_txn_id: &str) -> Self {
        self.notes = append_remote_txn_id(&self.notes, remote_txn_id).0;
        self
    }
}

/// One attempt to submit a record to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAttempt {
    pub attempt_id: AttemptId,
    pub record_id: RecordId,
    /// Unix ms
    pub created_at: i64,
    pub status: AttemptStatus,
    pub idempotency_key: IdempotencyKey,
    pub request_payload: SendPayload,
    pub response_payload: Option<Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub remote_txn_id: Option<String>,
}

impl SendAttempt {
    /// New in-flight attempt, written before the host is called
    pub fn pending(
        idempotency_key: IdempotencyKey,
        request_payload: SendPayload,
        created_at: i64,
    ) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            record_id: request_payload.record_id.clone(),
            created_at,
            status: AttemptStatus::Pending,
            idempotency_key,
            request_payload,
            response_payload: None,
            error_code: None,
            error_message: None,
            duration_ms: None,
            remote_txn_id: None,
        }
    }

    /// Attempt that failed before any call was issued
    pub fn failed_without_call(
        idempotency_key: IdempotencyKey,
        request_payload: SendPayload,
        created_at: i64,
        error_code: &str,
    ) -> Self {
        Self {
            status: AttemptStatus::Failed,
            error_code: Some(error_code.to_string()),
            error_message: Some(error_code.to_string()),
            duration_ms: Some(0),
            ..Self::pending(idempotency_key, request_payload, created_at)
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, AttemptStatus::Pending)
    }

    /// Terminal success; fails if the attempt already left `Pending`
    pub fn succeed(
        &self,
        remote_txn_id: &str,
        response_payload: Value,
        duration_ms: u64,
    ) -> Result<Self> {
        self.ensure_pending()?;
        Ok(Self {
            status: AttemptStatus::Success,
            response_payload: Some(response_payload),
            duration_ms: Some(duration_ms),
            remote_txn_id: Some(remote_txn_id.to_string()),
            ..self.clone()
        })
    }

    /// Terminal failure; fails if the attempt already left `Pending`
    pub fn fail(
        &self,
        error_code: &str,
        error_message: &str,
        response_payload: Option<Value>,
        duration_ms: u64,
    ) -> Result<Self> {
        self.ensure_pending()?;
        Ok(Self {
            status: AttemptStatus::Failed,
            response_payload,
            error_code: Some(error_code.to_string()),
            error_message: Some(error_message.to_string()),
            duration_ms: Some(duration_ms),
            ..self.clone()
        })
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "attempt {} is terminal and cannot change",
                self.attempt_id
            )))
        }
    }
}
