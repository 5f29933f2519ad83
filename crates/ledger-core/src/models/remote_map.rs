//! Record-to-host mapping model

use serde::{Deserialize, Serialize};

use super::record::{IdempotencyKey, RecordId};

/// Most recent confirmed submission of a record, one row per record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMapping {
    pub record_id: RecordId,
    pub idempotency_key: IdempotencyKey,
    pub remote_txn_id: String,
    /// Unix ms of the first confirmed send
    pub first_sent_at: i64,
    /// Unix ms of the latest confirmed send
    pub last_sent_at: i64,
    pub sent_count: u32,
}

impl RemoteMapping {
    /// Mapping after a confirmed send, carrying over `previous` history
    pub fn confirmed(
        previous: Option<&Self>,
        record_id: RecordId,
        idempotency_key: IdempotencyKey,
        remote_txn_id: impl Into<String>,
        sent_at: i64,
    ) -> Self {
        Self {
            record_id,
            idempotency_key,
            remote_txn_id: remote_txn_id.into(),
            first_sent_at: previous.map_or(sent_at, |prev| prev.first_sent_at),
            last_sent_at: sent_at,
            sent_count: previous.map_or(1, |prev| prev.sent_count.saturating_add(1)),
        }
    }

    /// Remote id if non-blank
    pub fn known_remote_txn_id(&self) -> Option<&str> {
        let trimmed = self.remote_txn_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
