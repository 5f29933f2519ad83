//! Send state derived from stored history

use serde::Serialize;

use crate::models::{AttemptStatus, RemoteMapping, SendAttempt};

/// Logical send state of a record, recomputed from its attempts and mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    /// Never confirmed by the host
    Unsent,
    /// An attempt is in flight
    Sending,
    /// Confirmed with a remote transaction id
    Sent,
    /// Latest attempt failed and nothing was confirmed yet
    Failed,
}

/// What the user is shown before a resend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlreadySentNotice {
    pub remote_txn_id: String,
    /// Unix ms of the last confirmed send, when known
    pub last_sent_at: Option<i64>,
}

impl AlreadySentNotice {
    /// Known remote id from the mapping, else from the latest successful attempt
    pub fn from_history(attempts: &[SendAttempt], remote: Option<&RemoteMapping>) -> Option<Self> {
        let last_success = latest_success(attempts);

        let remote_txn_id = remote
            .and_then(RemoteMapping::known_remote_txn_id)
            .or_else(|| {
                last_success
                    .and_then(|attempt| attempt.remote_txn_id.as_deref())
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
            })?
            .to_string();
        let last_sent_at = remote
            .map(|mapping| mapping.last_sent_at)
            .or_else(|| last_success.map(|attempt| attempt.created_at))
            .filter(|at| *at > 0);

        Some(Self {
            remote_txn_id,
            last_sent_at,
        })
    }
}

/// Derive the send state; a pending attempt always wins
pub fn derive_send_state(attempts: &[SendAttempt], remote: Option<&RemoteMapping>) -> SendState {
    if attempts.iter().any(SendAttempt::is_pending) {
        return SendState::Sending;
    }
    if AlreadySentNotice::from_history(attempts, remote).is_some() {
        return SendState::Sent;
    }

    match attempts.iter().max_by_key(|attempt| attempt.created_at) {
        Some(latest) if latest.status == AttemptStatus::Failed => SendState::Failed,
        _ => SendState::Unsent,
    }
}

fn latest_success(attempts: &[SendAttempt]) -> Option<&SendAttempt> {
    attempts
        .iter()
        .filter(|attempt| attempt.status == AttemptStatus::Success)
        .max_by_key(|attempt| attempt.created_at)
}
