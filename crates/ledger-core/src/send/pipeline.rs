//! Idempotent submission of a record to the host

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::error::{SendError, ValidationIssue, HOST_UNREACHABLE, INVALID_ACKNOWLEDGEMENT};
use super::prompts::{phrase_matches, Gate, SendPrompts};
use super::state::AlreadySentNotice;
use crate::bridge::HostBridge;
use crate::config::BridgeConfig;
use crate::models::{
    AttemptId, AttemptStatus, ChangeLogEntry, ChangeSource, Record, RecordId, RemoteMapping,
    SendAttempt, SendPayload,
};
use crate::store::{LedgerStore, RecordStore};
use crate::util::{compact_text, unix_millis_now};

/// Per-deployment send settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSettings {
    pub currency_code: String,
    pub resend_phrase: String,
    pub send_timeout: Duration,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for SendSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            currency_code: config.currency_code.clone(),
            resend_phrase: config.resend_phrase.clone(),
            send_timeout: config.send_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip the already-sent gates (the caller confirmed elsewhere)
    pub force_resend: bool,
}

/// Result of a send that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Host confirmed the submission
    Sent {
        attempt_id: AttemptId,
        remote_txn_id: String,
        sent_count: u32,
    },
    /// The user stopped at a confirmation gate; nothing was written
    Declined(Gate),
}

/// Sends records through the host bridge, recording every attempt
pub struct SendPipeline<S, P> {
    store: LedgerStore<S>,
    bridge: HostBridge,
    prompts: P,
    settings: SendSettings,
    in_flight: Mutex<HashSet<RecordId>>,
}

impl<S: RecordStore, P: SendPrompts> SendPipeline<S, P> {
    pub fn new(store: LedgerStore<S>, bridge: HostBridge, prompts: P, settings: SendSettings) -> Self {
        Self {
            store,
            bridge,
            prompts,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub const fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    /// Records with a send in flight in this process
    pub fn sending_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = lock(&self.in_flight).iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Submit `record_id` to the host.
    ///
    /// A pending attempt is stored before the host is called and finalized
    /// afterwards; the record is marked sent only on a valid acknowledgement.
    pub async fn send(
        &self,
        record_id: &RecordId,
        options: SendOptions,
    ) -> Result<SendOutcome, SendError> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight, record_id) else {
            return Err(SendError::InProgress);
        };

        let record = self
            .store
            .get_record(record_id)
            .await?
            .ok_or(SendError::ValidationError(ValidationIssue::RecordNotFound))?;
        validate(&record)?;

        let remote = self.store.remote_mapping(record_id).await?;
        let attempts = self.store.attempts_for(record_id).await?;
        if attempts.iter().any(SendAttempt::is_pending) {
            return Err(SendError::InProgress);
        }

        let notice = AlreadySentNotice::from_history(&attempts, remote.as_ref());
        if let Some(notice) = notice.as_ref().filter(|_| !options.force_resend) {
            if let Some(gate) = self.resend_gate(notice).await {
                return Ok(SendOutcome::Declined(gate));
            }
        }

        let idempotency_key = record.idempotency_key();
        let mut payload = SendPayload::from_record(&record, &self.settings.currency_code);

        if !self.bridge.is_connected() {
            let attempt = SendAttempt::failed_without_call(
                idempotency_key,
                payload,
                unix_millis_now(),
                HOST_UNREACHABLE,
            );
            self.store.add_attempt(&attempt).await?;
            tracing::warn!(record_id = %record.id, "host not connected; send recorded as failed");
            return Err(SendError::HostUnreachable);
        }

        let has_success = attempts
            .iter()
            .any(|attempt| attempt.status == AttemptStatus::Success);
        let first_send = notice.is_none() && !has_success && !options.force_resend;
        if first_send && !self.prompts.confirm_first_send(&record).await {
            return Ok(SendOutcome::Declined(Gate::FirstSendDeclined));
        }

        if let Some(notice) = &notice {
            payload = payload.with_prior_remote_txn_id(&notice.remote_txn_id);
        }

        let pending = SendAttempt::pending(idempotency_key, payload, unix_millis_now());
        self.store.add_attempt(&pending).await?;
        tracing::debug!(
            record_id = %record.id,
            attempt_id = %pending.attempt_id,
            idempotency_key = %pending.idempotency_key,
            "submitting record"
        );

        let started = Instant::now();
        let result = self
            .bridge
            .submit(&pending.request_payload, Some(self.settings.send_timeout))
            .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let error = SendError::from(err);
                let failed = pending.fail(
                    &error.code(),
                    &error.message(),
                    error.response().cloned(),
                    duration_ms,
                )?;
                self.store.put_attempt(&failed).await?;
                tracing::warn!(
                    record_id = %record.id,
                    code = %error.code(),
                    message = %compact_text(&error.message()),
                    "send failed"
                );
                return Err(error);
            }
        };

        let Some(remote_txn_id) = acknowledged_remote_txn_id(&response) else {
            let error = SendError::InvalidAcknowledgement { response };
            let failed = pending.fail(
                INVALID_ACKNOWLEDGEMENT,
                &error.message(),
                error.response().cloned(),
                duration_ms,
            )?;
            self.store.put_attempt(&failed).await?;
            tracing::warn!(record_id = %record.id, "host acknowledgement rejected");
            return Err(error);
        };

        let succeeded = pending.succeed(&remote_txn_id, response, duration_ms)?;
        self.store.put_attempt(&succeeded).await?;

        let mapping = RemoteMapping::confirmed(
            remote.as_ref(),
            record.id.clone(),
            succeeded.idempotency_key.clone(),
            remote_txn_id.clone(),
            succeeded.created_at,
        );
        self.store.put_remote_mapping(&mapping).await?;

        // Edits may have landed while the host call was in flight
        match self.store.get_record(record_id).await? {
            Some(current) => {
                let sent = current.marked_sent(&remote_txn_id);
                self.store.put_record(&sent).await?;
                self.store
                    .add_change(&ChangeLogEntry::updated(
                        &current,
                        &sent,
                        ChangeSource::SendStatusUpdate,
                        succeeded.created_at,
                    )?)
                    .await?;
            }
            None => tracing::warn!(
                record_id = %record.id,
                "record deleted while sending; status not updated"
            ),
        }

        tracing::info!(
            record_id = %record.id,
            remote_txn_id = %remote_txn_id,
            sent_count = mapping.sent_count,
            "record sent to host"
        );
        Ok(SendOutcome::Sent {
            attempt_id: succeeded.attempt_id,
            remote_txn_id,
            sent_count: mapping.sent_count,
        })
    }

    async fn resend_gate(&self, notice: &AlreadySentNotice) -> Option<Gate> {
        if !self.prompts.confirm_resend(notice).await {
            return Some(Gate::ResendDeclined);
        }
        let expected = &self.settings.resend_phrase;
        match self.prompts.resend_phrase(expected).await {
            Some(input) if phrase_matches(expected, &input) => None,
            _ => Some(Gate::PhraseMismatch),
        }
    }
}

fn validate(record: &Record) -> Result<(), SendError> {
    if record.date.is_none() {
        return Err(SendError::ValidationError(ValidationIssue::MissingDate));
    }
    if record.amount().is_none() {
        return Err(SendError::ValidationError(ValidationIssue::MissingAmount));
    }
    Ok(())
}

/// Remote id of a `{ status: "success", remoteTxnId }` reply
fn acknowledged_remote_txn_id(response: &Value) -> Option<String> {
    let status = response.get("status").and_then(Value::as_str)?;
    if !status.eq_ignore_ascii_case("success") {
        return None;
    }
    let remote_txn_id = response.get("remoteTxnId").and_then(Value::as_str)?.trim();
    (!remote_txn_id.is_empty()).then(|| remote_txn_id.to_string())
}

fn lock(ids: &Mutex<HashSet<RecordId>>) -> MutexGuard<'_, HashSet<RecordId>> {
    ids.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a record as in flight until dropped
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<RecordId>>,
    id: RecordId,
}

impl<'a> InFlight<'a> {
    fn acquire(ids: &'a Mutex<HashSet<RecordId>>, id: &RecordId) -> Option<Self> {
        lock(ids).insert(id.clone()).then(|| Self {
            ids,
            id: id.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.ids).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeAction, FieldChange, RecordInput, RecordStatus};
    use crate::records::RecordService;
    use crate::send::{derive_send_state, SendState};
    use crate::store::MemoryStore;
    use crate::test_support::{
        bridge, connect, connected_bridge, record_input, ScriptedPrompts, ORIGIN,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex as StdMutex};

    type Pipeline = SendPipeline<MemoryStore, ScriptedPrompts>;

    struct Fixture {
        pipeline: Pipeline,
        records: RecordService<MemoryStore>,
        store: LedgerStore<MemoryStore>,
        id: RecordId,
    }

    impl Fixture {
        async fn new(bridge: HostBridge, prompts: ScriptedPrompts) -> Self {
            let store = LedgerStore::new(MemoryStore::new());
            let records = RecordService::new(store.clone());
            let id = RecordId::from("m1");
            records
                .create_with_id(id.clone(), record_input("Bakery"))
                .await
                .unwrap();
            let pipeline = SendPipeline::new(
                store.clone(),
                bridge,
                prompts,
                SendSettings::default(),
            );
            Self {
                pipeline,
                records,
                store,
                id,
            }
        }

        async fn send(&self) -> Result<SendOutcome, SendError> {
            self.pipeline.send(&self.id, SendOptions::default()).await
        }

        async fn attempts(&self) -> Vec<SendAttempt> {
            let mut attempts = self.store.attempts_for(&self.id).await.unwrap();
            attempts.sort_by_key(|attempt| attempt.created_at);
            attempts
        }

        async fn record(&self) -> Record {
            self.store.get_record(&self.id).await.unwrap().unwrap()
        }

        async fn remote(&self) -> Option<RemoteMapping> {
            self.store.remote_mapping(&self.id).await.unwrap()
        }

        async fn state(&self) -> SendState {
            let attempts = self.attempts().await;
            derive_send_state(&attempts, self.remote().await.as_ref())
        }
    }

    fn success(remote_txn_id: &str) -> Value {
        json!({"type": "RESULT", "result": {"status": "success", "remoteTxnId": remote_txn_id}})
    }

    /// Responder answering with the next scripted reply and recording requests
    fn scripted(
        replies: Vec<Option<Value>>,
    ) -> (
        impl FnMut(&Value) -> Option<Value> + Send + 'static,
        Arc<StdMutex<Vec<Value>>>,
    ) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut replies = replies.into_iter();
        let respond = move |request: &Value| {
            log.lock().unwrap().push(request.clone());
            replies.next().flatten()
        };
        (respond, seen)
    }

    #[tokio::test]
    async fn happy_path_marks_record_sent() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;

        let outcome = fixture.send().await.unwrap();
        let SendOutcome::Sent {
            remote_txn_id,
            sent_count,
            ..
        } = outcome
        else {
            panic!("expected sent, got {outcome:?}");
        };
        assert_eq!(remote_txn_id, "r1");
        assert_eq!(sent_count, 1);

        let attempts = fixture.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Success);
        assert_eq!(attempts[0].remote_txn_id.as_deref(), Some("r1"));
        assert_eq!(attempts[0].idempotency_key.as_str(), "m1:1");

        let remote = fixture.remote().await.unwrap();
        assert_eq!(remote.sent_count, 1);
        assert_eq!(remote.remote_txn_id, "r1");

        let record = fixture.record().await;
        assert_eq!(record.status, RecordStatus::Sent);
        assert_eq!(record.revision, 1);
        assert!(record.notes.ends_with("RemoteTxnId: r1"));
        assert_eq!(fixture.state().await, SendState::Sent);
        assert!(fixture.pipeline.sending_ids().is_empty());
    }

    #[tokio::test]
    async fn send_logs_status_update_change() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;
        fixture.send().await.unwrap();

        let changes = fixture.store.changes_for(&fixture.id).await.unwrap();
        let update = changes
            .iter()
            .find(|entry| entry.source == ChangeSource::SendStatusUpdate)
            .unwrap();
        assert_eq!(update.action, ChangeAction::Update);
        assert_eq!(
            update.diff.last(),
            Some(&FieldChange {
                field: "status".to_string(),
                from: json!("draft"),
                to: json!("sent"),
            })
        );
    }

    #[tokio::test]
    async fn outgoing_request_matches_persisted_payload() {
        let (respond, seen) = scripted(vec![Some(success("r1"))]);
        let (bridge, _responder) = connected_bridge(respond);
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;
        fixture.send().await.unwrap();

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["type"], "CREATE_EXPENSE");
        assert_eq!(
            requests[0]["payload"],
            json!({
                "amount": 95.0,
                "currencyCode": "EUR",
                "note": "Bakery",
                "occurredAt": "2024-05-01"
            })
        );

        let attempts = fixture.attempts().await;
        assert_eq!(attempts[0].request_payload.paid_value, 95.0);
        assert_eq!(attempts[0].request_payload.revision, 1);
    }

    #[tokio::test]
    async fn rapid_double_send_yields_in_progress() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;

        let (first, second) = tokio::join!(fixture.send(), fixture.send());
        let outcomes = [first, second];
        let sent = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Ok(SendOutcome::Sent { .. })))
            .count();
        let in_progress = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(SendError::InProgress)))
            .count();
        assert_eq!((sent, in_progress), (1, 1));
        assert_eq!(fixture.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn stored_pending_attempt_blocks_send() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;
        let record = fixture.record().await;
        let stale = SendAttempt::pending(
            record.idempotency_key(),
            SendPayload::from_record(&record, "EUR"),
            1,
        );
        fixture.store.add_attempt(&stale).await.unwrap();

        assert!(matches!(fixture.send().await, Err(SendError::InProgress)));
        assert_eq!(fixture.attempts().await.len(), 1);
        assert_eq!(fixture.state().await, SendState::Sending);
    }

    #[tokio::test]
    async fn validation_errors_write_nothing() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;
        fixture
            .records
            .edit(
                &fixture.id,
                RecordInput {
                    date: None,
                    ..record_input("Bakery")
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            fixture.send().await,
            Err(SendError::ValidationError(ValidationIssue::MissingDate))
        ));
        assert!(matches!(
            fixture
                .pipeline
                .send(&RecordId::from("ghost"), SendOptions::default())
                .await,
            Err(SendError::ValidationError(ValidationIssue::RecordNotFound))
        ));
        assert!(fixture.attempts().await.is_empty());
    }

    #[tokio::test]
    async fn non_finite_amount_is_rejected() {
        let (bridge, _responder) = connected_bridge(|_| Some(success("r1")));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;
        let mut record = fixture.record().await;
        record.paid_value = Some(f64::NAN);
        fixture.store.put_record(&record).await.unwrap();

        assert!(matches!(
            fixture.send().await,
            Err(SendError::ValidationError(ValidationIssue::MissingAmount))
        ));
    }

    #[tokio::test]
    async fn success_without_remote_id_is_invalid_acknowledgement() {
        let (bridge, _responder) =
            connected_bridge(|_| Some(json!({"type": "RESULT", "result": {"status": "success"}})));
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;

        assert!(matches!(
            fixture.send().await,
            Err(SendError::InvalidAcknowledgement { .. })
        ));
        let attempts = fixture.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(
            attempts[0].error_code.as_deref(),
            Some("InvalidAcknowledgement")
        );
        assert_eq!(
            attempts[0].response_payload,
            Some(json!({"status": "success"}))
        );
        assert_eq!(fixture.record().await.status, RecordStatus::Draft);
        assert_eq!(fixture.remote().await, None);
    }

    #[tokio::test]
    async fn acknowledgement_rules() {
        assert_eq!(
            acknowledged_remote_txn_id(&json!({"status": "SUCCESS", "remoteTxnId": " r9 "})),
            Some("r9".to_string())
        );
        assert_eq!(
            acknowledged_remote_txn_id(&json!({"status": "success", "remoteTxnId": ""})),
            None
        );
        assert_eq!(
            acknowledged_remote_txn_id(&json!({"status": "success", "remoteTxnId": 12})),
            None
        );
        assert_eq!(
            acknowledged_remote_txn_id(&json!({"status": "queued", "remoteTxnId": "r1"})),
            None
        );
        assert_eq!(acknowledged_remote_txn_id(&json!({"remoteTxnId": "r1"})), None);
    }

    #[tokio::test]
    async fn host_rejection_is_persisted_verbatim() {
        let (bridge, _responder) = connected_bridge(|_| {
            Some(json!({
                "type": "ERROR",
                "error": {"code": "CATEGORY_NOT_FOUND", "message": "no category 9"}
            }))
        });
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;

        let Err(SendError::HostRejected { code, message, .. }) = fixture.send().await else {
            panic!("expected host rejection");
        };
        assert_eq!(code, "CATEGORY_NOT_FOUND");
        assert_eq!(message, "no category 9");

        let attempts = fixture.attempts().await;
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[0].error_code.as_deref(), Some("CATEGORY_NOT_FOUND"));
        assert_eq!(attempts[0].error_message.as_deref(), Some("no category 9"));
        assert_eq!(
            attempts[0].response_payload,
            Some(json!({"error": {"code": "CATEGORY_NOT_FOUND", "message": "no category 9"}}))
        );
        assert_eq!(fixture.record().await.status, RecordStatus::Draft);
        assert_eq!(fixture.state().await, SendState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_retry_reuses_idempotency_key() {
        let (respond, _seen) = scripted(vec![None, Some(success("r1"))]);
        let (bridge, _responder) = connected_bridge(respond);
        let fixture = Fixture::new(bridge, ScriptedPrompts::approving()).await;

        assert!(matches!(fixture.send().await, Err(SendError::Timeout { .. })));
        let attempts = fixture.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[0].error_code.as_deref(), Some("Timeout"));
        assert_eq!(attempts[0].duration_ms, Some(15_000));
        assert_eq!(fixture.state().await, SendState::Failed);

        assert!(matches!(
            fixture.send().await,
            Ok(SendOutcome::Sent { sent_count: 1, .. })
        ));
        let attempts = fixture.attempts().await;
        assert_eq!(attempts.len(), 2);
        for status in [AttemptStatus::Failed, AttemptStatus::Success] {
            assert_eq!(
                attempts.iter().filter(|attempt| attempt.status == status).count(),
                1
            );
        }
        assert!(attempts
            .iter()
            .all(|attempt| attempt.idempotency_key.as_str() == "m1:1"));
        assert_eq!(fixture.remote().await.unwrap().sent_count, 1);
    }

    #[tokio::test]
    async fn disconnected_host_records_failed_attempt() {
        let (bridge, _window, _posted) = bridge();
        let prompts = ScriptedPrompts::approving();
        let fixture = Fixture::new(bridge, prompts.clone()).await;

        assert!(matches!(fixture.send().await, Err(SendError::HostUnreachable)));
        let attempts = fixture.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[0].error_code.as_deref(), Some("HostUnreachable"));
        assert_eq!(attempts[0].duration_ms, Some(0));
        assert_eq!(prompts.first_send_asked(), 0);
    }

    #[tokio::test]
    async fn declined_first_send_issues_no_call() {
        let (respond, seen) = scripted(vec![Some(success("r1"))]);
        let (bridge, _responder) = connected_bridge(respond);
        let prompts = ScriptedPrompts::approving().declining_first_send();
        let fixture = Fixture::new(bridge, prompts.clone()).await;

        assert_eq!(
            fixture.send().await.unwrap(),
            SendOutcome::Declined(Gate::FirstSendDeclined)
        );
        assert_eq!(prompts.first_send_asked(), 1);
        assert!(seen.lock().unwrap().is_empty());
        assert!(fixture.attempts().await.is_empty());
    }

    async fn sent_fixture(prompts: ScriptedPrompts) -> (Fixture, Arc<StdMutex<Vec<Value>>>) {
        let (respond, seen) = scripted(vec![Some(success("r1")), Some(success("r2"))]);
        let (bridge, _responder) = connected_bridge(respond);
        let fixture = Fixture::new(bridge, prompts).await;
        fixture.send().await.unwrap();
        (fixture, seen)
    }

    #[tokio::test]
    async fn resend_requires_both_gates() {
        for (answer, expected) in [
            (Some("CONFIRM SEND"), None),
            (Some(" confirm send "), None),
            (Some("confirm-send"), Some(Gate::PhraseMismatch)),
            (Some(""), Some(Gate::PhraseMismatch)),
            (None, Some(Gate::PhraseMismatch)),
        ] {
            let prompts = ScriptedPrompts::approving().with_phrase(answer);
            let (fixture, seen) = sent_fixture(prompts.clone()).await;

            let outcome = fixture.send().await.unwrap();
            let requests = seen.lock().unwrap().len();
            match expected {
                None => {
                    assert!(
                        matches!(outcome, SendOutcome::Sent { sent_count: 2, .. }),
                        "{answer:?} should resend"
                    );
                    assert_eq!(requests, 2);
                }
                Some(gate) => {
                    assert_eq!(outcome, SendOutcome::Declined(gate), "{answer:?}");
                    assert_eq!(requests, 1, "{answer:?} must not reach the host");
                    assert_eq!(fixture.attempts().await.len(), 1);
                }
            }
            assert_eq!(prompts.first_send_asked(), 1);
        }
    }

    #[tokio::test]
    async fn closing_already_sent_notice_skips_phrase() {
        let prompts = ScriptedPrompts::approving().declining_resend();
        let (fixture, seen) = sent_fixture(prompts.clone()).await;

        assert_eq!(
            fixture.send().await.unwrap(),
            SendOutcome::Declined(Gate::ResendDeclined)
        );
        assert_eq!(prompts.phrase_asked(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);

        let notice = prompts.last_notice().unwrap();
        assert_eq!(notice.remote_txn_id, "r1");
        assert!(notice.last_sent_at.is_some());
    }

    #[tokio::test]
    async fn resend_carries_prior_remote_id_and_counts() {
        let (fixture, seen) = sent_fixture(ScriptedPrompts::approving()).await;
        let first_sent_at = fixture.remote().await.unwrap().first_sent_at;

        let outcome = fixture.send().await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Sent { ref remote_txn_id, sent_count: 2, .. } if remote_txn_id == "r2"
        ));

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests[1]["payload"]["note"], "RemoteTxnId: r1");

        let remote = fixture.remote().await.unwrap();
        assert_eq!(remote.remote_txn_id, "r2");
        assert_eq!(remote.first_sent_at, first_sent_at);

        let notes = fixture.record().await.notes;
        assert_eq!(notes, "RemoteTxnId: r1\n\nRemoteTxnId: r2");
    }

    #[tokio::test]
    async fn force_resend_skips_gates() {
        let prompts = ScriptedPrompts::approving().declining_resend();
        let (fixture, _seen) = sent_fixture(prompts.clone()).await;

        let outcome = fixture
            .pipeline
            .send(&fixture.id, SendOptions { force_resend: true })
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Sent { sent_count: 2, .. }));
        assert_eq!(prompts.resend_asked(), 0);
    }

    #[tokio::test]
    async fn edit_after_send_changes_idempotency_key() {
        let (fixture, _seen) = sent_fixture(ScriptedPrompts::approving()).await;
        fixture
            .records
            .edit(&fixture.id, record_input("Market"))
            .await
            .unwrap();

        fixture.send().await.unwrap();
        let mut keys: Vec<String> = fixture
            .attempts()
            .await
            .iter()
            .map(|attempt| attempt.idempotency_key.to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["m1:1".to_string(), "m1:2".to_string()]);
    }

    #[tokio::test]
    async fn teardown_fails_in_flight_send() {
        let (bridge, _responder) = connected_bridge(|_| None);
        let fixture = Fixture::new(bridge.clone(), ScriptedPrompts::approving()).await;

        let teardown = async {
            while bridge.rpc().pending_count() == 0 {
                tokio::task::yield_now().await;
            }
            assert_eq!(fixture.pipeline.sending_ids(), vec![fixture.id.clone()]);
            bridge.destroy();
        };
        let (result, ()) = tokio::join!(fixture.send(), teardown);

        assert!(matches!(result, Err(SendError::HostUnreachable)));
        let attempts = fixture.attempts().await;
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[0].error_code.as_deref(), Some("HostUnreachable"));
        assert!(fixture.pipeline.sending_ids().is_empty());
    }

    #[tokio::test]
    async fn edit_during_send_keeps_newer_revision() {
        let (bridge, window, mut posted) = bridge();
        connect(&bridge, &window);
        let fixture = Fixture::new(bridge.clone(), ScriptedPrompts::approving()).await;

        let host = async {
            let request = posted.recv().await.unwrap().message;
            let edited = fixture
                .records
                .edit(&fixture.id, record_input("Market"))
                .await
                .unwrap();
            assert_eq!(edited.revision, 2);
            let reply = json!({
                "type": "RESULT",
                "requestId": request["requestId"],
                "result": {"status": "success", "remoteTxnId": "r1"}
            });
            assert!(bridge.rpc().dispatch(&window.event(ORIGIN, reply)));
        };
        let (result, ()) = tokio::join!(fixture.send(), host);
        assert!(matches!(result, Ok(SendOutcome::Sent { .. })));

        let record = fixture.record().await;
        assert_eq!(record.revision, 2);
        assert_eq!(record.vendor, "Market");
        assert_eq!(record.status, RecordStatus::Sent);
        assert!(record.notes.ends_with("RemoteTxnId: r1"));

        let attempts = fixture.attempts().await;
        assert_eq!(attempts[0].idempotency_key.as_str(), "m1:1");

        let changes = fixture.store.changes_for(&fixture.id).await.unwrap();
        let update = changes
            .iter()
            .find(|entry| entry.source == ChangeSource::SendStatusUpdate)
            .unwrap();
        assert_eq!(update.before.as_ref().map(|before| before.revision), Some(2));
        assert_eq!(update.after.as_ref().map(|after| after.revision), Some(2));

        let next = fixture
            .records
            .edit(&fixture.id, record_input("Corner"))
            .await
            .unwrap();
        assert_eq!(next.revision, 3);
        assert_eq!(next.idempotency_key().as_str(), "m1:3");
    }

    #[tokio::test]
    async fn delete_during_send_does_not_recreate_record() {
        let (bridge, window, mut posted) = bridge();
        connect(&bridge, &window);
        let fixture = Fixture::new(bridge.clone(), ScriptedPrompts::approving()).await;

        let host = async {
            let request = posted.recv().await.unwrap().message;
            fixture.records.delete(&fixture.id).await.unwrap();
            let reply = json!({
                "type": "RESULT",
                "requestId": request["requestId"],
                "result": {"status": "success", "remoteTxnId": "r1"}
            });
            assert!(bridge.rpc().dispatch(&window.event(ORIGIN, reply)));
        };
        let (result, ()) = tokio::join!(fixture.send(), host);
        assert!(matches!(result, Ok(SendOutcome::Sent { .. })));

        assert_eq!(fixture.store.get_record(&fixture.id).await.unwrap(), None);
        assert_eq!(fixture.remote().await.map(|remote| remote.sent_count), Some(1));
    }
}
