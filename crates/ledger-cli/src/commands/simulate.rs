use std::sync::Arc;

use ledger_core::bridge::{spawn_responder, HostBridge, HostWindow, LoopbackWindow};
use ledger_core::config::BridgeConfig;
use ledger_core::models::{Record, RecordInput, RemoteMapping, SendAttempt, TxnType};
use ledger_core::records::{HistoryItem, RecordService};
use ledger_core::send::{
    derive_send_state, AlreadySentNotice, Gate, Presentation, SendError, SendOptions,
    SendOutcome, SendPipeline, SendPrompts, SendSettings, SendState,
};
use ledger_core::store::{LedgerStore, MemoryStore};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::{HostReply, SimulateArgs};
use crate::error::CliError;

/// Prompt answers taken from the command line
#[derive(Debug, Clone)]
pub struct CliPrompts {
    pub yes: bool,
    pub phrase: Option<String>,
}

impl SendPrompts for CliPrompts {
    async fn confirm_resend(&self, notice: &AlreadySentNotice) -> bool {
        tracing::info!(
            remote_txn_id = %notice.remote_txn_id,
            last_sent_at = ?notice.last_sent_at,
            "record already sent"
        );
        self.yes
    }

    async fn resend_phrase(&self, expected: &str) -> Option<String> {
        tracing::debug!(expected, "resend phrase requested");
        self.phrase.clone()
    }

    async fn confirm_first_send(&self, _record: &Record) -> bool {
        self.yes
    }
}

/// Result of one send pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SendReport {
    Sent {
        remote_txn_id: String,
        sent_count: u32,
    },
    Declined {
        gate: Gate,
    },
    Failed {
        code: String,
        message: String,
        presentation: &'static str,
    },
}

impl SendReport {
    fn from_result(result: Result<SendOutcome, SendError>) -> Result<Self, CliError> {
        match result {
            Ok(SendOutcome::Sent {
                remote_txn_id,
                sent_count,
                ..
            }) => Ok(Self::Sent {
                remote_txn_id,
                sent_count,
            }),
            Ok(SendOutcome::Declined(gate)) => Ok(Self::Declined { gate }),
            Err(SendError::Store(error)) => Err(error.into()),
            Err(error) => Ok(Self::Failed {
                code: error.code(),
                message: error.message(),
                presentation: match error.presentation() {
                    Presentation::Inline(_) => "inline",
                    Presentation::SoftWarning(_) => "soft_warning",
                    Presentation::Dialog { .. } => "dialog",
                },
            }),
        }
    }

    fn line(&self) -> String {
        match self {
            Self::Sent {
                remote_txn_id,
                sent_count,
            } => format!("sent: remote id {remote_txn_id} (sent {sent_count}x)"),
            Self::Declined { gate } => format!("declined at {gate:?}"),
            Self::Failed { code, message, .. } => format!("failed: {code}: {message}"),
        }
    }
}

/// Everything a simulation wrote
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub record: Record,
    pub sends: Vec<SendReport>,
    pub state: SendState,
    pub attempts: Vec<SendAttempt>,
    pub remote: Option<RemoteMapping>,
    pub history: Vec<HistoryItem>,
}

impl SimulationReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "record {} rev {} ({:?})",
            self.record.id, self.record.revision, self.record.status
        )];
        lines.extend(
            self.sends
                .iter()
                .enumerate()
                .map(|(index, send)| format!("send #{}: {}", index + 1, send.line())),
        );
        lines.push(format!("state: {:?}", self.state));
        lines.extend(self.attempts.iter().map(|attempt| {
            format!(
                "attempt {} {:?} key={} code={}",
                attempt.attempt_id,
                attempt.status,
                attempt.idempotency_key,
                attempt.error_code.as_deref().unwrap_or("-")
            )
        }));
        if let Some(remote) = &self.remote {
            lines.push(format!(
                "remote map: {} sent {}x",
                remote.remote_txn_id, remote.sent_count
            ));
        }
        lines.push(format!("history entries: {}", self.history.len()));
        lines
    }
}

pub async fn run_simulate(args: &SimulateArgs, config: &BridgeConfig) -> Result<(), CliError> {
    let report = simulate(args, config).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.lines() {
            println!("{line}");
        }
    }
    Ok(())
}

/// Run the send pipeline against a scripted host and collect what it wrote
pub async fn simulate(
    args: &SimulateArgs,
    config: &BridgeConfig,
) -> Result<SimulationReport, CliError> {
    if !args.amount.is_finite() {
        return Err(CliError::InvalidAmount(args.amount));
    }
    let config = simulation_config(config, args.send_timeout_ms);

    let (window, posted) = LoopbackWindow::new();
    let host_window: Arc<dyn HostWindow> = window.clone();
    let bridge = HostBridge::from_config(&config, Some(host_window))?;
    let origin = bridge.rpc().channel().origin().to_string();
    if args.reply != HostReply::Offline {
        bridge
            .rpc()
            .dispatch(&window.event(&origin, json!({"type": "BRIDGE_READY"})));
    }
    let responder = spawn_responder(
        bridge.rpc().clone(),
        window,
        posted,
        origin,
        scripted_host(args.reply, args.remote_id.clone()),
    );

    let store = LedgerStore::new(MemoryStore::new());
    let records = RecordService::new(store.clone());
    let record = records.create(record_input(args)).await?;

    let pipeline = SendPipeline::new(
        store.clone(),
        bridge.clone(),
        CliPrompts {
            yes: args.yes,
            phrase: args.phrase.clone(),
        },
        SendSettings::from(&config),
    );

    let passes = if args.resend { 2 } else { 1 };
    let mut sends = Vec::with_capacity(passes);
    for _ in 0..passes {
        let result = pipeline.send(&record.id, SendOptions::default()).await;
        sends.push(SendReport::from_result(result)?);
    }

    bridge.destroy();
    responder.abort();

    let id = record.id.clone();
    let mut attempts = store.attempts_for(&id).await?;
    attempts.sort_by_key(|attempt| attempt.created_at);
    let remote = store.remote_mapping(&id).await?;
    let state = derive_send_state(&attempts, remote.as_ref());
    let history = records.history(&id).await?;
    let record = store.get_record(&id).await?.unwrap_or(record);

    Ok(SimulationReport {
        record,
        history,
        sends,
        state,
        attempts,
        remote,
    })
}

/// Config with a usable origin and the requested submission timeout
fn simulation_config(config: &BridgeConfig, send_timeout_ms: Option<u64>) -> BridgeConfig {
    let mut config = config.clone();
    if config.host_origin.is_none() {
        config.host_origin = config
            .allowed_host_origins
            .first()
            .cloned()
            .or_else(|| Some("http://localhost:5173".to_string()));
    }
    if let Some(timeout) = send_timeout_ms {
        config.send_timeout_ms = timeout;
    }
    config
}

fn record_input(args: &SimulateArgs) -> RecordInput {
    RecordInput {
        txn_type: if args.income {
            TxnType::Income
        } else {
            TxnType::Expense
        },
        date: Some(args.date),
        doc_value: args.amount,
        paid_value: Some(args.amount),
        vendor: args.vendor.trim().to_string(),
        notes: args.notes.trim().to_string(),
        category_id: args.category.clone().map(Value::String),
        ..RecordInput::default()
    }
}

/// Host double answering submissions according to `reply`
pub fn scripted_host(
    reply: HostReply,
    remote_id: String,
) -> impl FnMut(&Value) -> Option<Value> + Send + 'static {
    let mut submissions = 0_u32;
    move |request: &Value| {
        let kind = request.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "APP_READY" => None,
            "CREATE_EXPENSE" | "CREATE_INCOME" => {
                submissions += 1;
                match reply {
                    HostReply::Success => {
                        let remote_txn_id = if submissions == 1 {
                            remote_id.clone()
                        } else {
                            format!("{remote_id}-{submissions}")
                        };
                        Some(json!({
                            "type": "RESULT",
                            "result": {"status": "success", "remoteTxnId": remote_txn_id}
                        }))
                    }
                    HostReply::Reject => Some(json!({
                        "type": "ERROR",
                        "error": {"code": "CATEGORY_NOT_FOUND", "message": "Category does not exist"}
                    })),
                    HostReply::Malformed => Some(json!({
                        "type": "RESULT",
                        "result": {"status": "success"}
                    })),
                    HostReply::Silent | HostReply::Offline => None,
                }
            }
            _ => Some(json!({"type": "RESULT", "result": {}})),
        }
    }
}
