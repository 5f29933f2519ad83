//! Doubles shared by unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::bridge::{
    spawn_responder, Channel, HostBridge, LoopbackWindow, PostedMessage, RpcClient, RpcOptions,
};
use crate::models::{Record, RecordInput};
use crate::send::{AlreadySentNotice, SendPrompts};

pub(crate) const ORIGIN: &str = "https://allowed.test";

pub(crate) fn rpc_client() -> (
    RpcClient,
    Arc<LoopbackWindow>,
    UnboundedReceiver<PostedMessage>,
) {
    let (window, posted) = LoopbackWindow::new();
    let channel = Channel::new(ORIGIN, Some(window.clone())).unwrap();
    (
        RpcClient::new(channel, RpcOptions::default()),
        window,
        posted,
    )
}

/// Bridge whose host has not completed the handshake
pub(crate) fn bridge() -> (
    HostBridge,
    Arc<LoopbackWindow>,
    UnboundedReceiver<PostedMessage>,
) {
    let (rpc, window, posted) = rpc_client();
    (
        HostBridge::new(rpc, Duration::from_millis(1_200)),
        window,
        posted,
    )
}

/// Deliver the host's ready acknowledgement
pub(crate) fn connect(bridge: &HostBridge, window: &LoopbackWindow) {
    bridge
        .rpc()
        .dispatch(&window.event(ORIGIN, json!({"type": "BRIDGE_READY"})));
}

/// Connected bridge whose host answers through `respond`
pub(crate) fn connected_bridge<F>(respond: F) -> (HostBridge, JoinHandle<()>)
where
    F: FnMut(&Value) -> Option<Value> + Send + 'static,
{
    let (bridge, window, posted) = bridge();
    connect(&bridge, &window);
    let responder = spawn_responder(
        bridge.rpc().clone(),
        window,
        posted,
        ORIGIN.to_string(),
        respond,
    );
    (bridge, responder)
}

/// Draft input worth 95.00 (100 + 5 - 10) on 2024-05-01
pub(crate) fn record_input(vendor: &str) -> RecordInput {
    RecordInput {
        date: NaiveDate::from_ymd_opt(2024, 5, 1),
        doc_value: 100.0,
        interest: 5.0,
        discount: 10.0,
        vendor: vendor.to_string(),
        ..RecordInput::default()
    }
}

#[derive(Debug, Default)]
struct PromptCalls {
    resend: AtomicUsize,
    phrase: AtomicUsize,
    first_send: AtomicUsize,
    last_notice: Mutex<Option<AlreadySentNotice>>,
}

/// Prompt answers fixed up front; clones share call counters
#[derive(Debug, Clone)]
pub(crate) struct ScriptedPrompts {
    resend: bool,
    phrase: Option<String>,
    first_send: bool,
    calls: Arc<PromptCalls>,
}

impl ScriptedPrompts {
    /// Says yes to everything and types the default phrase
    pub(crate) fn approving() -> Self {
        Self {
            resend: true,
            phrase: Some("confirm send".to_string()),
            first_send: true,
            calls: Arc::default(),
        }
    }

    pub(crate) fn with_phrase(mut self, phrase: Option<&str>) -> Self {
        self.phrase = phrase.map(ToString::to_string);
        self
    }

    pub(crate) fn declining_resend(mut self) -> Self {
        self.resend = false;
        self
    }

    pub(crate) fn declining_first_send(mut self) -> Self {
        self.first_send = false;
        self
    }

    pub(crate) fn resend_asked(&self) -> usize {
        self.calls.resend.load(Ordering::SeqCst)
    }

    pub(crate) fn phrase_asked(&self) -> usize {
        self.calls.phrase.load(Ordering::SeqCst)
    }

    pub(crate) fn first_send_asked(&self) -> usize {
        self.calls.first_send.load(Ordering::SeqCst)
    }

    pub(crate) fn last_notice(&self) -> Option<AlreadySentNotice> {
        self.calls.last_notice.lock().unwrap().clone()
    }
}

impl SendPrompts for ScriptedPrompts {
    async fn confirm_resend(&self, notice: &AlreadySentNotice) -> bool {
        self.calls.resend.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_notice.lock().unwrap() = Some(notice.clone());
        self.resend
    }

    async fn resend_phrase(&self, _expected: &str) -> Option<String> {
        self.calls.phrase.fetch_add(1, Ordering::SeqCst);
        self.phrase.clone()
    }

    async fn confirm_first_send(&self, _record: &Record) -> bool {
        self.calls.first_send.fetch_add(1, Ordering::SeqCst);
        self.first_send
    }
}
