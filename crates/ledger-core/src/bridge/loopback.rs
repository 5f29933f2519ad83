//! In-process host window
//!
//! `LoopbackWindow` stands in for the embedding host when there is no real
//! browser window: posted envelopes are queued on a channel, and a responder
//! task can answer them through an `RpcClient`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::channel::{HostWindow, MessageEvent, TransportError, WindowId};
use super::rpc::RpcClient;

/// Envelope posted to the loopback window
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub message: Value,
    pub target_origin: String,
}

/// Host window double backed by an unbounded queue
#[derive(Debug)]
pub struct LoopbackWindow {
    id: WindowId,
    outbox: mpsc::UnboundedSender<PostedMessage>,
    closed: AtomicBool,
}

impl LoopbackWindow {
    /// Create a window and the receiver of everything posted to it
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PostedMessage>) {
        let (outbox, posted) = mpsc::unbounded_channel();
        let window = Arc::new(Self {
            id: WindowId::new(),
            outbox,
            closed: AtomicBool::new(false),
        });
        (window, posted)
    }

    /// Make every later `post_message` fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Event as if `data` was posted by this window from `origin`
    pub fn event(&self, origin: &str, data: Value) -> MessageEvent {
        MessageEvent {
            data,
            origin: origin.to_string(),
            source: Some(self.id),
        }
    }
}

impl HostWindow for LoopbackWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError("host window closed".to_string()));
        }
        self.outbox
            .send(PostedMessage {
                message,
                target_origin: target_origin.to_string(),
            })
            .map_err(|_| TransportError("host window closed".to_string()))
    }
}

/// Answer posted envelopes with `respond` until the queue closes.
///
/// `respond` gets each posted envelope and returns the reply data, or `None`
/// to stay silent. The request's `requestId` is copied onto replies that do
/// not carry one.
pub fn spawn_responder<F>(
    client: RpcClient,
    window: Arc<LoopbackWindow>,
    mut posted: mpsc::UnboundedReceiver<PostedMessage>,
    origin: String,
    mut respond: F,
) -> JoinHandle<()>
where
    F: FnMut(&Value) -> Option<Value> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(PostedMessage { message, .. }) = posted.recv().await {
            let Some(mut reply) = respond(&message) else {
                continue;
            };
            if let (Some(request_id), Value::Object(map)) = (message.get("requestId"), &mut reply)
            {
                map.entry("requestId").or_insert_with(|| request_id.clone());
            }
            client.dispatch(&window.event(&origin, reply));
        }
    })
}
