//! Correlated request/response calls over the channel
//!
//! Every call registers a one-shot responder under a fresh `requestId`. The
//! entry is removed by exactly one of: a matching `RESULT`, a matching
//! `ERROR`, the timeout, or teardown. Whoever removes it completes the call;
//! later matches for the same id find nothing and are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::channel::{Channel, MessageEvent, TransportError};
use super::protocol::{HostMessage, HostRequest};
use crate::config::BridgeConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(8_000);
const MIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-call failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// No response within the bound
    #[error("host request timed out ({request_type}, {timeout_ms}ms)")]
    Timeout {
        request_type: &'static str,
        timeout_ms: u64,
        request_id: String,
    },

    /// The host answered with an error; code and message are verbatim
    #[error("host rejected {request_type}: {code}: {message}")]
    Host {
        request_type: &'static str,
        code: String,
        message: String,
        /// Raw response the error was read from
        response: Value,
    },

    /// The client was torn down before or while the call was pending
    #[error("host bridge destroyed")]
    Destroyed,

    /// The envelope could not be posted
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl RpcError {
    /// Host error read from an `{ code, message }` object.
    ///
    /// Codes pass through as sent; a missing code reads `UNKNOWN`.
    pub fn host(error: &Value, request_type: &'static str, response: Value) -> Self {
        let code = match error.get("code") {
            Some(Value::String(code)) if !code.is_empty() => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => "UNKNOWN".to_string(),
        };
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .unwrap_or("Unknown host error")
            .to_string();

        Self::Host {
            request_type,
            code,
            message,
            response,
        }
    }
}

/// Timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOptions {
    /// Bound for calls that do not pass one
    pub default_timeout: Duration,
    /// Floor applied to every bound
    pub min_timeout: Duration,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            min_timeout: MIN_TIMEOUT,
        }
    }
}

impl From<&BridgeConfig> for RpcOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            default_timeout: config.default_timeout(),
            min_timeout: config.min_timeout(),
        }
    }
}

impl RpcOptions {
    /// Effective bound for a call
    pub fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout
            .unwrap_or(self.default_timeout)
            .max(self.min_timeout)
    }
}

type Responder = oneshot::Sender<Result<Value, RpcError>>;

#[derive(Debug)]
struct Pending {
    responder: Responder,
    request_type: &'static str,
}

#[derive(Debug)]
struct Inner {
    channel: Channel,
    options: RpcOptions,
    pending: Mutex<HashMap<String, Pending>>,
    destroyed: AtomicBool,
}

/// RPC client over a [`Channel`]; clones share the pending map
#[derive(Debug, Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    pub fn new(channel: Channel, options: RpcOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                options,
                pending: Mutex::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn options(&self) -> RpcOptions {
        self.inner.options
    }

    /// Post a request that expects no reply
    pub fn notify(&self, request: &HostRequest) -> Result<(), RpcError> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }
        let envelope = request
            .to_envelope(None)
            .map_err(|err| RpcError::Encode(err.to_string()))?;
        self.inner.channel.send(envelope)?;
        Ok(())
    }

    /// Issue `request` and wait for its correlated reply.
    ///
    /// `timeout` defaults to the configured bound and is clamped to the floor.
    pub async fn call(
        &self,
        request: &HostRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let request_type = request.kind();
        let request_id = Uuid::new_v4().to_string();
        let bound = self.inner.options.effective_timeout(timeout);
        let envelope = request
            .to_envelope(Some(&request_id))
            .map_err(|err| RpcError::Encode(err.to_string()))?;

        let (responder, mut response) = oneshot::channel();
        {
            let mut pending = self.lock_pending();
            if self.is_destroyed() {
                return Err(RpcError::Destroyed);
            }
            pending.insert(
                request_id.clone(),
                Pending {
                    responder,
                    request_type,
                },
            );
        }
        let _release = PendingRelease {
            client: self,
            request_id: &request_id,
        };

        self.inner.channel.send(envelope)?;
        tracing::debug!(%request_id, request_type, timeout_ms = millis(bound), "host request sent");

        match tokio::time::timeout(bound, &mut response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Destroyed),
            Err(_) => {
                let expired = self.lock_pending().remove(&request_id).is_some();
                if expired {
                    tracing::debug!(%request_id, request_type, "host request timed out");
                    return Err(RpcError::Timeout {
                        request_type,
                        timeout_ms: millis(bound),
                        request_id: request_id.clone(),
                    });
                }
                // A reply claimed the entry as the bound elapsed
                response.try_recv().unwrap_or(Err(RpcError::Destroyed))
            }
        }
    }

    /// Route an inbound event to its pending call.
    ///
    /// Returns whether a pending call was completed.
    pub fn dispatch(&self, event: &MessageEvent) -> bool {
        let Some(message) = self.inner.channel.accept(event) else {
            return false;
        };
        let Some(request_id) = message.request_id().map(str::to_string) else {
            return false;
        };
        if matches!(message, HostMessage::BridgeReady { .. }) {
            return false;
        }

        let Some(pending) = self.lock_pending().remove(&request_id) else {
            tracing::debug!(%request_id, "dropping reply with no pending request");
            return false;
        };

        let outcome = match message {
            HostMessage::Result { result, .. } => Ok(result),
            HostMessage::HostContext { payload, .. } => Ok(payload.unwrap_or(Value::Null)),
            HostMessage::Error { error, .. } => {
                let response = serde_json::json!({ "error": error });
                Err(RpcError::host(&error, pending.request_type, response))
            }
            HostMessage::BridgeReady { .. } => return false,
        };
        tracing::debug!(
            %request_id,
            request_type = pending.request_type,
            ok = outcome.is_ok(),
            "host request completed"
        );
        // The caller may have stopped waiting
        let _ = pending.responder.send(outcome);
        true
    }

    /// Dispatch every event from `events` until the sender closes
    pub fn listen(&self, mut events: mpsc::UnboundedReceiver<MessageEvent>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                client.dispatch(&event);
            }
        })
    }

    /// Reject every pending call and refuse new ones
    pub fn destroy(&self) {
        let drained: Vec<Pending> = {
            let mut pending = self.lock_pending();
            self.inner.destroyed.store(true, Ordering::SeqCst);
            pending.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "rejecting pending host requests");
        }
        for entry in drained {
            let _ = entry.responder.send(Err(RpcError::Destroyed));
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops a call's pending entry when the caller stops waiting
struct PendingRelease<'a> {
    client: &'a RpcClient,
    request_id: &'a str,
}

impl Drop for PendingRelease<'_> {
    fn drop(&mut self) {
        self.client.lock_pending().remove(self.request_id);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
