//! Typed host operations on top of the RPC client

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::channel::{Channel, HostWindow};
use super::payload::SubmissionPayload;
use super::protocol::HostRequest;
use super::rpc::{RpcClient, RpcError, RpcOptions};
use crate::config::BridgeConfig;
use crate::error::ConfigurationError;
use crate::models::{SendPayload, TxnType};

const CONTEXT_TIMEOUT: Duration = Duration::from_millis(6_000);
const READY_POLL: Duration = Duration::from_millis(50);
const READY_FLOOR: Duration = Duration::from_millis(250);
const CONTEXT_VERSION: u64 = 1;

/// The host bridge owned by the application
#[derive(Debug, Clone)]
pub struct HostBridge {
    rpc: RpcClient,
    handshake_timeout: Duration,
}

impl HostBridge {
    pub const fn new(rpc: RpcClient, handshake_timeout: Duration) -> Self {
        Self {
            rpc,
            handshake_timeout,
        }
    }

    /// Build the channel and client described by `config`
    pub fn from_config(
        config: &BridgeConfig,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Result<Self, ConfigurationError> {
        let channel = Channel::from_config(config, window)?;
        Ok(Self::new(
            RpcClient::new(channel, RpcOptions::from(config)),
            config.handshake_timeout(),
        ))
    }

    pub const fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Announce the app and request the host context in the background.
    ///
    /// A failing context request is logged and otherwise ignored.
    pub fn initialize(&self) -> Result<JoinHandle<()>, RpcError> {
        self.rpc.notify(&HostRequest::AppReady)?;

        let rpc = self.rpc.clone();
        Ok(tokio::spawn(async move {
            match rpc
                .call(&HostRequest::RequestHostContext, Some(CONTEXT_TIMEOUT))
                .await
            {
                Ok(context) if is_current_context(&context) => {
                    rpc.channel().remember_host_context(context);
                }
                Ok(_) => tracing::debug!("ignoring host context with unknown version"),
                Err(err) => tracing::debug!(error = %err, "host context request failed"),
            }
        }))
    }

    /// Handshake seen and bridge not torn down
    pub fn is_connected(&self) -> bool {
        self.rpc.channel().is_ready() && !self.rpc.is_destroyed()
    }

    /// Poll for the handshake for up to `timeout` (at least 250ms)
    pub async fn wait_until_ready(&self, timeout: Option<Duration>) -> bool {
        let bound = timeout.unwrap_or(self.handshake_timeout).max(READY_FLOOR);
        let deadline = Instant::now() + bound;
        loop {
            if self.is_connected() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Last host context received
    pub fn host_context(&self) -> Option<Value> {
        self.rpc.channel().host_context()
    }

    /// Username of the signed-in host user, if any
    pub async fn get_user_profile(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, RpcError> {
        let result = self
            .rpc
            .call(&HostRequest::GetUserProfile, timeout)
            .await?;
        Ok(result
            .pointer("/profile/username")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string))
    }

    /// Submit a record snapshot as an income or expense.
    ///
    /// A `RESULT` carrying an `error` object is a rejection.
    pub async fn submit(
        &self,
        payload: &SendPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let submission = SubmissionPayload::from(payload);
        let request = match payload.txn_type {
            TxnType::Income => HostRequest::CreateIncome {
                payload: submission,
            },
            TxnType::Expense => HostRequest::CreateExpense {
                payload: submission,
            },
        };

        let result = self.rpc.call(&request, timeout).await?;
        if let Some(error) = result.get("error").filter(|error| error.is_object()) {
            return Err(RpcError::host(error, request.kind(), result.clone()));
        }
        Ok(result)
    }

    /// Tear down the client, rejecting every pending call
    pub fn destroy(&self) {
        self.rpc.destroy();
    }
}

fn is_current_context(context: &Value) -> bool {
    context.get("v").and_then(Value::as_u64) == Some(CONTEXT_VERSION)
}
