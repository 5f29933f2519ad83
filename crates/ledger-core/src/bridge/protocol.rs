//! Wire envelopes exchanged with the host
//!
//! Outbound: `{ type, payload?, requestId? }`. Inbound: `RESULT`, `ERROR`,
//! and the `HOST_CONTEXT` / `BRIDGE_READY` handshake pushes. Any other
//! discriminator fails to decode and is dropped by the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload::SubmissionPayload;

/// Requests this application sends to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostRequest {
    /// Fire-and-forget announcement that the app has loaded
    AppReady,
    /// Context request (answered with `HOST_CONTEXT` or `RESULT`)
    RequestHostContext,
    /// Profile request
    GetUserProfile,
    /// Expense submission
    CreateExpense { payload: SubmissionPayload },
    /// Income submission
    CreateIncome { payload: SubmissionPayload },
}

impl HostRequest {
    /// Wire discriminator
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AppReady => "APP_READY",
            Self::RequestHostContext => "REQUEST_HOST_CONTEXT",
            Self::GetUserProfile => "GET_USER_PROFILE",
            Self::CreateExpense { .. } => "CREATE_EXPENSE",
            Self::CreateIncome { .. } => "CREATE_INCOME",
        }
    }

    /// Serialize into a wire envelope, tagging it with `request_id` when given
    pub fn to_envelope(&self, request_id: Option<&str>) -> serde_json::Result<Value> {
        let mut envelope = serde_json::to_value(self)?;
        if let (Some(request_id), Value::Object(map)) = (request_id, &mut envelope) {
            map.insert("requestId".to_string(), Value::String(request_id.to_string()));
        }
        Ok(envelope)
    }
}

/// Messages the host sends to this application
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    /// Successful reply to a request
    Result {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        #[serde(default)]
        result: Value,
    },
    /// Failed reply to a request; `error` is `{ code, message }`
    Error {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        #[serde(default)]
        error: Value,
    },
    /// Context push (handshake) or reply to a context request
    HostContext {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Ready acknowledgement (handshake)
    BridgeReady {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
}

impl HostMessage {
    /// Decode an inbound payload; `None` for anything unrecognized
    pub fn decode(data: &Value) -> Option<Self> {
        message_type(data)?;
        serde_json::from_value(data.clone()).ok()
    }

    /// Correlation id, if the host echoed one
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Result { request_id, .. }
            | Self::Error { request_id, .. }
            | Self::HostContext { request_id, .. }
            | Self::BridgeReady { request_id } => request_id.as_deref(),
        }
    }

    /// Whether this message completes the handshake
    pub const fn is_handshake(&self) -> bool {
        matches!(self, Self::HostContext { .. } | Self::BridgeReady { .. })
    }
}

/// The `type` string of an object payload, if any
pub(crate) fn message_type(data: &Value) -> Option<&str> {
    data.as_object()?.get("type")?.as_str()
}
