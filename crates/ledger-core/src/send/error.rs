//! Send failures and how they are shown

use serde_json::Value;
use thiserror::Error;

use crate::bridge::RpcError;
use crate::error::Error;

pub(crate) const HOST_UNREACHABLE: &str = "HostUnreachable";
pub(crate) const INVALID_ACKNOWLEDGEMENT: &str = "InvalidAcknowledgement";
const CATEGORY_NOT_FOUND: &str = "CATEGORY_NOT_FOUND";

/// Why a record failed local pre-flight checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("record not found")]
    RecordNotFound,
    #[error("record has no date")]
    MissingDate,
    #[error("record has no valid amount")]
    MissingAmount,
}

/// Errors returned by [`super::SendPipeline::send`]
#[derive(Debug, Error)]
pub enum SendError {
    /// Local pre-flight failure; nothing was written
    #[error("cannot send record: {0}")]
    ValidationError(ValidationIssue),

    /// Another send of the same record is in flight
    #[error("a send for this record is already in progress")]
    InProgress,

    /// No connected host; a failed attempt was recorded
    #[error("host is not connected")]
    HostUnreachable,

    /// The host did not answer in time
    #[error("host did not answer {request_type} within {timeout_ms}ms")]
    Timeout {
        request_type: &'static str,
        timeout_ms: u64,
    },

    /// The host refused the submission; code and message are the host's own
    #[error("host rejected the submission: {code}: {message}")]
    HostRejected {
        code: String,
        message: String,
        response: Value,
    },

    /// The host answered without a usable confirmation
    #[error("Invalid host confirmation")]
    InvalidAcknowledgement { response: Value },

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] Error),
}

impl From<RpcError> for SendError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Timeout {
                request_type,
                timeout_ms,
                ..
            } => Self::Timeout {
                request_type,
                timeout_ms,
            },
            RpcError::Host {
                code,
                message,
                response,
                ..
            } => Self::HostRejected {
                code,
                message,
                response,
            },
            RpcError::Destroyed | RpcError::Transport(_) => Self::HostUnreachable,
            RpcError::Encode(message) => Self::Store(Error::InvalidInput(message)),
        }
    }
}

/// How a failure should be surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// Lightweight inline notice
    Inline(String),
    /// Recoverable warning
    SoftWarning(String),
    /// Detailed dialog with copyable diagnostics
    Dialog {
        title: String,
        message: String,
        details: String,
    },
}

impl SendError {
    /// Code persisted on the failed attempt
    pub fn code(&self) -> String {
        match self {
            Self::ValidationError(_) => "ValidationError".to_string(),
            Self::InProgress => "InProgress".to_string(),
            Self::HostUnreachable => HOST_UNREACHABLE.to_string(),
            Self::Timeout { .. } => "Timeout".to_string(),
            Self::HostRejected { code, .. } => code.clone(),
            Self::InvalidAcknowledgement { .. } => INVALID_ACKNOWLEDGEMENT.to_string(),
            Self::Store(_) => "StoreError".to_string(),
        }
    }

    /// Message persisted on the failed attempt
    pub fn message(&self) -> String {
        match self {
            Self::HostRejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Raw host response, when there was one
    pub const fn response(&self) -> Option<&Value> {
        match self {
            Self::HostRejected { response, .. } | Self::InvalidAcknowledgement { response } => {
                Some(response)
            }
            _ => None,
        }
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            Self::ValidationError(_) | Self::InProgress => Presentation::Inline(self.to_string()),
            Self::HostUnreachable => Presentation::SoftWarning(
                "The host is not connected. The attempt was recorded; send again once it is available."
                    .to_string(),
            ),
            _ => {
                let code = self.code();
                Presentation::Dialog {
                    title: "Could not send to host".to_string(),
                    message: friendly_message(&code).to_string(),
                    details: format!("Code: {code}\nMessage: {}", self.message()),
                }
            }
        }
    }
}

/// User-facing explanation for a host error code
pub fn friendly_message(code: &str) -> &'static str {
    if code == CATEGORY_NOT_FOUND {
        "The category does not exist in the host. Pick another category and send again."
    } else {
        "The host could not register this transaction. Review the details and try again."
    }
}
