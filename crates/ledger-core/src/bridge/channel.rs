//! Authenticated link to exactly one counterpart window

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;

use super::protocol::{message_type, HostMessage};
use crate::config::{normalize_origin, BridgeConfig};
use crate::error::ConfigurationError;
use crate::models::uuid_id;

uuid_id!(
    /// Identity of a window, compared against `MessageEvent::source`
    WindowId
);

/// Failure to hand an envelope to the transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("postMessage failed: {0}")]
pub struct TransportError(pub String);

/// The counterpart window as seen by this application
pub trait HostWindow: Send + Sync {
    /// Stable identity of this window
    fn id(&self) -> WindowId;

    /// Deliver `message` to the window if its origin is `target_origin`
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), TransportError>;
}

/// Inbound message event
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub data: Value,
    pub origin: String,
    pub source: Option<WindowId>,
}

#[derive(Debug, Default)]
struct ChannelState {
    ready: bool,
    active_origin: Option<String>,
    host_context: Option<Value>,
    warned_origins: HashSet<String>,
}

/// Channel to the host window.
///
/// An envelope is accepted only when its origin equals the configured origin,
/// its source is the known host window, and its `type` is recognized.
pub struct Channel {
    origin: String,
    window: Arc<dyn HostWindow>,
    state: Mutex<ChannelState>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Channel")
            .field("origin", &self.origin)
            .field("window", &self.window.id())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel for an exact `scheme://host[:port]` origin
    pub fn new(
        origin: &str,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Result<Self, ConfigurationError> {
        let trimmed = origin.trim();
        let normalized = normalize_origin(trimmed)?;
        if normalized != trimmed.trim_end_matches('/') {
            return Err(ConfigurationError::InvalidOrigin(trimmed.to_string()));
        }
        let window = window.ok_or(ConfigurationError::MissingHostWindow)?;

        Ok(Self {
            origin: normalized,
            window,
            state: Mutex::new(ChannelState::default()),
        })
    }

    /// Create a channel for the origin resolved from `config`
    pub fn from_config(
        config: &BridgeConfig,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(&config.resolve_host_origin()?, window)
    }

    /// The trusted origin
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Post an envelope to the host window, as is
    pub fn send(&self, envelope: Value) -> Result<(), TransportError> {
        self.window.post_message(envelope, &self.origin)
    }

    /// Validate an inbound event; `None` means it was dropped
    pub fn accept(&self, event: &MessageEvent) -> Option<HostMessage> {
        message_type(&event.data)?;

        if event.origin != self.origin {
            let mut state = self.lock_state();
            if state.warned_origins.insert(event.origin.clone()) {
                tracing::warn!(
                    got = %event.origin,
                    expected = %self.origin,
                    "blocked host message: origin mismatch"
                );
            }
            return None;
        }

        if event.source != Some(self.window.id()) {
            return None;
        }

        let message = HostMessage::decode(&event.data)?;
        if message.is_handshake() {
            self.mark_handshake(&event.origin, &message);
        }
        Some(message)
    }

    /// Whether a handshake message has been accepted
    pub fn is_ready(&self) -> bool {
        self.lock_state().ready
    }

    /// Origin that completed the handshake
    pub fn active_origin(&self) -> Option<String> {
        self.lock_state().active_origin.clone()
    }

    /// Last host context seen (pushed or requested)
    pub fn host_context(&self) -> Option<Value> {
        self.lock_state().host_context.clone()
    }

    /// Cache a host context obtained through a request
    pub fn remember_host_context(&self, context: Value) {
        self.lock_state().host_context = Some(context);
    }

    fn mark_handshake(&self, origin: &str, message: &HostMessage) {
        let mut state = self.lock_state();
        if state.ready {
            return;
        }
        state.ready = true;
        state.active_origin = Some(origin.to_string());
        if let HostMessage::HostContext {
            payload: Some(payload @ Value::Object(_)),
            ..
        } = message
        {
            state.host_context = Some(payload.clone());
        }
        tracing::info!(origin, "host bridge handshake completed");
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
