//! Host bridge: authenticated cross-window channel and correlated RPC
//!
//! Layers, leaves first:
//! - [`Channel`] accepts envelopes only from the configured origin and window
//! - [`RpcClient`] turns one-way messages into request/response calls
//! - [`HostBridge`] exposes the typed host operations used by the app

mod channel;
mod host;
mod loopback;
mod payload;
mod protocol;
mod rpc;

pub use channel::{Channel, HostWindow, MessageEvent, TransportError, WindowId};
pub use host::HostBridge;
pub use loopback::{spawn_responder, LoopbackWindow, PostedMessage};
pub use payload::{normalize_category_id, SubmissionPayload};
pub use protocol::{HostMessage, HostRequest};
pub use rpc::{RpcClient, RpcError, RpcOptions};
