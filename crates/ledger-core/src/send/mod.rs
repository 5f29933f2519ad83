//! Send pipeline: gated, idempotent submission of records to the host
//!
//! Every submission is written as a pending attempt before the host is called
//! and finalized afterwards. The send state of a record is always derived from
//! those rows (see [`derive_send_state`]), never stored as a flag.

mod error;
mod pipeline;
mod prompts;
mod state;

pub use error::{friendly_message, Presentation, SendError, ValidationIssue};
pub use pipeline::{SendOptions, SendOutcome, SendPipeline, SendSettings};
pub use prompts::{phrase_matches, Gate, SendPrompts};
pub use state::{derive_send_state, AlreadySentNotice, SendState};
