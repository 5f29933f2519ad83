//! Human confirmation gates around sending

use serde::Serialize;

use super::state::AlreadySentNotice;
use crate::models::Record;

/// Answers the confirmation questions asked while sending.
///
/// Implemented by the UI layer; every method may wait on the user.
#[allow(async_fn_in_trait)]
pub trait SendPrompts {
    /// The record was already sent; does the user want to send it again?
    async fn confirm_resend(&self, notice: &AlreadySentNotice) -> bool;

    /// Ask the user to type `expected`; `None` when the prompt was dismissed
    async fn resend_phrase(&self, expected: &str) -> Option<String>;

    /// One-time confirmation before the first send of `record`
    async fn confirm_first_send(&self, record: &Record) -> bool;
}

/// Confirmation gate that stopped a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// User closed the already-sent notice
    ResendDeclined,
    /// Typed phrase did not match (or the prompt was dismissed)
    PhraseMismatch,
    /// User declined the first-send confirmation
    FirstSendDeclined,
}

/// Case-insensitive, whitespace-trimmed phrase comparison
pub fn phrase_matches(expected: &str, input: &str) -> bool {
    let input = input.trim();
    !input.is_empty() && input.to_lowercase() == expected.trim().to_lowercase()
}
