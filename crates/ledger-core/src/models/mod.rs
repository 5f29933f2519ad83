//! Data models for LedgerLite

mod attempt;
mod change_log;
mod record;
mod remote_map;

pub use attempt::{AttemptId, AttemptStatus, SendAttempt, SendPayload};
pub use change_log::{ChangeAction, ChangeId, ChangeLogEntry, ChangeSource, FieldChange};
pub use record::{
    append_remote_txn_id, IdempotencyKey, Record, RecordId, RecordInput, RecordStatus, TxnType,
};
pub use remote_map::RemoteMapping;

/// Declares a UUID v7 (time-sortable) identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new unique ID
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub(crate) use uuid_id;
