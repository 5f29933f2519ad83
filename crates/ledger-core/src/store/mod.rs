//! Record store collaborator interface
//!
//! The durable engine lives outside this crate. `RecordStore` is the narrow
//! document interface the core consumes; `LedgerStore` layers typed access on
//! top of it.

mod memory;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{ChangeLogEntry, Record, RecordId, RemoteMapping, SendAttempt};

pub use memory::MemoryStore;

/// Named collections and their key fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Records,
    SendAttempts,
    RemoteMap,
    ChangeLog,
}

impl Collection {
    /// Collection name as stored
    pub const fn name(self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::SendAttempts => "send_attempts",
            Self::RemoteMap => "remote_map",
            Self::ChangeLog => "change_log",
        }
    }

    /// Field holding the primary key of each item
    pub const fn key_field(self) -> &'static str {
        match self {
            Self::Records => "id",
            Self::SendAttempts => "attemptId",
            Self::RemoteMap => "recordId",
            Self::ChangeLog => "changeId",
        }
    }
}

/// Trait for document storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Get one item by primary key
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    /// Get every item of a collection
    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Get every item whose `index` field equals `value`
    async fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Value>>;

    /// Insert a new item; fails on a duplicate key
    async fn add(&self, collection: Collection, item: Value) -> Result<()>;

    /// Insert or replace an item
    async fn put(&self, collection: Collection, item: Value) -> Result<()>;

    /// Remove an item by primary key
    async fn delete(&self, collection: Collection, key: &str) -> Result<()>;
}

/// Typed access to the ledger collections
pub struct LedgerStore<S> {
    inner: Arc<S>,
}

impl<S> Clone for LedgerStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RecordStore> LedgerStore<S> {
    /// Wrap a store
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Borrow the untyped store
    pub fn raw(&self) -> &S {
        &self.inner
    }

    pub async fn get_record(&self, id: &RecordId) -> Result<Option<Record>> {
        self.get_typed(Collection::Records, id.as_str()).await
    }

    pub async fn list_records(&self) -> Result<Vec<Record>> {
        decode_all(self.inner.get_all(Collection::Records).await?)
    }

    pub async fn add_record(&self, record: &Record) -> Result<()> {
        self.inner.add(Collection::Records, encode(record)?).await
    }

    pub async fn put_record(&self, record: &Record) -> Result<()> {
        self.inner.put(Collection::Records, encode(record)?).await
    }

    pub async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.inner.delete(Collection::Records, id.as_str()).await
    }

    pub async fn attempts_for(&self, id: &RecordId) -> Result<Vec<SendAttempt>> {
        decode_all(
            self.inner
                .get_all_by_index(Collection::SendAttempts, "recordId", id.as_str())
                .await?,
        )
    }

    pub async fn add_attempt(&self, attempt: &SendAttempt) -> Result<()> {
        self.inner
            .add(Collection::SendAttempts, encode(attempt)?)
            .await
    }

    pub async fn put_attempt(&self, attempt: &SendAttempt) -> Result<()> {
        self.inner
            .put(Collection::SendAttempts, encode(attempt)?)
            .await
    }

    pub async fn remote_mapping(&self, id: &RecordId) -> Result<Option<RemoteMapping>> {
        self.get_typed(Collection::RemoteMap, id.as_str()).await
    }

    pub async fn put_remote_mapping(&self, mapping: &RemoteMapping) -> Result<()> {
        self.inner.put(Collection::RemoteMap, encode(mapping)?).await
    }

    /// Append a change log entry (never replaced)
    pub async fn add_change(&self, entry: &ChangeLogEntry) -> Result<()> {
        self.inner.add(Collection::ChangeLog, encode(entry)?).await
    }

    pub async fn changes_for(&self, id: &RecordId) -> Result<Vec<ChangeLogEntry>> {
        decode_all(
            self.inner
                .get_all_by_index(Collection::ChangeLog, "recordId", id.as_str())
                .await?,
        )
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>> {
        self.inner
            .get(collection, key)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }
}

fn encode<T: Serialize>(item: &T) -> Result<Value> {
    Ok(serde_json::to_value(item)?)
}

fn decode_all<T: DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>> {
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(Into::into))
        .collect()
}
