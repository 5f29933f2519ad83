//! Record mutations with their change log entries

use std::cmp::Reverse;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{ChangeLogEntry, ChangeSource, Record, RecordId, RecordInput, SendAttempt};
use crate::store::{LedgerStore, RecordStore};
use crate::util::unix_millis_now;

/// One row of a record's history view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryItem {
    Attempt(SendAttempt),
    Change(ChangeLogEntry),
}

impl HistoryItem {
    /// Unix ms of the row
    pub const fn created_at(&self) -> i64 {
        match self {
            Self::Attempt(attempt) => attempt.created_at,
            Self::Change(entry) => entry.created_at,
        }
    }
}

/// Service for user-driven record operations
pub struct RecordService<S> {
    store: LedgerStore<S>,
}

impl<S> Clone for RecordService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RecordStore> RecordService<S> {
    /// Create a new record service
    pub const fn new(store: LedgerStore<S>) -> Self {
        Self { store }
    }

    /// Create a draft record at revision 1
    pub async fn create(&self, input: RecordInput) -> Result<Record> {
        self.create_with_id(RecordId::new(), input).await
    }

    /// Create a draft record under a caller-chosen id
    pub async fn create_with_id(&self, id: RecordId, input: RecordInput) -> Result<Record> {
        let record = Record::with_id(id, input);
        self.store.add_record(&record).await?;
        self.store
            .add_change(&ChangeLogEntry::created(
                &record,
                ChangeSource::UserCreate,
                unix_millis_now(),
            ))
            .await?;
        tracing::debug!(record_id = %record.id, "record created");
        Ok(record)
    }

    /// Apply user edits as the next revision.
    ///
    /// Edits that change no tracked field leave the record untouched.
    pub async fn edit(&self, id: &RecordId, input: RecordInput) -> Result<Record> {
        let before = self.require(id).await?;
        let after = before.edited(input);
        let entry =
            ChangeLogEntry::updated(&before, &after, ChangeSource::UserEdit, unix_millis_now())?;
        if entry.diff.is_empty() {
            return Ok(before);
        }

        self.store.put_record(&after).await?;
        self.store.add_change(&entry).await?;
        tracing::debug!(record_id = %id, revision = after.revision, "record edited");
        Ok(after)
    }

    /// Log the prior snapshot, then remove the record
    pub async fn delete(&self, id: &RecordId) -> Result<Record> {
        let before = self.require(id).await?;
        self.store
            .add_change(&ChangeLogEntry::deleted(
                &before,
                ChangeSource::UserDelete,
                unix_millis_now(),
            ))
            .await?;
        self.store.delete_record(id).await?;
        tracing::debug!(record_id = %id, "record deleted");
        Ok(before)
    }

    pub async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        self.store.get_record(id).await
    }

    /// All records, newest date first; undated records last
    pub async fn list(&self) -> Result<Vec<Record>> {
        let mut records = self.store.list_records().await?;
        records.sort_by_key(|record| (record.date.is_none(), Reverse(record.date)));
        Ok(records)
    }

    /// Attempts and change log entries of a record, oldest first
    pub async fn history(&self, id: &RecordId) -> Result<Vec<HistoryItem>> {
        let mut items: Vec<HistoryItem> = self
            .store
            .attempts_for(id)
            .await?
            .into_iter()
            .map(HistoryItem::Attempt)
            .chain(
                self.store
                    .changes_for(id)
                    .await?
                    .into_iter()
                    .map(HistoryItem::Change),
            )
            .collect();
        items.sort_by_key(HistoryItem::created_at);
        Ok(items)
    }

    async fn require(&self, id: &RecordId) -> Result<Record> {
        self.store
            .get_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
