//! In-memory `RecordStore` implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{Collection, RecordStore};
use crate::error::{Error, Result};

type Tables = HashMap<Collection, BTreeMap<String, Value>>;

/// Volatile store used by tests and the CLI simulator
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn key_of(collection: Collection, item: &Value) -> Result<String> {
        match item.get(collection.key_field()) {
            Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
            _ => Err(Error::InvalidInput(format!(
                "{} item is missing its '{}' key",
                collection.name(),
                collection.key_field()
            ))),
        }
    }
}

impl RecordStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let tables = self.lock();
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>> {
        let tables = self.lock();
        Ok(tables
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Value>> {
        let tables = self.lock();
        Ok(tables
            .get(&collection)
            .map(|table| {
                table
                    .values()
                    .filter(|item| item.get(index).and_then(Value::as_str) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, collection: Collection, item: Value) -> Result<()> {
        let key = Self::key_of(collection, &item)?;
        let mut tables = self.lock();
        let table = tables.entry(collection).or_default();
        if table.contains_key(&key) {
            return Err(Error::DuplicateKey {
                collection: collection.name(),
                key,
            });
        }
        table.insert(key, item);
        Ok(())
    }

    async fn put(&self, collection: Collection, item: Value) -> Result<()> {
        let key = Self::key_of(collection, &item)?;
        let mut tables = self.lock();
        tables.entry(collection).or_default().insert(key, item);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let mut tables = self.lock();
        if let Some(table) = tables.get_mut(&collection) {
            table.remove(key);
        }
        Ok(())
    }
}
