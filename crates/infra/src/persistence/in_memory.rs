use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use keystone_core::AggregateKey;

use super::r#trait::{AggregateWrite, Database, PersistenceError, WriteKind};

/// In-memory durable store.
///
/// Intended for tests/dev. Every accepted `save` batch is appended to a
/// commit log so callers can assert what became durable and in which order.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    rows: RwLock<BTreeMap<AggregateKey, JsonValue>>,
    commit_log: Mutex<Vec<Vec<AggregateKey>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every accepted batch, oldest first.
    pub fn commit_log(&self) -> Vec<Vec<AggregateKey>> {
        self.commit_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &AggregateKey) -> bool {
        self.rows
            .read()
            .map(|rows| rows.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn load(&self, key: &AggregateKey) -> Result<Option<JsonValue>, PersistenceError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| PersistenceError::Backend("lock poisoned".to_string()))?;
        Ok(rows.get(key).cloned())
    }

    async fn load_all(&self, aggregate_type: &str) -> Result<Vec<JsonValue>, PersistenceError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| PersistenceError::Backend("lock poisoned".to_string()))?;
        Ok(rows
            .iter()
            .filter(|(key, _)| key.aggregate_type == aggregate_type)
            .map(|(_, state)| state.clone())
            .collect())
    }

    async fn save(&self, writes: Vec<AggregateWrite>) -> Result<(), PersistenceError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| PersistenceError::Backend("lock poisoned".to_string()))?;

        // Validate the whole batch before touching any row.
        let mut inserted: HashSet<&AggregateKey> = HashSet::new();
        for (idx, write) in writes.iter().enumerate() {
            let exists = rows.contains_key(&write.key) || inserted.contains(&write.key);
            match write.kind {
                WriteKind::Insert if exists => {
                    return Err(PersistenceError::Conflict(format!(
                        "{} already exists (index {idx})",
                        write.key
                    )));
                }
                WriteKind::Insert => {
                    inserted.insert(&write.key);
                }
                WriteKind::Update if !exists => {
                    return Err(PersistenceError::Conflict(format!(
                        "{} does not exist (index {idx})",
                        write.key
                    )));
                }
                WriteKind::Update => {}
            }
        }

        let keys: Vec<AggregateKey> = writes.iter().map(|w| w.key.clone()).collect();
        for write in writes {
            rows.insert(write.key, write.state);
        }

        self.commit_log
            .lock()
            .map_err(|_| PersistenceError::Backend("lock poisoned".to_string()))?
            .push(keys);

        Ok(())
    }
}
