//! Scope-wide change tracking with journaled savepoints.
//!
//! ## Model
//! - Every mutation (track, replace, status change on commit) is appended to
//!   a journal. A [`Savepoint`] remembers the journal length, so `rollback`
//!   undoes exactly the mutations made after it, including ones saved by
//!   nested commits.
//! - A commit turns pending entries into [`AggregateWrite`]s staged in the
//!   scope transaction. Only the outermost commit flushes that transaction to
//!   the [`Database`], as a single atomic batch.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use keystone_core::{AggregateKey, AggregateRoot, DomainEvent, key_of};

use super::r#trait::{
    AggregateWrite, CommitSummary, Database, DomainEventCollector, PendingAggregate,
    PersistenceError, Savepoint, UnitOfWork, WriteKind,
};
use crate::cancellation::CancellationToken;

/// Object-safe view of a tracked aggregate.
trait TrackedAggregate: Send + Sync {
    fn pending_events(&self) -> Vec<Arc<dyn DomainEvent>>;

    fn has_pending_events(&self) -> bool;

    fn clear_events(&mut self);

    fn snapshot(&self) -> Result<JsonValue, PersistenceError>;

    fn as_any_ref(&self) -> &dyn Any;

    fn clone_boxed(&self) -> Box<dyn TrackedAggregate>;
}

impl<A> TrackedAggregate for A
where
    A: AggregateRoot + Serialize,
{
    fn pending_events(&self) -> Vec<Arc<dyn DomainEvent>> {
        self.domain_events().snapshot()
    }

    fn has_pending_events(&self) -> bool {
        !self.domain_events().is_empty()
    }

    fn clear_events(&mut self) {
        self.domain_events_mut().clear();
    }

    fn snapshot(&self) -> Result<JsonValue, PersistenceError> {
        serde_json::to_value(self).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    fn as_any_ref(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn TrackedAggregate> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EntryStatus {
    /// New in this scope; saved as an insert.
    Added,
    /// Loaded and changed; saved as an update.
    Modified,
    /// Saved into the scope transaction; nothing pending.
    Unchanged,
}

struct TrackedEntry {
    key: AggregateKey,
    status: EntryStatus,
    aggregate: Box<dyn TrackedAggregate>,
}

impl Clone for TrackedEntry {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            aggregate: self.aggregate.clone_boxed(),
        }
    }
}

enum JournalRecord {
    /// A key started being tracked.
    Tracked(AggregateKey),
    /// A tracked entry was replaced; holds the previous entry.
    Replaced(TrackedEntry),
    /// A commit changed an entry's status.
    StatusChanged {
        key: AggregateKey,
        previous: EntryStatus,
    },
}

#[derive(Default)]
struct TrackerState {
    entries: Vec<TrackedEntry>,
    journal: Vec<JournalRecord>,
    staged: Vec<AggregateWrite>,
    open_units: usize,
    commits: usize,
}

impl TrackerState {
    fn position(&self, key: &AggregateKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    fn rewind(&mut self, savepoint: Savepoint) {
        while self.journal.len() > savepoint.journal_len {
            let Some(record) = self.journal.pop() else {
                break;
            };
            match record {
                JournalRecord::Tracked(key) => self.entries.retain(|e| e.key != key),
                JournalRecord::Replaced(previous) => {
                    if let Some(idx) = self.position(&previous.key) {
                        self.entries[idx] = previous;
                    }
                }
                JournalRecord::StatusChanged { key, previous } => {
                    if let Some(idx) = self.position(&key) {
                        self.entries[idx].status = previous;
                    }
                }
            }
        }
        self.staged.truncate(savepoint.staged_len);
    }
}

/// Change tracker shared by every dispatch of one request scope.
///
/// Implements both [`UnitOfWork`] and [`DomainEventCollector`]; handlers use
/// `add`/`find`/`update`/`modify`/`list` and never commit themselves.
pub struct ChangeTracker {
    database: Arc<dyn Database>,
    state: Mutex<TrackerState>,
}

impl core::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("ChangeTracker")
            .field("tracked", &state.entries.len())
            .field("staged", &state.staged.len())
            .field("open_units", &state.open_units)
            .field("commits", &state.commits)
            .finish()
    }
}

impl ChangeTracker {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a new aggregate; it is inserted on commit.
    pub fn add<A>(&self, aggregate: A) -> Result<(), PersistenceError>
    where
        A: AggregateRoot + Serialize,
    {
        let key = aggregate.key();
        let mut state = self.lock();
        if state.position(&key).is_some() {
            return Err(PersistenceError::Conflict(format!("{key} is already tracked")));
        }
        state.entries.push(TrackedEntry {
            key: key.clone(),
            status: EntryStatus::Added,
            aggregate: Box::new(aggregate),
        });
        state.journal.push(JournalRecord::Tracked(key));
        Ok(())
    }

    /// Find an aggregate, preferring the tracked copy over storage.
    pub async fn find<A>(&self, id: &A::Id) -> Result<Option<A>, PersistenceError>
    where
        A: AggregateRoot + DeserializeOwned,
    {
        let key = key_of::<A>(id);
        if let Some(tracked) = self.tracked::<A>(&key) {
            return Ok(Some(tracked));
        }

        match self.database.load(&key).await? {
            Some(state) => serde_json::from_value(state)
                .map(Some)
                .map_err(|e| PersistenceError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn tracked<A: AggregateRoot>(&self, key: &AggregateKey) -> Option<A> {
        let state = self.lock();
        state
            .entries
            .iter()
            .find(|e| &e.key == key)
            .and_then(|e| e.aggregate.as_any_ref().downcast_ref::<A>())
            .cloned()
    }

    /// Track a changed aggregate (usually one returned by `find`).
    ///
    /// Stamps `modified_at` unless the aggregate was added in this scope.
    pub fn update<A>(&self, mut aggregate: A)
    where
        A: AggregateRoot + Serialize,
    {
        let key = aggregate.key();
        let mut state = self.lock();
        match state.position(&key) {
            Some(idx) => {
                let status = match state.entries[idx].status {
                    EntryStatus::Added => EntryStatus::Added,
                    EntryStatus::Modified | EntryStatus::Unchanged => {
                        aggregate.audit_mut().mark_modified(Utc::now());
                        EntryStatus::Modified
                    }
                };
                let previous = std::mem::replace(
                    &mut state.entries[idx],
                    TrackedEntry {
                        key,
                        status,
                        aggregate: Box::new(aggregate),
                    },
                );
                state.journal.push(JournalRecord::Replaced(previous));
            }
            None => {
                aggregate.audit_mut().mark_modified(Utc::now());
                state.entries.push(TrackedEntry {
                    key: key.clone(),
                    status: EntryStatus::Modified,
                    aggregate: Box::new(aggregate),
                });
                state.journal.push(JournalRecord::Tracked(key));
            }
        }
    }

    /// Load, mutate and re-track an aggregate in one step.
    ///
    /// Returns `Ok(None)` when the aggregate does not exist.
    pub async fn modify<A, T, F>(&self, id: &A::Id, f: F) -> Result<Option<T>, PersistenceError>
    where
        A: AggregateRoot + Serialize + DeserializeOwned,
        F: FnOnce(&mut A) -> T + Send,
    {
        let Some(mut aggregate) = self.find::<A>(id).await? else {
            return Ok(None);
        };
        let out = f(&mut aggregate);
        self.update(aggregate);
        Ok(Some(out))
    }

    /// Every aggregate of type `A`: stored ones overlaid with tracked copies.
    pub async fn list<A>(&self) -> Result<Vec<A>, PersistenceError>
    where
        A: AggregateRoot + DeserializeOwned,
    {
        let stored = self.database.load_all(A::AGGREGATE_TYPE).await?;
        let mut aggregates = stored
            .into_iter()
            .map(serde_json::from_value::<A>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let state = self.lock();
        for tracked in state
            .entries
            .iter()
            .filter_map(|e| e.aggregate.as_any_ref().downcast_ref::<A>())
        {
            let key = tracked.key();
            match aggregates.iter_mut().find(|a| a.key() == key) {
                Some(slot) => *slot = tracked.clone(),
                None => aggregates.push(tracked.clone()),
            }
        }
        Ok(aggregates)
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        let state = self.lock();
        !state.staged.is_empty()
            || state
                .entries
                .iter()
                .any(|e| e.status != EntryStatus::Unchanged)
    }

    /// Units of work currently open in this scope.
    pub fn open_units(&self) -> usize {
        self.lock().open_units
    }

    /// Successful `commit` calls so far, nested ones included.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }
}

/// Merge staged writes per key: the first kind wins, the latest state wins.
fn coalesce(staged: &[AggregateWrite]) -> Vec<AggregateWrite> {
    let mut merged: Vec<AggregateWrite> = Vec::with_capacity(staged.len());
    for write in staged {
        match merged.iter_mut().find(|w| w.key == write.key) {
            Some(existing) => existing.state = write.state.clone(),
            None => merged.push(write.clone()),
        }
    }
    merged
}

#[async_trait]
impl UnitOfWork for ChangeTracker {
    fn begin(&self) -> Savepoint {
        let mut state = self.lock();
        let savepoint = Savepoint {
            journal_len: state.journal.len(),
            staged_len: state.staged.len(),
            depth: state.open_units,
        };
        state.open_units += 1;
        savepoint
    }

    async fn commit(
        &self,
        savepoint: Savepoint,
        cancellation: &CancellationToken,
    ) -> Result<CommitSummary, PersistenceError> {
        if cancellation.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }

        let (saved, batch) = {
            let mut state = self.lock();

            let undrained: Vec<String> = state
                .entries
                .iter()
                .filter(|e| e.aggregate.has_pending_events())
                .map(|e| e.key.to_string())
                .collect();
            if !undrained.is_empty() {
                drop(state);
                panic!(
                    "unit of work committed while aggregates still hold undrained domain events: {}",
                    undrained.join(", ")
                );
            }

            // Snapshot first so a serialization error leaves the state untouched.
            let mut writes = Vec::new();
            for (idx, entry) in state.entries.iter().enumerate() {
                let kind = match entry.status {
                    EntryStatus::Added => WriteKind::Insert,
                    EntryStatus::Modified => WriteKind::Update,
                    EntryStatus::Unchanged => continue,
                };
                writes.push((idx, kind, entry.aggregate.snapshot()?));
            }

            let TrackerState {
                entries,
                journal,
                staged,
                commits,
                ..
            } = &mut *state;
            let saved = writes.len();
            for (idx, kind, snapshot) in writes {
                let entry = &mut entries[idx];
                journal.push(JournalRecord::StatusChanged {
                    key: entry.key.clone(),
                    previous: entry.status,
                });
                entry.status = EntryStatus::Unchanged;
                staged.push(AggregateWrite {
                    key: entry.key.clone(),
                    kind,
                    state: snapshot,
                });
            }
            *commits += 1;

            let batch = savepoint.is_outermost().then(|| coalesce(staged));
            (saved, batch)
        };

        let mut summary = CommitSummary {
            saved,
            persisted: 0,
            durable: false,
        };

        if let Some(batch) = batch {
            summary.persisted = batch.len();
            summary.durable = true;
            if !batch.is_empty() {
                self.database.save(batch).await?;
            }
            let mut state = self.lock();
            state.staged.clear();
            state.journal.clear();
        }

        self.lock().open_units = savepoint.depth;
        Ok(summary)
    }

    fn rollback(&self, savepoint: Savepoint) {
        let mut state = self.lock();
        state.rewind(savepoint);
        state.open_units = savepoint.depth;
    }
}

impl DomainEventCollector for ChangeTracker {
    fn aggregates_with_pending_events(&self) -> Vec<PendingAggregate> {
        let state = self.lock();
        state
            .entries
            .iter()
            .filter(|e| e.aggregate.has_pending_events())
            .map(|e| PendingAggregate {
                key: e.key.clone(),
                events: e.aggregate.pending_events(),
            })
            .collect()
    }

    fn clear_domain_events(&self, key: &AggregateKey) {
        let mut state = self.lock();
        if let Some(idx) = state.position(key) {
            state.entries[idx].aggregate.clear_events();
        }
    }
}
