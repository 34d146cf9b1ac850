//! Test snapshot stores: `SnapshotStore` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use exhorse_core::error::DomainError;
use exhorse_core::repository::{SaveOutcome, Snapshot, SnapshotStore};

/// A snapshot store held in memory, applying the same watermark comparison
/// as the production store. Counts accepted writes.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<(String, String), Snapshot>>,
    corrupt: Mutex<Option<(String, String)>>,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored snapshot without going through the trait.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stored(&self, aggregate_name: &str, read_model: &str) -> Option<Snapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(&(aggregate_name.to_owned(), read_model.to_owned()))
            .cloned()
    }

    /// Makes the next `load` of this projection report a corrupt record.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn corrupt(&self, aggregate_name: &str, read_model: &str) {
        *self.corrupt.lock().unwrap() = Some((aggregate_name.to_owned(), read_model.to_owned()));
    }

    /// Number of snapshots written so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        let key = (aggregate_name.to_owned(), read_model.to_owned());
        let mut corrupt = self.corrupt.lock().unwrap();
        if corrupt.as_ref() == Some(&key) {
            *corrupt = None;
            return Err(DomainError::CorruptSnapshot(format!(
                "{aggregate_name}/{read_model}: invalid state"
            )));
        }
        Ok(self.snapshots.lock().unwrap().get(&key).cloned())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<SaveOutcome, DomainError> {
        let key = (snapshot.aggregate_name.clone(), snapshot.read_model.clone());
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots
            .get(&key)
            .is_some_and(|stored| !snapshot.is_ahead_of(stored))
        {
            return Ok(SaveOutcome::Stale);
        }
        snapshots.insert(key, snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(SaveOutcome::Stored)
    }

    async fn delete(&self, aggregate_name: &str, read_model: &str) -> Result<(), DomainError> {
        self.snapshots
            .lock()
            .unwrap()
            .remove(&(aggregate_name.to_owned(), read_model.to_owned()));
        Ok(())
    }
}

/// A snapshot store whose writes always fail. Reads find nothing.
#[derive(Debug)]
pub struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(
        &self,
        _aggregate_name: &str,
        _read_model: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: &Snapshot) -> Result<SaveOutcome, DomainError> {
        Err(DomainError::Storage("disk full".into()))
    }

    async fn delete(&self, _aggregate_name: &str, _read_model: &str) -> Result<(), DomainError> {
        Err(DomainError::Storage("disk full".into()))
    }
}
