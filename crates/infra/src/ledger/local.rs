use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use agrochain_core::{DomainError, DomainResult, Entity, Insert, LedgerStore};

use super::snapshot::SnapshotFile;

/// Process-local ledger store.
///
/// Records live in an ordered map behind a `RwLock`; every mutation runs
/// entirely under the write lock, which makes each operation atomic at the
/// single-record level.
///
/// When opened with a snapshot file, the whole table is rewritten to disk
/// before a mutating call returns. A failed snapshot write restores the
/// previous in-memory value and surfaces `Storage`, so callers never notify
/// about a change that was not persisted.
#[derive(Debug)]
pub struct LocalLedgerStore<R: Entity> {
    name: &'static str,
    records: RwLock<BTreeMap<R::Id, R>>,
    snapshot: Option<SnapshotFile>,
}

impl<R> LocalLedgerStore<R>
where
    R: Entity + Clone + Serialize + DeserializeOwned + Send + Sync,
    R::Id: Send + Sync,
{
    /// Volatile store. `name` is the record kind used in error messages.
    pub fn in_memory(name: &'static str) -> Self {
        Self {
            name,
            records: RwLock::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// Store backed by a JSON snapshot file, loading existing records.
    pub fn open(name: &'static str, path: impl Into<PathBuf>) -> DomainResult<Self> {
        let snapshot = SnapshotFile::new(path);
        let loaded: Vec<R> = snapshot.load().map_err(|e| {
            DomainError::storage(format!(
                "failed to load {name} snapshot {}: {e}",
                snapshot.path().display()
            ))
        })?;
        debug!(store = name, records = loaded.len(), path = %snapshot.path().display(), "ledger snapshot loaded");

        let records = loaded.into_iter().map(|r| (*r.id(), r)).collect();
        Ok(Self {
            name,
            records: RwLock::new(records),
            snapshot: Some(snapshot),
        })
    }

    /// Seed records, skipping ids that already exist.
    pub fn seed(&self, records: impl IntoIterator<Item = R>) -> DomainResult<usize> {
        let mut inserted = 0;
        for record in records {
            match self.create(record) {
                Ok(_) => inserted += 1,
                Err(DomainError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(inserted)
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, BTreeMap<R::Id, R>>> {
        self.records
            .read()
            .map_err(|_| DomainError::storage(format!("{} store lock poisoned", self.name)))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, BTreeMap<R::Id, R>>> {
        self.records
            .write()
            .map_err(|_| DomainError::storage(format!("{} store lock poisoned", self.name)))
    }

    /// Persist the table; on failure put `previous` back for `id`.
    fn commit(
        &self,
        map: &mut BTreeMap<R::Id, R>,
        id: R::Id,
        previous: Option<R>,
    ) -> DomainResult<()> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        if let Err(e) = snapshot.write(map.values()) {
            match previous {
                Some(prev) => {
                    map.insert(id, prev);
                }
                None => {
                    map.remove(&id);
                }
            }
            return Err(DomainError::storage(format!(
                "failed to persist {} snapshot: {e}",
                self.name
            )));
        }
        Ok(())
    }

    fn missing(&self, id: &R::Id) -> DomainError {
        DomainError::not_found(format!("{} {id}", self.name))
    }
}

impl<R> LedgerStore<R> for LocalLedgerStore<R>
where
    R: Entity + Clone + Serialize + DeserializeOwned + Send + Sync,
    R::Id: Send + Sync,
{
    fn create(&self, record: R) -> DomainResult<R::Id> {
        let id = *record.id();
        let mut map = self.write()?;
        if map.contains_key(&id) {
            return Err(DomainError::conflict(format!("{} {id} already exists", self.name)));
        }
        map.insert(id, record);
        self.commit(&mut map, id, None)?;
        Ok(id)
    }

    fn find_by_id(&self, id: &R::Id) -> DomainResult<R> {
        self.read()?.get(id).cloned().ok_or_else(|| self.missing(id))
    }

    fn update(&self, record: R) -> DomainResult<()> {
        let id = *record.id();
        let mut map = self.write()?;
        if !map.contains_key(&id) {
            return Err(self.missing(&id));
        }
        let previous = map.insert(id, record);
        self.commit(&mut map, id, previous)
    }

    fn find_all(&self) -> DomainResult<Vec<R>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn find_first(&self, predicate: &dyn Fn(&R) -> bool) -> DomainResult<Option<R>> {
        Ok(self.read()?.values().find(|r| predicate(r)).cloned())
    }

    fn modify(
        &self,
        id: &R::Id,
        change: &mut dyn FnMut(&mut R) -> DomainResult<()>,
    ) -> DomainResult<R> {
        let mut map = self.write()?;
        let mut record = map.get(id).cloned().ok_or_else(|| self.missing(id))?;
        change(&mut record)?;

        let previous = map.insert(*id, record.clone());
        self.commit(&mut map, *id, previous)?;
        Ok(record)
    }

    fn create_unique(
        &self,
        record: R,
        conflicts_with: &dyn Fn(&R, &R) -> bool,
    ) -> DomainResult<Insert<R>> {
        let id = *record.id();
        let mut map = self.write()?;
        if let Some(existing) = map.values().find(|existing| conflicts_with(existing, &record)) {
            return Ok(Insert::Existing(existing.clone()));
        }
        if map.contains_key(&id) {
            return Err(DomainError::conflict(format!("{} {id} already exists", self.name)));
        }
        map.insert(id, record);
        self.commit(&mut map, id, None)?;
        Ok(Insert::Created(id))
    }
}
