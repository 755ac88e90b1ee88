//! Ledger store port: per-service record storage.
//!
//! Each service owns its own store instance; there are no cross-service
//! transactions. Implementations must make every operation atomic at the
//! single-record level, and a mutating call must only return once the write is
//! durable for that implementation, so callers can notify other services
//! strictly after the write (write-then-notify).

use std::sync::Arc;

use crate::entity::Entity;
use crate::error::DomainResult;

/// Outcome of [`LedgerStore::create_unique`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<R: Entity> {
    /// The record was inserted.
    Created(R::Id),
    /// A conflicting record already existed; nothing was written.
    Existing(R),
}

impl<R: Entity> Insert<R> {
    pub fn is_created(&self) -> bool {
        matches!(self, Insert::Created(_))
    }
}

/// Durable record storage for a single entity type.
pub trait LedgerStore<R: Entity>: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the id is already taken.
    fn create(&self, record: R) -> DomainResult<R::Id>;

    /// Fetch a record, failing with `NotFound` if absent.
    fn find_by_id(&self, id: &R::Id) -> DomainResult<R>;

    /// Replace an existing record. Fails with `NotFound` if absent.
    fn update(&self, record: R) -> DomainResult<()>;

    /// All records, ordered by id.
    fn find_all(&self) -> DomainResult<Vec<R>>;

    /// First record (in id order) matching `predicate`.
    fn find_first(&self, predicate: &dyn Fn(&R) -> bool) -> DomainResult<Option<R>>;

    /// Atomic read-modify-write of one record.
    ///
    /// `change` runs under the store's write lock on a copy of the record; the
    /// copy is written back only if `change` succeeds. Returns the stored value.
    fn modify(
        &self,
        id: &R::Id,
        change: &mut dyn FnMut(&mut R) -> DomainResult<()>,
    ) -> DomainResult<R>;

    /// Atomic check-then-insert on a secondary key.
    ///
    /// If any stored record satisfies `conflicts_with(existing, &record)` that
    /// record is returned and nothing is written.
    fn create_unique(
        &self,
        record: R,
        conflicts_with: &dyn Fn(&R, &R) -> bool,
    ) -> DomainResult<Insert<R>>;
}

impl<R, S> LedgerStore<R> for Arc<S>
where
    R: Entity,
    S: LedgerStore<R> + ?Sized,
{
    fn create(&self, record: R) -> DomainResult<R::Id> {
        (**self).create(record)
    }

    fn find_by_id(&self, id: &R::Id) -> DomainResult<R> {
        (**self).find_by_id(id)
    }

    fn update(&self, record: R) -> DomainResult<()> {
        (**self).update(record)
    }

    fn find_all(&self) -> DomainResult<Vec<R>> {
        (**self).find_all()
    }

    fn find_first(&self, predicate: &dyn Fn(&R) -> bool) -> DomainResult<Option<R>> {
        (**self).find_first(predicate)
    }

    fn modify(
        &self,
        id: &R::Id,
        change: &mut dyn FnMut(&mut R) -> DomainResult<()>,
    ) -> DomainResult<R> {
        (**self).modify(id, change)
    }

    fn create_unique(
        &self,
        record: R,
        conflicts_with: &dyn Fn(&R, &R) -> bool,
    ) -> DomainResult<Insert<R>> {
        (**self).create_unique(record, conflicts_with)
    }
}
