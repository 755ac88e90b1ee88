//! `agrochain-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the harvest,
//! supply and billing services (no infrastructure concerns). The only
//! abstraction over storage here is the [`LedgerStore`] port; implementations
//! live in `agrochain-infra`.

pub mod entity;
pub mod error;
pub mod id;
pub mod store;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{FarmerId, HarvestId, InvoiceId, SupplyId};
pub use store::{Insert, LedgerStore};
pub use value_object::{Tonnes, ValueObject};
