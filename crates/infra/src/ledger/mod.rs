//! Ledger store implementations.
//!
//! The port itself (`LedgerStore`) lives in `agrochain-core`.

pub mod local;
mod snapshot;

pub use local::LocalLedgerStore;
