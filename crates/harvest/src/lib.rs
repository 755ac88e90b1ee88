//! Harvest registry.
//!
//! Registers harvests against known farmers, announces them on the
//! `nueva_cosecha` topic, and records the invoice once billing calls back.

pub mod farmer;
pub mod harvest;
pub mod service;

pub use farmer::Farmer;
pub use harvest::{DuplicateInvoicePolicy, Harvest, HarvestStatus};
pub use service::{HarvestService, MarkInvoicedOutcome};
