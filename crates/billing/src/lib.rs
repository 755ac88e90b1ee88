//! Billing: one invoice per harvest, priced from a product price table.
//!
//! Consumes `nueva_cosecha` and calls the harvest registry back with
//! `cosecha_facturada` once the invoice is stored. Replays of the same
//! harvest never produce a second invoice.

pub mod invoice;
pub mod price;
pub mod service;

pub use invoice::Invoice;
pub use price::PriceTable;
pub use service::{BillingOutcome, BillingService};
