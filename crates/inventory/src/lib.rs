//! Supply (inventory) tracking.
//!
//! Stock adjustments are single atomic read-modify-writes on the supply's
//! record, announced afterwards on the `inventario_ajustado` topic.

pub mod service;
pub mod supply;

pub use service::SupplyService;
pub use supply::{StockPolicy, Supply};
