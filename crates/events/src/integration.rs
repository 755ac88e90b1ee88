//! Integration events exchanged between the services.
//!
//! Payloads are flat JSON objects with camelCase field names.

use serde::{Deserialize, Serialize};

use agrochain_core::{HarvestId, InvoiceId};

use crate::event::Event;

/// A harvest was registered (harvest service → billing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuevaCosecha {
    pub harvest_id: HarvestId,
    pub product: String,
    pub tonnes: f64,
}

impl Event for NuevaCosecha {
    const TOPIC: &'static str = "nueva_cosecha";
}

impl NuevaCosecha {
    pub fn dedup_key(&self) -> String {
        format!("{}:REGISTERED", self.harvest_id)
    }
}

/// Stock of a supply item was adjusted (supply service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventarioAjustado {
    pub item: String,
    pub delta: f64,
}

impl Event for InventarioAjustado {
    const TOPIC: &'static str = "inventario_ajustado";
}

/// An invoice was issued for a harvest (billing → harvest service callback).
///
/// Delivered as `PUT /harvests/{harvestId}/status {invoiceId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosechaFacturada {
    pub harvest_id: HarvestId,
    pub invoice_id: InvoiceId,
}

impl Event for CosechaFacturada {
    const TOPIC: &'static str = "cosecha_facturada";
}

impl CosechaFacturada {
    pub fn dedup_key(&self) -> String {
        format!("{}:INVOICED", self.harvest_id)
    }
}
