//! Request/response bodies. Ids arrive as strings so a malformed id yields
//! the JSON `invalid_id` error instead of a body rejection.

use serde::{Deserialize, Serialize};

use agrochain_billing::{BillingOutcome, Invoice};
use agrochain_harvest::MarkInvoicedOutcome;
use agrochain_inventory::Supply;
use agrochain_infra::{EmitterStats, WorkerStats};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHarvestRequest {
    pub farmer_id: String,
    pub product: String,
    pub tonnes: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkInvoicedRequest {
    pub invoice_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListHarvestsQuery {
    /// `REGISTERED` or `INVOICED`.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestStatusResponse {
    pub harvest_id: String,
    pub status: agrochain_harvest::HarvestStatus,
    pub invoice_id: Option<String>,
    pub changed: bool,
}

impl From<MarkInvoicedOutcome> for HarvestStatusResponse {
    fn from(outcome: MarkInvoicedOutcome) -> Self {
        Self {
            harvest_id: outcome.harvest.id.to_string(),
            status: outcome.harvest.status,
            invoice_id: outcome.harvest.invoice_id.map(|id| id.to_string()),
            changed: outcome.changed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplyRequest {
    pub item: String,
    #[serde(default)]
    pub stock: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub item: String,
    pub stock: f64,
}

impl From<Supply> for StockResponse {
    fn from(supply: Supply) -> Self {
        Self {
            item: supply.name,
            stock: supply.stock,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuevaCosechaRequest {
    pub harvest_id: String,
    pub product: String,
    pub tonnes: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesQuery {
    pub harvest_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingResponse {
    pub created: bool,
    pub invoice: Invoice,
}

impl From<BillingOutcome> for BillingResponse {
    fn from(outcome: BillingOutcome) -> Self {
        let created = outcome.is_created();
        let invoice = match outcome {
            BillingOutcome::Created(invoice) | BillingOutcome::Duplicate(invoice) => invoice,
        };
        Self { created, invoice }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitterStatsEntry {
    pub emitter: EmitterStats,
    pub worker: Option<WorkerStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatsResponse {
    pub emitters: Vec<EmitterStatsEntry>,
}
