use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrochain_core::{DomainError, DomainResult, Entity, FarmerId, HarvestId, InvoiceId, Tonnes};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestStatus {
    Registered,
    Invoiced,
}

/// What to do when billing reports a second, different invoice for a harvest.
///
/// The stored invoice reference never changes either way.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateInvoicePolicy {
    /// Keep the first invoice and report no change.
    #[default]
    Ignore,
    /// Refuse with `Conflict`.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Harvest {
    pub id: HarvestId,
    pub farmer_id: FarmerId,
    pub product: String,
    pub tonnes: Tonnes,
    pub status: HarvestStatus,
    pub invoice_id: Option<InvoiceId>,
    pub created_at: DateTime<Utc>,
    pub invoiced_at: Option<DateTime<Utc>>,
}

impl Harvest {
    /// A freshly registered harvest. Validates the product name.
    pub fn register(farmer_id: FarmerId, product: &str, tonnes: Tonnes) -> DomainResult<Self> {
        let product = product.trim();
        if product.is_empty() {
            return Err(DomainError::invalid_argument("product cannot be empty"));
        }
        Ok(Self {
            id: HarvestId::new(),
            farmer_id,
            product: product.to_string(),
            tonnes,
            status: HarvestStatus::Registered,
            invoice_id: None,
            created_at: Utc::now(),
            invoiced_at: None,
        })
    }

    /// REGISTERED -> INVOICED. Returns whether anything changed.
    ///
    /// The transition is one-way and the invoice reference is written once.
    pub fn mark_invoiced(
        &mut self,
        invoice_id: InvoiceId,
        policy: DuplicateInvoicePolicy,
    ) -> DomainResult<bool> {
        match (self.status, self.invoice_id) {
            (HarvestStatus::Registered, _) => {
                self.status = HarvestStatus::Invoiced;
                self.invoice_id = Some(invoice_id);
                self.invoiced_at = Some(Utc::now());
                Ok(true)
            }
            (HarvestStatus::Invoiced, Some(current)) if current == invoice_id => Ok(false),
            (HarvestStatus::Invoiced, current) => match policy {
                DuplicateInvoicePolicy::Ignore => Ok(false),
                DuplicateInvoicePolicy::Conflict => Err(DomainError::conflict(format!(
                    "harvest {} already invoiced by {}",
                    self.id,
                    current.map(|id| id.to_string()).unwrap_or_default()
                ))),
            },
        }
    }
}

impl Entity for Harvest {
    type Id = HarvestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
