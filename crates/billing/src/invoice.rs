use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrochain_core::{DomainError, DomainResult, Entity, HarvestId, InvoiceId, Tonnes};

use crate::price::PriceTable;

/// Invoice for a single harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub harvest_id: HarvestId,
    pub product: String,
    pub tonnes: Tonnes,
    pub unit_price: f64,
    pub amount: f64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Price a harvest. Unpaid on creation.
    pub fn issue(
        harvest_id: HarvestId,
        product: &str,
        tonnes: f64,
        prices: &PriceTable,
    ) -> DomainResult<Self> {
        let product = product.trim();
        if product.is_empty() {
            return Err(DomainError::invalid_argument("product cannot be empty"));
        }
        let tonnes = Tonnes::new(tonnes)?;
        let (unit_price, amount) = prices.quote(product, tonnes)?;

        Ok(Self {
            id: InvoiceId::new(),
            harvest_id,
            product: product.to_string(),
            tonnes,
            unit_price,
            amount,
            paid: false,
            created_at: Utc::now(),
            paid_at: None,
        })
    }

    /// Settle the invoice. Returns false if it was already paid.
    pub fn mark_paid(&mut self) -> bool {
        if self.paid {
            return false;
        }
        self.paid = true;
        self.paid_at = Some(Utc::now());
        true
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_prices_the_harvest() {
        let invoice = Invoice::issue(HarvestId::new(), "Arroz Oro", 2.0, &PriceTable::default()).unwrap();

        assert_eq!(invoice.unit_price, 120.0);
        assert_eq!(invoice.amount, 240.0);
        assert!(!invoice.paid);
        assert!(invoice.paid_at.is_none());
    }

    #[test]
    fn issue_rejects_bad_input() {
        let prices = PriceTable::default();
        assert!(matches!(
            Invoice::issue(HarvestId::new(), "Maiz", 0.0, &prices),
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(matches!(
            Invoice::issue(HarvestId::new(), "", 1.0, &prices),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn issue_rejects_amounts_that_do_not_fit() {
        let result = Invoice::issue(HarvestId::new(), "Café Premium", 1e307, &PriceTable::default());
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn issued_invoices_round_trip_through_json() {
        let invoice = Invoice::issue(HarvestId::new(), "Café Premium", 12.5, &PriceTable::default()).unwrap();
        let json = serde_json::to_string(&invoice).unwrap();
        let back: Invoice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, invoice);
    }

    #[test]
    fn mark_paid_sets_paid_at_once() {
        let mut invoice = Invoice::issue(HarvestId::new(), "Maiz", 3.0, &PriceTable::default()).unwrap();

        assert!(invoice.mark_paid());
        let paid_at = invoice.paid_at;
        assert!(paid_at.is_some());

        assert!(!invoice.mark_paid());
        assert_eq!(invoice.paid_at, paid_at);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let invoice = Invoice::issue(HarvestId::new(), "Maiz", 3.0, &PriceTable::default()).unwrap();
        let json = serde_json::to_value(&invoice).unwrap();

        assert_eq!(json["unitPrice"], 100.0);
        assert_eq!(json["amount"], 300.0);
        assert_eq!(json["tonnes"], 3.0);
        assert_eq!(json["harvestId"], invoice.harvest_id.to_string());
    }
}
