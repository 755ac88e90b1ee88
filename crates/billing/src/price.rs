use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use agrochain_core::{DomainError, DomainResult, Tonnes};

/// Unit prices per product, with a fallback for unlisted products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTable {
    prices: BTreeMap<String, f64>,
    default_price: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            prices: BTreeMap::from([
                ("Arroz Oro".to_string(), 120.0),
                ("Café Premium".to_string(), 300.0),
            ]),
            default_price: 100.0,
        }
    }
}

fn check_price(what: &str, price: f64) -> DomainResult<()> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(DomainError::invalid_argument(format!(
            "price for {what} must be a finite, non-negative number"
        )))
    }
}

impl PriceTable {
    pub fn new(
        prices: impl IntoIterator<Item = (String, f64)>,
        default_price: f64,
    ) -> DomainResult<Self> {
        check_price("unlisted products", default_price)?;
        let prices: BTreeMap<String, f64> = prices.into_iter().collect();
        for (product, price) in &prices {
            check_price(product, *price)?;
        }
        Ok(Self {
            prices,
            default_price,
        })
    }

    /// Re-check a table that did not go through [`PriceTable::new`] (e.g. deserialized).
    pub fn validate(&self) -> DomainResult<()> {
        check_price("unlisted products", self.default_price)?;
        self.prices
            .iter()
            .try_for_each(|(product, price)| check_price(product, *price))
    }

    pub fn default_price(&self) -> f64 {
        self.default_price
    }

    pub fn prices(&self) -> &BTreeMap<String, f64> {
        &self.prices
    }

    /// Listed price of `product`, or the default price.
    pub fn unit_price(&self, product: &str) -> f64 {
        self.prices
            .get(product.trim())
            .copied()
            .unwrap_or(self.default_price)
    }

    /// `(unit price, amount)` for a quantity of a product.
    ///
    /// `InvalidArgument` when the amount is not representable.
    pub fn quote(&self, product: &str, tonnes: Tonnes) -> DomainResult<(f64, f64)> {
        let unit_price = self.unit_price(product);
        let amount = tonnes.value() * unit_price;
        if !amount.is_finite() {
            return Err(DomainError::invalid_argument(format!(
                "amount for {} tonnes of {} overflows",
                tonnes.value(),
                product.trim()
            )));
        }
        Ok((unit_price, amount))
    }
}
