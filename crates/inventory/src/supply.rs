use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrochain_core::{DomainError, DomainResult, Entity, SupplyId};

/// Stock floor rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPolicy {
    /// Allow adjustments that take stock below zero.
    pub allow_negative_stock: bool,
}

impl StockPolicy {
    pub fn allowing_negative() -> Self {
        Self {
            allow_negative_stock: true,
        }
    }
}

/// An inventory item. Names are unique ignoring case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supply {
    pub id: SupplyId,
    pub name: String,
    pub stock: f64,
    /// Incremented on every adjustment.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Supply {
    pub fn new(name: &str, stock: f64) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("supply name cannot be empty"));
        }
        if !stock.is_finite() || stock < 0.0 {
            return Err(DomainError::invalid_argument(
                "initial stock must be a finite, non-negative number",
            ));
        }
        Ok(Self {
            id: SupplyId::new(),
            name: name.to_string(),
            stock,
            version: 0,
            updated_at: Utc::now(),
        })
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    /// Consume `delta` units (`stock -= delta`; a negative delta restocks).
    ///
    /// Leaves the record untouched on error.
    pub fn adjust(&mut self, delta: f64, policy: StockPolicy) -> DomainResult<()> {
        if !delta.is_finite() {
            return Err(DomainError::invalid_argument("delta must be a finite number"));
        }
        if delta == 0.0 {
            return Err(DomainError::invalid_argument("delta cannot be zero"));
        }

        let stock = self.stock - delta;
        if !stock.is_finite() {
            return Err(DomainError::invalid_argument("adjustment overflows stock"));
        }
        if stock < 0.0 && !policy.allow_negative_stock {
            return Err(DomainError::invalid_argument(format!(
                "insufficient stock for {}: have {}, need {}",
                self.name, self.stock, delta
            )));
        }

        self.stock = stock;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Dedup key for the adjustment that produced this version.
    pub fn adjustment_key(&self) -> String {
        format!("{}:v{}", self.id, self.version)
    }
}

impl Entity for Supply {
    type Id = SupplyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
