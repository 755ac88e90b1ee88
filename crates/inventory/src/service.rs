use tracing::info;

use agrochain_core::{DomainError, DomainResult, Insert, LedgerStore};
use agrochain_events::{EmitEvent, EventEmitter, InventarioAjustado};

use crate::supply::{StockPolicy, Supply};

pub struct SupplyService<S, E> {
    supplies: S,
    emitter: E,
    policy: StockPolicy,
}

impl<S, E> SupplyService<S, E>
where
    S: LedgerStore<Supply>,
    E: EventEmitter,
{
    pub fn new(supplies: S, emitter: E) -> Self {
        Self {
            supplies,
            emitter,
            policy: StockPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    /// Add a supply item. `Conflict` if the name is taken (ignoring case).
    pub fn create(&self, name: &str, initial_stock: f64) -> DomainResult<Supply> {
        let supply = Supply::new(name, initial_stock)?;
        let same_name = |existing: &Supply, new: &Supply| existing.is_named(&new.name);

        match self.supplies.create_unique(supply.clone(), &same_name)? {
            Insert::Created(id) => {
                info!(supply_id = %id, item = %supply.name, stock = supply.stock, "supply created");
                Ok(supply)
            }
            Insert::Existing(existing) => Err(DomainError::conflict(format!(
                "supply {} already exists",
                existing.name
            ))),
        }
    }

    /// Consume `delta` units of the named item, then announce the adjustment.
    pub fn adjust_stock(&self, item: &str, delta: f64) -> DomainResult<Supply> {
        let current = self.find(item)?;

        let policy = self.policy;
        let updated = self
            .supplies
            .modify(&current.id, &mut |s: &mut Supply| s.adjust(delta, policy))?;

        let event = InventarioAjustado {
            item: updated.name.clone(),
            delta,
        };
        self.emitter.emit_event(&updated.adjustment_key(), &event);
        info!(
            item = %updated.name,
            delta,
            stock = updated.stock,
            version = updated.version,
            "stock adjusted"
        );
        Ok(updated)
    }

    pub fn get(&self, item: &str) -> DomainResult<Supply> {
        self.find(item)
    }

    pub fn list(&self) -> DomainResult<Vec<Supply>> {
        self.supplies.find_all()
    }

    fn find(&self, item: &str) -> DomainResult<Supply> {
        self.supplies
            .find_first(&|s: &Supply| s.is_named(item))?
            .ok_or_else(|| DomainError::not_found(format!("supply {}", item.trim())))
    }
}
