//! Harvest use cases: persist first, then notify.

use tracing::{info, warn};

use agrochain_core::{DomainResult, FarmerId, HarvestId, InvoiceId, LedgerStore, Tonnes};
use agrochain_events::{DeliveryResult, EmitEvent, EventEmitter, NuevaCosecha};

use crate::farmer::Farmer;
use crate::harvest::{DuplicateInvoicePolicy, Harvest, HarvestStatus};

/// Result of applying a billing callback.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkInvoicedOutcome {
    pub harvest: Harvest,
    /// False when the harvest was already invoiced.
    pub changed: bool,
}

pub struct HarvestService<H, F, E> {
    harvests: H,
    farmers: F,
    emitter: E,
    policy: DuplicateInvoicePolicy,
}

impl<H, F, E> HarvestService<H, F, E>
where
    H: LedgerStore<Harvest>,
    F: LedgerStore<Farmer>,
    E: EventEmitter,
{
    pub fn new(harvests: H, farmers: F, emitter: E) -> Self {
        Self {
            harvests,
            farmers,
            emitter,
            policy: DuplicateInvoicePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicateInvoicePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a harvest for a known farmer and announce it.
    ///
    /// Fails with `NotFound` for an unknown farmer and `InvalidArgument` for
    /// a blank product or a non-positive quantity; nothing is stored or
    /// emitted in either case.
    pub fn register(&self, farmer_id: FarmerId, product: &str, tonnes: f64) -> DomainResult<HarvestId> {
        let farmer = self.farmers.find_by_id(&farmer_id)?;
        let harvest = Harvest::register(farmer.id, product, Tonnes::new(tonnes)?)?;

        let event = NuevaCosecha {
            harvest_id: harvest.id,
            product: harvest.product.clone(),
            tonnes: harvest.tonnes.value(),
        };
        let id = self.harvests.create(harvest)?;

        let delivery = self.emitter.emit_event(&event.dedup_key(), &event);
        info!(
            harvest_id = %id,
            farmer = %farmer.name,
            product = %event.product,
            tonnes = event.tonnes,
            delivery = delivery_label(&delivery),
            "harvest registered"
        );
        Ok(id)
    }

    /// Apply the billing callback. Idempotent.
    pub fn mark_invoiced(
        &self,
        harvest_id: HarvestId,
        invoice_id: InvoiceId,
    ) -> DomainResult<MarkInvoicedOutcome> {
        let policy = self.policy;
        let mut changed = false;
        let harvest = self.harvests.modify(&harvest_id, &mut |h: &mut Harvest| {
            changed = h.mark_invoiced(invoice_id, policy)?;
            Ok(())
        })?;

        if changed {
            info!(%harvest_id, %invoice_id, "harvest invoiced");
        } else if harvest.invoice_id != Some(invoice_id) {
            warn!(
                %harvest_id,
                %invoice_id,
                current = ?harvest.invoice_id,
                "ignoring second invoice for harvest"
            );
        }

        Ok(MarkInvoicedOutcome { harvest, changed })
    }

    pub fn get(&self, harvest_id: HarvestId) -> DomainResult<Harvest> {
        self.harvests.find_by_id(&harvest_id)
    }

    pub fn list(&self) -> DomainResult<Vec<Harvest>> {
        self.harvests.find_all()
    }

    pub fn list_by_status(&self, status: HarvestStatus) -> DomainResult<Vec<Harvest>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|h| h.status == status)
            .collect())
    }

    pub fn farmer(&self, farmer_id: FarmerId) -> DomainResult<Farmer> {
        self.farmers.find_by_id(&farmer_id)
    }
}

fn delivery_label(result: &DeliveryResult) -> &'static str {
    match result {
        DeliveryResult::Delivered { .. } => "delivered",
        DeliveryResult::Queued { .. } => "queued",
        DeliveryResult::DeadLettered { .. } => "dead_lettered",
        DeliveryResult::Rejected { .. } => "rejected",
    }
}
