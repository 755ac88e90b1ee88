use tracing::{debug, info};

use agrochain_core::{DomainError, DomainResult, HarvestId, Insert, InvoiceId, LedgerStore};
use agrochain_events::{CosechaFacturada, EmitEvent, EventEmitter, JsonEnvelope, NuevaCosecha};

use crate::invoice::Invoice;
use crate::price::PriceTable;

/// What handling a `nueva_cosecha` event did.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingOutcome {
    /// A new invoice was stored.
    Created(Invoice),
    /// The harvest was already invoiced; this is the existing invoice.
    Duplicate(Invoice),
}

impl BillingOutcome {
    pub fn invoice(&self) -> &Invoice {
        match self {
            BillingOutcome::Created(invoice) | BillingOutcome::Duplicate(invoice) => invoice,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, BillingOutcome::Created(_))
    }
}

pub struct BillingService<I, E> {
    invoices: I,
    emitter: E,
    prices: PriceTable,
}

impl<I, E> BillingService<I, E>
where
    I: LedgerStore<Invoice>,
    E: EventEmitter,
{
    pub fn new(invoices: I, emitter: E, prices: PriceTable) -> Self {
        Self {
            invoices,
            emitter,
            prices,
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Invoice a newly registered harvest and call the registry back.
    ///
    /// Safe to replay: the invoice is deduplicated on the harvest id, and a
    /// replay re-sends the callback with the existing invoice id.
    pub fn handle_new_harvest(&self, event: &NuevaCosecha) -> DomainResult<BillingOutcome> {
        let invoice = Invoice::issue(event.harvest_id, &event.product, event.tonnes, &self.prices)?;
        let same_harvest = |existing: &Invoice, new: &Invoice| existing.harvest_id == new.harvest_id;

        let outcome = match self.invoices.create_unique(invoice.clone(), &same_harvest)? {
            Insert::Created(_) => {
                info!(
                    invoice_id = %invoice.id,
                    harvest_id = %invoice.harvest_id,
                    product = %invoice.product,
                    unit_price = invoice.unit_price,
                    amount = invoice.amount,
                    "invoice created"
                );
                BillingOutcome::Created(invoice)
            }
            Insert::Existing(existing) => {
                debug!(
                    invoice_id = %existing.id,
                    harvest_id = %existing.harvest_id,
                    "harvest already invoiced"
                );
                BillingOutcome::Duplicate(existing)
            }
        };

        let callback = CosechaFacturada {
            harvest_id: outcome.invoice().harvest_id,
            invoice_id: outcome.invoice().id,
        };
        self.emitter.emit_event(&callback.dedup_key(), &callback);

        Ok(outcome)
    }

    /// Bus entry point: handles `nueva_cosecha` envelopes, skips other topics.
    pub fn handle_envelope(&self, envelope: &JsonEnvelope) -> DomainResult<Option<BillingOutcome>> {
        match envelope.decode::<NuevaCosecha>() {
            None => Ok(None),
            Some(Ok(event)) => self.handle_new_harvest(&event).map(Some),
            Some(Err(e)) => Err(DomainError::invalid_argument(format!(
                "malformed {} payload: {e}",
                envelope.topic()
            ))),
        }
    }

    pub fn get(&self, invoice_id: InvoiceId) -> DomainResult<Invoice> {
        self.invoices.find_by_id(&invoice_id)
    }

    pub fn list(&self) -> DomainResult<Vec<Invoice>> {
        self.invoices.find_all()
    }

    pub fn find_by_harvest(&self, harvest_id: HarvestId) -> DomainResult<Option<Invoice>> {
        self.invoices
            .find_first(&|invoice: &Invoice| invoice.harvest_id == harvest_id)
    }

    /// Settle an invoice. Idempotent.
    pub fn mark_paid(&self, invoice_id: InvoiceId) -> DomainResult<Invoice> {
        let mut changed = false;
        let invoice = self.invoices.modify(&invoice_id, &mut |invoice: &mut Invoice| {
            changed = invoice.mark_paid();
            Ok(())
        })?;
        if changed {
            info!(%invoice_id, amount = invoice.amount, "invoice paid");
        }
        Ok(invoice)
    }
}
