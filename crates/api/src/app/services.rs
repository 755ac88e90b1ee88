use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use agrochain_billing::{BillingService, Invoice};
use agrochain_core::{DomainError, DomainResult, Entity};
use agrochain_events::{
    CosechaFacturada, DeliveryError, DeliveryResult, Event, EventEmitter, EventSink,
    InMemoryEventBus, JsonEnvelope, NuevaCosecha,
};
use agrochain_harvest::{Farmer, Harvest, HarvestService};
use agrochain_infra::{
    BusSink, DeadLetterAdmin, DeliveryMode, DeliveryWorker, DeliveryWorkerHandle, EmitterConfig,
    HandlerSink, HttpCallbackSink, InMemoryOutbox, ReliableEmitter, TopicSubscriber, WorkerHandle, WorkerStats,
};
use agrochain_inventory::{StockPolicy, Supply, SupplyService};

use crate::config::AppConfig;

pub type Store<R> = Arc<agrochain_infra::LocalLedgerStore<R>>;
pub type SharedBus = Arc<InMemoryEventBus<JsonEnvelope>>;

/// Every service emits through the same emitter shape; only the sink differs.
pub type ServiceEmitter = ReliableEmitter<Arc<dyn EventSink>, InMemoryOutbox>;

pub type HarvestApp = HarvestService<Store<Harvest>, Store<Farmer>, Arc<ServiceEmitter>>;
pub type SupplyApp = SupplyService<Store<Supply>, Arc<ServiceEmitter>>;
pub type BillingApp = BillingService<Store<Invoice>, Arc<ServiceEmitter>>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: String,
        source: std::io::Error,
    },
}

/// Applies billing callbacks directly to the harvest registry.
///
/// Used when no callback URL is configured; classifies errors the same way
/// the HTTP callback classifies status codes.
pub struct InProcessCallbackSink {
    harvest: Arc<HarvestApp>,
}

impl InProcessCallbackSink {
    pub fn new(harvest: Arc<HarvestApp>) -> Self {
        Self { harvest }
    }
}

impl EventSink for InProcessCallbackSink {
    fn name(&self) -> &str {
        "in-process-callback"
    }

    fn deliver(&self, envelope: &JsonEnvelope) -> Result<(), DeliveryError> {
        let event = match envelope.decode::<CosechaFacturada>() {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                return Err(DeliveryError::permanent(format!("malformed callback payload: {e}")));
            }
            None => {
                return Err(DeliveryError::permanent(format!(
                    "no callback route for topic {}",
                    envelope.topic()
                )));
            }
        };

        match self.harvest.mark_invoiced(event.harvest_id, event.invoice_id) {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => Err(DeliveryError::transient(e.to_string())),
            Err(e) => Err(DeliveryError::permanent(e.to_string())),
        }
    }
}

/// A service's emitter plus its background delivery worker.
struct EmitterRuntime {
    emitter: Arc<ServiceEmitter>,
    worker: DeliveryWorkerHandle,
}

fn start_emitter(
    config: &AppConfig,
    name: &str,
    mode: DeliveryMode,
    sink: Arc<dyn EventSink>,
) -> Result<EmitterRuntime, StartupError> {
    let emitter_config = EmitterConfig::new(name)
        .with_mode(mode)
        .with_retry(config.delivery.retry_policy());
    let outbox = InMemoryOutbox::new().with_claim_timeout(config.delivery.claim_timeout());
    let emitter = Arc::new(ReliableEmitter::new(emitter_config, sink, outbox));
    let worker = DeliveryWorker::spawn(emitter.clone(), config.delivery.poll_interval()).map_err(
        |source| StartupError::Spawn {
            what: format!("{name} delivery worker"),
            source,
        },
    )?;
    Ok(EmitterRuntime { emitter, worker })
}

fn open_store<R>(
    config: &AppConfig,
    name: &'static str,
    file: &str,
) -> DomainResult<Store<R>>
where
    R: Entity + Clone + Serialize + DeserializeOwned + Send + Sync,
    R::Id: Send + Sync,
{
    let store = match config.data_dir.as_deref() {
        Some(dir) => open_snapshot(dir, name, file)?,
        None => agrochain_infra::LocalLedgerStore::in_memory(name),
    };
    Ok(Arc::new(store))
}

fn open_snapshot<R>(
    dir: &Path,
    name: &'static str,
    file: &str,
) -> DomainResult<agrochain_infra::LocalLedgerStore<R>>
where
    R: Entity + Clone + Serialize + DeserializeOwned + Send + Sync,
    R::Id: Send + Sync,
{
    std::fs::create_dir_all(dir).map_err(|e| {
        DomainError::storage(format!("failed to create data dir {}: {e}", dir.display()))
    })?;
    agrochain_infra::LocalLedgerStore::open(name, dir.join(file))
}

#[derive(Default)]
struct Workers {
    delivery: Vec<(String, DeliveryWorkerHandle)>,
    subscribers: Vec<WorkerHandle>,
}

/// Wired services shared by the three routers.
pub struct AppServices {
    pub bus: SharedBus,
    pub harvest: Arc<HarvestApp>,
    pub supply: Arc<SupplyApp>,
    pub billing: Arc<BillingApp>,
    pub harvest_emitter: Arc<ServiceEmitter>,
    pub supply_emitter: Arc<ServiceEmitter>,
    pub billing_emitter: Arc<ServiceEmitter>,
    /// Feeds `nueva_cosecha` from the bus into billing.
    pub billing_inbound: Arc<ServiceEmitter>,
    workers: Mutex<Workers>,
}

impl AppServices {
    pub fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let mut workers = Workers::default();

        // Harvest registry.
        let farmers: Store<Farmer> = open_store(config, "farmer", "farmers.json")?;
        let seeded = farmers.seed(config.farmers.iter().cloned())?;
        let harvest_runtime = start_emitter(
            config,
            "harvest",
            DeliveryMode::Inline,
            Arc::new(BusSink::new(bus.clone())),
        )?;
        workers.delivery.push(("harvest".to_string(), harvest_runtime.worker));
        let harvest = Arc::new(
            HarvestService::new(
                open_store(config, "harvest", "harvests.json")?,
                farmers,
                harvest_runtime.emitter.clone(),
            )
            .with_policy(config.duplicate_invoice_policy),
        );

        // Supply.
        let supply_runtime = start_emitter(
            config,
            "supply",
            DeliveryMode::Inline,
            Arc::new(BusSink::new(bus.clone())),
        )?;
        workers.delivery.push(("supply".to_string(), supply_runtime.worker));
        let policy = if config.allow_negative_stock {
            StockPolicy::allowing_negative()
        } else {
            StockPolicy::default()
        };
        let supply = Arc::new(
            SupplyService::new(
                open_store(config, "supply", "supplies.json")?,
                supply_runtime.emitter.clone(),
            )
            .with_policy(policy),
        );
        for seed in &config.supplies {
            match supply.create(&seed.name, seed.stock) {
                Ok(_) | Err(DomainError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Billing, calling the harvest registry back.
        let callback_sink: Arc<dyn EventSink> = match &config.harvest_callback_url {
            Some(url) => Arc::new(HttpCallbackSink::new(
                url.clone(),
                config.delivery.callback_timeout(),
            )),
            None => Arc::new(InProcessCallbackSink::new(harvest.clone())),
        };
        // The HTTP callback blocks, so it only ever runs on the delivery worker.
        let callback_mode = if config.harvest_callback_url.is_some() {
            DeliveryMode::Deferred
        } else {
            DeliveryMode::Inline
        };
        let billing_runtime = start_emitter(config, "billing", callback_mode, callback_sink)?;
        workers.delivery.push(("billing".to_string(), billing_runtime.worker));
        let billing = Arc::new(BillingService::new(
            open_store(config, "invoice", "invoices.json")?,
            billing_runtime.emitter.clone(),
            config.prices.clone(),
        ));

        // Consumption runs behind its own emitter so exhausted failures are
        // dead-lettered and replayable like any outbound delivery.
        let consumer = billing.clone();
        let inbound_runtime = start_emitter(
            config,
            "billing-inbound",
            DeliveryMode::Inline,
            Arc::new(HandlerSink::new("billing-consumer", move |envelope: &JsonEnvelope| {
                consumer.handle_envelope(envelope).map(|_| ())
            })),
        )?;
        workers
            .delivery
            .push(("billing-inbound".to_string(), inbound_runtime.worker));
        let inbound = inbound_runtime.emitter.clone();
        let subscriber = TopicSubscriber::spawn(
            "billing-nueva-cosecha",
            bus.clone(),
            &[NuevaCosecha::TOPIC],
            config.delivery.retry_policy(),
            move |envelope: &JsonEnvelope| {
                match inbound.emit(envelope.topic(), envelope.key(), envelope.payload().clone()) {
                    DeliveryResult::Rejected { reason } => Err(DomainError::storage(reason)),
                    _ => Ok(()),
                }
            },
        )
        .map_err(|source| StartupError::Spawn {
            what: "billing subscriber".to_string(),
            source,
        })?;
        workers.subscribers.push(subscriber);

        info!(
            farmers_seeded = seeded,
            persistent = config.data_dir.is_some(),
            callback = config.harvest_callback_url.as_deref().unwrap_or("in-process"),
            "services started"
        );

        Ok(Self {
            bus,
            harvest,
            supply,
            billing,
            harvest_emitter: harvest_runtime.emitter,
            supply_emitter: supply_runtime.emitter,
            billing_emitter: billing_runtime.emitter,
            billing_inbound: inbound_runtime.emitter,
            workers: Mutex::new(workers),
        })
    }

    pub fn harvest_admin(&self) -> Arc<dyn DeadLetterAdmin> {
        self.harvest_emitter.clone()
    }

    pub fn supply_admin(&self) -> Arc<dyn DeadLetterAdmin> {
        self.supply_emitter.clone()
    }

    pub fn billing_admin(&self) -> Arc<dyn DeadLetterAdmin> {
        self.billing_emitter.clone()
    }

    pub fn billing_inbound_admin(&self) -> Arc<dyn DeadLetterAdmin> {
        self.billing_inbound.clone()
    }

    /// Delivery worker statistics, by emitter name.
    pub fn worker_stats(&self, emitter: &str) -> Option<WorkerStats> {
        let workers = self.workers.lock().ok()?;
        workers
            .delivery
            .iter()
            .find(|(name, _)| name == emitter)
            .map(|(_, handle)| handle.stats())
    }

    /// Stop every background worker. Idempotent; blocks until they exit.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for subscriber in workers.subscribers {
            subscriber.shutdown();
        }
        for (name, worker) in workers.delivery {
            worker.shutdown();
            info!(emitter = %name, "delivery worker stopped");
        }
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        let pending = self
            .workers
            .get_mut()
            .map(|w| w.delivery.len() + w.subscribers.len())
            .unwrap_or(0);
        if pending > 0 {
            warn!(workers = pending, "services dropped without shutdown; stopping workers");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use agrochain_core::{HarvestId, InvoiceId};
    use agrochain_events::{EventBus, EventEnvelope};
    use agrochain_harvest::HarvestStatus;

    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.delivery.base_delay_ms = 5;
        config.delivery.max_delay_ms = 20;
        config.delivery.poll_interval_ms = 5;
        config
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn registration_flows_through_billing_back_to_the_registry() {
        let config = test_config();
        let services = AppServices::build(&config).unwrap();
        let farmer = config.farmers[0].id;

        let harvest_id = services.harvest.register(farmer, "Arroz Oro", 2.0).unwrap();

        assert!(eventually(|| {
            services
                .harvest
                .get(harvest_id)
                .map(|h| h.status == HarvestStatus::Invoiced)
                .unwrap_or(false)
        }));
        let invoice = services.billing.find_by_harvest(harvest_id).unwrap().unwrap();
        assert_eq!(invoice.amount, 240.0);
        assert_eq!(services.harvest.get(harvest_id).unwrap().invoice_id, Some(invoice.id));

        services.shutdown();
    }

    #[test]
    fn seeds_are_applied_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.data_dir = Some(dir.path().to_path_buf());

        let first = AppServices::build(&config).unwrap();
        first.supply.adjust_stock("Fertilizante NPK", 20.0).unwrap();
        first.shutdown();
        drop(first);

        let second = AppServices::build(&config).unwrap();
        assert_eq!(second.supply.list().unwrap().len(), config.supplies.len());
        assert_eq!(second.supply.get("fertilizante npk").unwrap().stock, 480.0);
        second.shutdown();
    }

    #[test]
    fn unprocessable_harvest_events_are_dead_lettered_for_billing() {
        let config = test_config();
        let services = AppServices::build(&config).unwrap();

        let envelope = EventEnvelope::new(
            NuevaCosecha::TOPIC,
            "garbled:REGISTERED",
            serde_json::json!({"harvestId": "not-a-uuid"}),
        );
        services.bus.publish(envelope).unwrap();

        let inbound = services.billing_inbound_admin();
        assert!(eventually(|| inbound.dead_letters().map(|l| l.len() == 1).unwrap_or(false)));
        let letters = inbound.dead_letters().unwrap();
        assert_eq!(letters[0].delivery.envelope.key(), "garbled:REGISTERED");
        assert!(letters[0].reason.contains("malformed"));
        assert!(services.billing.list().unwrap().is_empty());

        inbound.discard(letters[0].id()).unwrap();
        assert!(inbound.dead_letters().unwrap().is_empty());
        services.shutdown();
    }

    #[test]
    fn in_process_callback_refuses_unknown_harvests_permanently() {
        let config = test_config();
        let services = AppServices::build(&config).unwrap();
        let sink = InProcessCallbackSink::new(services.harvest.clone());

        let event = CosechaFacturada {
            harvest_id: HarvestId::new(),
            invoice_id: InvoiceId::new(),
        };
        let envelope = EventEnvelope::from_event(&event.dedup_key(), &event).unwrap();
        assert!(sink.deliver(&envelope).unwrap_err().is_permanent());

        let other = EventEnvelope::new("inventario_ajustado", "k", serde_json::json!({}));
        assert!(sink.deliver(&other).unwrap_err().is_permanent());

        services.shutdown();
    }
}
