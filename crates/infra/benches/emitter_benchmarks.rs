use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde::{Deserialize, Serialize};

use agrochain_core::{Entity, LedgerStore, SupplyId};
use agrochain_events::{EventEmitter, InMemoryEventBus, JsonEnvelope};
use agrochain_infra::{
    BusSink, DeliveryMode, EmitterConfig, InMemoryOutbox, LocalLedgerStore, ReliableEmitter,
    RetryPolicy,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stock {
    id: SupplyId,
    name: String,
    stock: f64,
}

impl Entity for Stock {
    type Id = SupplyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn stock(name: &str) -> Stock {
    Stock {
        id: SupplyId::new(),
        name: name.to_string(),
        stock: 1_000_000.0,
    }
}

fn bus_emitter(
    mode: DeliveryMode,
) -> ReliableEmitter<BusSink<Arc<InMemoryEventBus<JsonEnvelope>>>, InMemoryOutbox> {
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
    let config = EmitterConfig::new("bench")
        .with_mode(mode)
        .with_retry(RetryPolicy::fixed(5, Duration::ZERO));
    ReliableEmitter::new(config, BusSink::new(bus), InMemoryOutbox::new())
}

fn bench_ledger_modify(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_modify");

    group.bench_function("in_memory", |b| {
        let store = LocalLedgerStore::in_memory("supply");
        let id = store.create(stock("Urea")).unwrap();
        b.iter(|| {
            store
                .modify(&id, &mut |s: &mut Stock| {
                    s.stock -= black_box(1.0);
                    Ok(())
                })
                .unwrap();
        });
    });

    group.bench_function("snapshot_file", |b| {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalLedgerStore::open("supply", dir.path().join("supplies.json")).unwrap();
        for i in 0..100 {
            store.create(stock(&format!("item-{i}"))).unwrap();
        }
        let id = store.create(stock("Urea")).unwrap();
        b.iter(|| {
            store
                .modify(&id, &mut |s: &mut Stock| {
                    s.stock -= black_box(1.0);
                    Ok(())
                })
                .unwrap();
        });
    });

    group.finish();
}

fn bench_inline_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("inline_emit");
    group.throughput(Throughput::Elements(1));

    group.bench_function("bus_sink", |b| {
        let emitter = bus_emitter(DeliveryMode::Inline);
        b.iter(|| {
            let result = emitter.emit(
                "inventario_ajustado",
                "Urea",
                black_box(serde_json::json!({"item": "Urea", "delta": 5.0})),
            );
            assert!(result.is_delivered());
        });
    });

    group.finish();
}

fn bench_deferred_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deferred_drain");

    for batch in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("deliver_ready", batch), &batch, |b, &batch| {
            let emitter = bus_emitter(DeliveryMode::Deferred);
            b.iter(|| {
                for i in 0..batch {
                    emitter.emit("nueva_cosecha", &i.to_string(), serde_json::json!({}));
                }
                while emitter.deliver_ready().unwrap() > 0 {}
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ledger_modify, bench_inline_emit, bench_deferred_drain);
criterion_main!(benches);
