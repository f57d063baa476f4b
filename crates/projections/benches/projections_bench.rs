use common::{Envelope, EventSource, Money, Order, OrderId, OrderItem, SagaStatus, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};
use projections::{InMemorySagaLog, SagaLog};

fn make_ending() -> Envelope {
    Envelope::new(Order::new(
        OrderId::new(),
        TransactionId::generate(),
        vec![OrderItem::new("BOOKS", 1, Money::from_cents(1000))],
    ))
    .record(EventSource::Orchestrator, SagaStatus::Success, "Saga started!")
    .record(EventSource::Orchestrator, SagaStatus::Success, "Saga finished successfully!")
}

fn bench_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();

    c.bench_function("projections/record_ending", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.record(make_ending()).await.unwrap();
            });
        });
    });
}

fn bench_find_by_order_id(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemorySagaLog::new();
    let target = rt.block_on(async {
        for _ in 0..1_000 {
            log.record(make_ending()).await.unwrap();
        }
        log.record(make_ending()).await.unwrap().order_id
    });

    c.bench_function("projections/find_by_order_id_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.find_by_order_id(target).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_record, bench_find_by_order_id);
criterion_main!(benches);
