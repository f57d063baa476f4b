use std::sync::Arc;

use common::{Envelope, EventSource, Money, Order, OrderId, OrderItem, SagaStatus, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};
use messaging::InMemoryChannel;
use participants::{
    InMemoryCatalog, InMemoryInventory, InventoryParticipant, ParticipantHandler,
    PaymentParticipant, ProductValidation,
};

fn make_envelope() -> Envelope {
    let order = Order::new(
        OrderId::new(),
        TransactionId::generate(),
        vec![
            OrderItem::new("BOOKS", 1, Money::from_cents(1000)),
            OrderItem::new("MUSIC", 2, Money::from_cents(1500)),
        ],
    );
    Envelope::new(order).record(EventSource::Orchestrator, SagaStatus::Success, "Saga started!")
}

fn bench_validation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (validation, _) = ProductValidation::in_memory(InMemoryCatalog::new(["BOOKS", "MUSIC"]));
    let handler = ParticipantHandler::new(Arc::new(validation), Arc::new(InMemoryChannel::new()));

    c.bench_function("participants/validation_forward", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler.process_envelope(make_envelope()).await;
            });
        });
    });
}

fn bench_payment_forward_and_refund(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (payment, _, _) = PaymentParticipant::in_memory();
    let handler = ParticipantHandler::new(Arc::new(payment), Arc::new(InMemoryChannel::new()));

    c.bench_function("participants/payment_forward_and_refund", |b| {
        b.iter(|| {
            rt.block_on(async {
                let charged = handler.process_envelope(make_envelope()).await;
                handler.rollback_envelope(charged).await;
            });
        });
    });
}

fn bench_inventory_reserve_and_restock(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let inventory = InMemoryInventory::new([("BOOKS", 1_000), ("MUSIC", 1_000)]);
    let (participant, _) = InventoryParticipant::in_memory(inventory);
    let handler = ParticipantHandler::new(Arc::new(participant), Arc::new(InMemoryChannel::new()));

    c.bench_function("participants/inventory_reserve_and_restock", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reserved = handler.process_envelope(make_envelope()).await;
                handler.rollback_envelope(reserved).await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_validation,
    bench_payment_forward_and_refund,
    bench_inventory_reserve_and_restock
);
criterion_main!(benches);
