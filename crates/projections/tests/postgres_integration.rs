//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p projections --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Envelope, EventSource, Money, Order, OrderId, OrderItem, SagaStatus, TransactionId};
use projections::{PostgresSagaLog, ReadModel, SagaLog};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresSagaLog::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh log with its own pool and an empty table
async fn get_test_log() -> PostgresSagaLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaLog::new(pool)
}

fn ending(status: SagaStatus) -> Envelope {
    Envelope::new(Order::new(
        OrderId::new(),
        TransactionId::generate(),
        vec![
            OrderItem::new("BOOKS", 3, Money::from_dollars(10)),
            OrderItem::new("MUSIC", 1, Money::from_dollars(5)),
        ],
    ))
    .record(EventSource::Orchestrator, SagaStatus::Success, "Saga started!")
    .record(EventSource::Inventory, SagaStatus::RollbackPending, "out of stock")
    .record(EventSource::Orchestrator, status, "Saga finished")
}

#[tokio::test]
#[serial]
async fn test_record_and_find_by_order_id() {
    let log = get_test_log().await;
    let envelope = ending(SagaStatus::Fail);

    let recorded = log.record(envelope.clone()).await.unwrap();
    let found = log
        .find_by_order_id(envelope.order_id())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.id, recorded.id);
    assert_eq!(found.envelope, envelope);
    assert_eq!(found.status, Some(SagaStatus::Fail));
    assert_eq!(found.source, Some(EventSource::Orchestrator));
    assert_eq!(found.envelope.history().len(), 3);
}

#[tokio::test]
#[serial]
async fn test_find_by_transaction_id_returns_latest() {
    let log = get_test_log().await;
    let envelope = ending(SagaStatus::Fail);

    log.record(envelope.clone()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let latest = log
        .record(envelope.clone().record(
            EventSource::Orchestrator,
            SagaStatus::Fail,
            "redelivered",
        ))
        .await
        .unwrap();

    let found = log
        .find_by_transaction_id(envelope.transaction_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, latest.id);
    assert_eq!(found.envelope.history().len(), 4);
}

#[tokio::test]
#[serial]
async fn test_missing_entries_are_none() {
    let log = get_test_log().await;

    assert!(log.find_by_order_id(OrderId::new()).await.unwrap().is_none());
    assert!(
        log.find_by_transaction_id(&TransactionId::new("0_missing"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn test_find_all_newest_first_and_count() {
    let log = get_test_log().await;

    let first = log.record(ending(SagaStatus::Success)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = log.record(ending(SagaStatus::Fail)).await.unwrap();

    let all = log.find_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);
    assert_eq!(log.count().await.unwrap(), 2);
}
