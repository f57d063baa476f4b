use async_trait::async_trait;
use common::{Envelope, OrderId, TransactionId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::read_model::ReadModel;
use crate::saga_log::{SagaLog, SagaLogEntry};
use crate::{ProjectionError, Result};

const SELECT_COLUMNS: &str = "SELECT id, order_id, transaction_id, envelope, recorded_at FROM saga_events";

/// PostgreSQL-backed saga log.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
}

impl PostgresSagaLog {
    /// Creates a new PostgreSQL saga log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and runs the migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        let log = Self::new(pool);
        log.run_migrations().await?;
        Ok(log)
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<SagaLogEntry> {
        let envelope_json: serde_json::Value = row.try_get("envelope")?;
        let envelope: Envelope = serde_json::from_value(envelope_json)?;

        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
        if order_id != envelope.order_id() {
            return Err(ProjectionError::InvalidData(format!(
                "row order id {order_id} does not match envelope {}",
                envelope.order_id()
            )));
        }

        Ok(SagaLogEntry {
            id: row.try_get("id")?,
            order_id,
            transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
            source: envelope.source(),
            status: envelope.status(),
            envelope,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[async_trait]
impl SagaLog for PostgresSagaLog {
    async fn record(&self, envelope: Envelope) -> Result<SagaLogEntry> {
        let entry = SagaLogEntry::new(envelope);
        let envelope_json = serde_json::to_value(&entry.envelope)?;

        sqlx::query(
            r#"
            INSERT INTO saga_events (id, order_id, transaction_id, source, status, envelope, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.order_id.as_uuid())
        .bind(entry.transaction_id.as_str())
        .bind(entry.source.map(|s| s.as_str()))
        .bind(entry.status.map(|s| s.as_str()))
        .bind(envelope_json)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<SagaLogEntry>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE order_id = $1 ORDER BY recorded_at DESC LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SagaLogEntry>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE transaction_id = $1 ORDER BY recorded_at DESC LIMIT 1"
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn find_all(&self) -> Result<Vec<SagaLogEntry>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY recorded_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}

#[async_trait]
impl ReadModel for PostgresSagaLog {
    fn name(&self) -> &'static str {
        "PostgresSagaLog"
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saga_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
