//! The saga log: final envelopes of finished sagas.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Envelope, EventSource, OrderId, SagaStatus, TransactionId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Result;
use crate::read_model::ReadModel;

/// One ending notification, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaLogEntry {
    pub id: Uuid,
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    pub source: Option<EventSource>,
    pub status: Option<SagaStatus>,
    /// The final envelope, full history included.
    pub envelope: Envelope,
    pub recorded_at: DateTime<Utc>,
}

impl SagaLogEntry {
    /// Creates an entry for an ending notification received now.
    pub fn new(envelope: Envelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: envelope.order_id(),
            transaction_id: envelope.transaction_id().clone(),
            source: envelope.source(),
            status: envelope.status(),
            envelope,
            recorded_at: Utc::now(),
        }
    }
}

/// Storage and queries for ending notifications.
///
/// Several notifications may exist for one order or transaction, e.g. after
/// a redelivery. Lookups return the most recently recorded one.
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Stores an ending notification.
    async fn record(&self, envelope: Envelope) -> Result<SagaLogEntry>;

    /// Returns the latest notification for an order.
    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<SagaLogEntry>>;

    /// Returns the latest notification for a transaction.
    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SagaLogEntry>>;

    /// Returns every notification, newest first.
    async fn find_all(&self) -> Result<Vec<SagaLogEntry>>;
}

/// In-memory saga log.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaLog {
    entries: Arc<RwLock<Vec<SagaLogEntry>>>,
}

impl InMemorySagaLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaLog for InMemorySagaLog {
    async fn record(&self, envelope: Envelope) -> Result<SagaLogEntry> {
        let entry = SagaLogEntry::new(envelope);
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<SagaLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().find(|e| e.order_id == order_id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SagaLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .find(|e| &e.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<SagaLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().cloned().collect())
    }
}

#[async_trait]
impl ReadModel for InMemorySagaLog {
    fn name(&self) -> &'static str {
        "InMemorySagaLog"
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
