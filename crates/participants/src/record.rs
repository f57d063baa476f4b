//! Compensation records and the ledger that stores them.
//!
//! A record is written when a participant applies its forward action and
//! updated in place when it is compensated. Records are never deleted, so
//! the ledger doubles as the idempotency guard for `(order_id, transaction_id)`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, TransactionId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;

/// Where a compensation record stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationState {
    /// The forward action took effect.
    Applied,
    /// The forward action was undone.
    Reverted,
    /// Nothing took effect: a rollback arrived before any forward action,
    /// or the forward action was abandoned before it was committed.
    NotExecuted,
}

impl std::fmt::Display for CompensationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompensationState::Applied => write!(f, "APPLIED"),
            CompensationState::Reverted => write!(f, "REVERTED"),
            CompensationState::NotExecuted => write!(f, "NOT_EXECUTED"),
        }
    }
}

/// What a participant changed for one attempt, with enough detail to undo it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord<V> {
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    /// What was touched, e.g. a product code.
    pub resource: String,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
    pub state: CompensationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<V> CompensationRecord<V> {
    /// Records a forward action that moved `resource` from `old_value` to `new_value`.
    pub fn applied(
        order_id: OrderId,
        transaction_id: TransactionId,
        resource: impl Into<String>,
        old_value: V,
        new_value: V,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            transaction_id,
            resource: resource.into(),
            old_value: Some(old_value),
            new_value: Some(new_value),
            state: CompensationState::Applied,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a rollback for which there was nothing to undo.
    pub fn not_executed(
        order_id: OrderId,
        transaction_id: TransactionId,
        resource: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            transaction_id,
            resource: resource.into(),
            old_value: None,
            new_value: None,
            state: CompensationState::NotExecuted,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the record as undone.
    pub fn reverted(mut self) -> Self {
        self.state = CompensationState::Reverted;
        self.updated_at = Utc::now();
        self
    }

    /// Marks a record saved ahead of a forward action that never took effect.
    pub fn released(mut self) -> Self {
        self.state = CompensationState::NotExecuted;
        self.updated_at = Utc::now();
        self
    }

    pub fn is_applied(&self) -> bool {
        self.state == CompensationState::Applied
    }
}

/// Storage for one participant's compensation records.
#[async_trait]
pub trait CompensationLedger<V>: Send + Sync {
    /// Returns true if any record exists for the attempt.
    async fn exists(&self, order_id: OrderId, transaction_id: &TransactionId) -> Result<bool>;

    /// Returns the records of an attempt, in the order they were first saved.
    async fn find(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<Vec<CompensationRecord<V>>>;

    /// Inserts a record, or replaces the one for the same attempt and resource.
    async fn save(&self, record: CompensationRecord<V>) -> Result<()>;

    /// Saves several records at once: either all of them are stored or none.
    async fn save_all(&self, records: Vec<CompensationRecord<V>>) -> Result<()>;
}

type AttemptKey = (OrderId, TransactionId);

/// In-memory compensation ledger.
#[derive(Debug)]
pub struct InMemoryLedger<V> {
    records: Arc<RwLock<HashMap<AttemptKey, Vec<CompensationRecord<V>>>>>,
}

impl<V> InMemoryLedger<V> {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the total number of records across all attempts.
    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> Default for InMemoryLedger<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for InMemoryLedger<V> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

#[async_trait]
impl<V> CompensationLedger<V> for InMemoryLedger<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn exists(&self, order_id: OrderId, transaction_id: &TransactionId) -> Result<bool> {
        let key = (order_id, transaction_id.clone());
        Ok(self
            .records
            .read()
            .await
            .get(&key)
            .is_some_and(|records| !records.is_empty()))
    }

    async fn find(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<Vec<CompensationRecord<V>>> {
        let key = (order_id, transaction_id.clone());
        Ok(self
            .records
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, record: CompensationRecord<V>) -> Result<()> {
        upsert(&mut *self.records.write().await, record);
        Ok(())
    }

    async fn save_all(&self, records: Vec<CompensationRecord<V>>) -> Result<()> {
        let mut stored = self.records.write().await;
        for record in records {
            upsert(&mut stored, record);
        }
        Ok(())
    }
}

fn upsert<V>(
    stored: &mut HashMap<AttemptKey, Vec<CompensationRecord<V>>>,
    record: CompensationRecord<V>,
) {
    let key = (record.order_id, record.transaction_id.clone());
    let attempt = stored.entry(key).or_default();
    match attempt.iter_mut().find(|r| r.resource == record.resource) {
        Some(existing) => *existing = record,
        None => attempt.push(record),
    }
}

/// Ledger that fails every save once its budget of successful saves is spent.
#[cfg(test)]
pub(crate) struct FailingLedger<V> {
    pub(crate) inner: InMemoryLedger<V>,
    saves_left: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl<V> FailingLedger<V> {
    pub(crate) fn after(saves: usize) -> Self {
        Self {
            inner: InMemoryLedger::new(),
            saves_left: std::sync::atomic::AtomicUsize::new(saves),
        }
    }

    fn spend(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        self.saves_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| crate::ParticipantError::Store("ledger unavailable".into()))
    }
}

#[cfg(test)]
#[async_trait]
impl<V> CompensationLedger<V> for FailingLedger<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn exists(&self, order_id: OrderId, transaction_id: &TransactionId) -> Result<bool> {
        self.inner.exists(order_id, transaction_id).await
    }

    async fn find(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<Vec<CompensationRecord<V>>> {
        self.inner.find(order_id, transaction_id).await
    }

    async fn save(&self, record: CompensationRecord<V>) -> Result<()> {
        self.spend()?;
        self.inner.save(record).await
    }

    async fn save_all(&self, records: Vec<CompensationRecord<V>>) -> Result<()> {
        self.spend()?;
        self.inner.save_all(records).await
    }
}
