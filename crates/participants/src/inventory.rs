//! Inventory participant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Envelope, EventSource, Order, OrderId, ProductCode, TransactionId};
use messaging::Topic;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ParticipantError;
use crate::handler::{Compensation, Participant};
use crate::record::{CompensationLedger, CompensationRecord, CompensationState, InMemoryLedger};

/// Resource name of the marker left when a rollback finds nothing to undo.
const NOT_EXECUTED_RESOURCE: &str = "inventory";

/// Attempts at an optimistic stock update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Compare-and-set update of one product's stock level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_code: ProductCode,
    /// Level the change was computed from.
    pub expected: u32,
    /// Level to set.
    pub available: u32,
}

/// Stock levels per product.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn find_by_code(&self, code: &ProductCode) -> Result<Option<u32>>;

    async fn save(&self, code: &ProductCode, available: u32) -> Result<()>;

    /// Applies all changes or none. Fails with
    /// [`ParticipantError::Conflict`] if any level differs from `expected`.
    async fn apply(&self, changes: &[StockChange]) -> Result<()>;
}

/// In-memory inventory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    levels: Arc<RwLock<HashMap<ProductCode, u32>>>,
}

impl InMemoryInventory {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<ProductCode>,
    {
        Self {
            levels: Arc::new(RwLock::new(
                levels
                    .into_iter()
                    .map(|(code, available)| (code.into(), available))
                    .collect(),
            )),
        }
    }

    /// Returns the current level of a product, if it is stocked.
    pub async fn available(&self, code: &str) -> Option<u32> {
        self.levels
            .read()
            .await
            .get(&ProductCode::new(code))
            .copied()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn find_by_code(&self, code: &ProductCode) -> Result<Option<u32>> {
        Ok(self.levels.read().await.get(code).copied())
    }

    async fn save(&self, code: &ProductCode, available: u32) -> Result<()> {
        self.levels.write().await.insert(code.clone(), available);
        Ok(())
    }

    async fn apply(&self, changes: &[StockChange]) -> Result<()> {
        let mut levels = self.levels.write().await;
        for change in changes {
            let current = levels.get(&change.product_code).copied();
            if current != Some(change.expected) {
                return Err(ParticipantError::Conflict(format!(
                    "stock of {} changed",
                    change.product_code
                )));
            }
        }
        for change in changes {
            levels.insert(change.product_code.clone(), change.available);
        }
        Ok(())
    }
}

/// Reserves stock for every line item of the order.
///
/// All items are checked before anything is touched and the decrement is a
/// single all-or-nothing update, so a failing order never leaves partial
/// reservations behind. One compensation record per product keeps the
/// levels before and after. The records are saved before the decrement and
/// released if it does not go through.
pub struct InventoryParticipant {
    inventory: Arc<dyn InventoryStore>,
    ledger: Arc<dyn CompensationLedger<u32>>,
}

impl InventoryParticipant {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        ledger: Arc<dyn CompensationLedger<u32>>,
    ) -> Self {
        Self { inventory, ledger }
    }

    /// Creates an inventory participant over an in-memory ledger.
    pub fn in_memory(inventory: InMemoryInventory) -> (Self, InMemoryLedger<u32>) {
        let ledger = InMemoryLedger::new();
        let participant = Self::new(Arc::new(inventory), Arc::new(ledger.clone()));
        (participant, ledger)
    }

    /// Quantity requested per product, merging repeated line items.
    fn demand(order: &Order) -> Result<Vec<(ProductCode, u32)>> {
        let mut demand: Vec<(ProductCode, u32)> = Vec::new();
        for item in &order.products {
            match demand.iter_mut().find(|(code, _)| *code == item.product_code) {
                Some((code, quantity)) => {
                    *quantity = quantity.checked_add(item.quantity).ok_or_else(|| {
                        ParticipantError::Validation(format!(
                            "Quantity of product {code} is too large"
                        ))
                    })?;
                }
                None => demand.push((item.product_code.clone(), item.quantity)),
            }
        }
        Ok(demand)
    }

    /// Reads current levels and computes the decrement for every product.
    async fn plan(&self, demand: &[(ProductCode, u32)]) -> Result<Vec<StockChange>> {
        let mut changes = Vec::with_capacity(demand.len());
        for (code, quantity) in demand {
            let available = self.inventory.find_by_code(code).await?.ok_or_else(|| {
                ParticipantError::NotFound(format!("Inventory not found for product {code}"))
            })?;
            if available < *quantity {
                return Err(ParticipantError::Validation(format!(
                    "Product {code} is out of stock!"
                )));
            }
            changes.push(StockChange {
                product_code: code.clone(),
                expected: available,
                available: available - quantity,
            });
        }
        Ok(changes)
    }

    /// Adds back what each applied record took.
    async fn restock(&self, records: &[CompensationRecord<u32>]) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut changes = Vec::with_capacity(records.len());
            for record in records {
                let code = ProductCode::new(record.resource.as_str());
                let taken = match (record.old_value, record.new_value) {
                    (Some(old), Some(new)) => old.saturating_sub(new),
                    _ => 0,
                };
                let current = self.inventory.find_by_code(&code).await?.ok_or_else(|| {
                    ParticipantError::NotFound(format!("Inventory not found for product {code}"))
                })?;
                let available = current.checked_add(taken).ok_or_else(|| {
                    ParticipantError::Validation(format!("Stock level of {code} is too large"))
                })?;
                changes.push(StockChange {
                    product_code: code,
                    expected: current,
                    available,
                });
            }

            match self.inventory.apply(&changes).await {
                Err(ParticipantError::Conflict(reason)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "stock changed during restock, retrying");
                }
                result => return result,
            }
        }
    }

    /// Applies the planned decrement, replanning on concurrent changes.
    async fn reserve(
        &self,
        demand: &[(ProductCode, u32)],
        planned: Vec<StockChange>,
    ) -> Result<Vec<StockChange>> {
        let mut changes = planned;
        let mut attempt = 1;
        loop {
            match self.inventory.apply(&changes).await {
                Ok(()) => return Ok(changes),
                Err(ParticipantError::Conflict(reason)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "stock changed during update, retrying");
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
            changes = self.plan(demand).await?;
        }
    }

    fn records(envelope: &Envelope, changes: &[StockChange]) -> Vec<CompensationRecord<u32>> {
        changes
            .iter()
            .map(|change| {
                CompensationRecord::applied(
                    envelope.order_id(),
                    envelope.transaction_id().clone(),
                    change.product_code.as_str(),
                    change.expected,
                    change.available,
                )
            })
            .collect()
    }
}

#[async_trait]
impl Participant for InventoryParticipant {
    fn source(&self) -> EventSource {
        EventSource::Inventory
    }

    fn name(&self) -> &'static str {
        "inventory"
    }

    fn action(&self) -> &'static str {
        "update inventory"
    }

    fn success_message(&self) -> &'static str {
        "Inventory updated successfully!"
    }

    fn forward_topic(&self) -> Topic {
        Topic::InventorySuccess
    }

    fn rollback_topic(&self) -> Topic {
        Topic::InventoryFail
    }

    async fn already_processed(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<bool> {
        self.ledger.exists(order_id, transaction_id).await
    }

    async fn check(&self, envelope: &Envelope) -> Result<()> {
        self.plan(&Self::demand(envelope.payload())?).await.map(|_| ())
    }

    async fn apply(&self, envelope: &Envelope) -> Result<Order> {
        let demand = Self::demand(envelope.payload())?;
        let planned = self.plan(&demand).await?;
        let records = Self::records(envelope, &planned);
        self.ledger.save_all(records.clone()).await?;

        match self.reserve(&demand, planned.clone()).await {
            Ok(changes) if changes != planned => {
                // Same quantities taken, from levels moved by a concurrent order.
                if let Err(e) = self.ledger.save_all(Self::records(envelope, &changes)).await {
                    tracing::warn!(error = %e, "failed to record final stock levels");
                }
            }
            Ok(_) => {}
            Err(e) => {
                let released = records.into_iter().map(CompensationRecord::released).collect();
                if let Err(release) = self.ledger.save_all(released).await {
                    tracing::error!(error = %release, "failed to release inventory records");
                }
                return Err(e);
            }
        }
        Ok(envelope.payload().clone())
    }

    async fn compensate(&self, envelope: &Envelope) -> Result<Compensation> {
        let order_id = envelope.order_id();
        let transaction_id = envelope.transaction_id();
        let records = self.ledger.find(order_id, transaction_id).await?;

        if records.is_empty() {
            self.ledger
                .save(CompensationRecord::not_executed(
                    order_id,
                    transaction_id.clone(),
                    NOT_EXECUTED_RESOURCE,
                ))
                .await?;
            return Ok(Compensation::NothingToRevert);
        }

        let applied: Vec<_> = records.iter().filter(|r| r.is_applied()).cloned().collect();
        if applied.is_empty() {
            let reverted = records
                .iter()
                .any(|r| r.state == CompensationState::Reverted);
            return Ok(if reverted {
                Compensation::AlreadyReverted
            } else {
                Compensation::NothingToRevert
            });
        }

        self.restock(&applied).await?;
        self.ledger
            .save_all(applied.into_iter().map(CompensationRecord::reverted).collect())
            .await?;
        Ok(Compensation::Reverted(None))
    }
}
