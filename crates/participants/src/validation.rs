//! Product validation participant.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Envelope, EventSource, Order, OrderId, ProductCode, TransactionId};
use messaging::Topic;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ParticipantError;
use crate::handler::{Compensation, Participant};
use crate::record::{CompensationLedger, CompensationRecord, CompensationState, InMemoryLedger};

const RESOURCE: &str = "validation";

/// Catalog of products the shop sells.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn exists_by_code(&self, code: &ProductCode) -> Result<bool>;
}

/// In-memory product catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    codes: Arc<RwLock<HashSet<ProductCode>>>,
}

impl InMemoryCatalog {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ProductCode>,
    {
        Self {
            codes: Arc::new(RwLock::new(codes.into_iter().map(Into::into).collect())),
        }
    }

    pub async fn add(&self, code: impl Into<ProductCode>) {
        self.codes.write().await.insert(code.into());
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn exists_by_code(&self, code: &ProductCode) -> Result<bool> {
        Ok(self.codes.read().await.contains(code))
    }
}

/// Checks that every product of the order is known to the catalog.
///
/// The compensation record stores the validation flag: `false -> true` when
/// the order passes, flipped back when it is rolled back.
pub struct ProductValidation {
    catalog: Arc<dyn ProductCatalog>,
    ledger: Arc<dyn CompensationLedger<bool>>,
}

impl ProductValidation {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        ledger: Arc<dyn CompensationLedger<bool>>,
    ) -> Self {
        Self { catalog, ledger }
    }

    /// Creates a validator over an in-memory catalog and ledger.
    pub fn in_memory(catalog: InMemoryCatalog) -> (Self, InMemoryLedger<bool>) {
        let ledger = InMemoryLedger::new();
        let participant = Self::new(Arc::new(catalog), Arc::new(ledger.clone()));
        (participant, ledger)
    }
}

#[async_trait]
impl Participant for ProductValidation {
    fn source(&self) -> EventSource {
        EventSource::ProductValidation
    }

    fn name(&self) -> &'static str {
        "product validation"
    }

    fn action(&self) -> &'static str {
        "validate products"
    }

    fn success_message(&self) -> &'static str {
        "Products are validated successfully!"
    }

    fn forward_topic(&self) -> Topic {
        Topic::ProductValidationSuccess
    }

    fn rollback_topic(&self) -> Topic {
        Topic::ProductValidationFail
    }

    async fn already_processed(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<bool> {
        self.ledger.exists(order_id, transaction_id).await
    }

    async fn check(&self, envelope: &Envelope) -> Result<()> {
        let order = envelope.payload();
        if order.products.is_empty() {
            return Err(ParticipantError::Validation(
                "Product list is empty!".to_string(),
            ));
        }
        if envelope.transaction_id().is_empty() {
            return Err(ParticipantError::Validation(
                "OrderID and TransactionID must be informed!".to_string(),
            ));
        }

        for item in &order.products {
            if item.product_code.is_empty() {
                return Err(ParticipantError::Validation(
                    "Product must be informed!".to_string(),
                ));
            }
            if item.quantity == 0 {
                return Err(ParticipantError::Validation(format!(
                    "Quantity of product {} must be informed!",
                    item.product_code
                )));
            }
            if item.unit_value.cents() < 0 {
                return Err(ParticipantError::Validation(format!(
                    "Unit value of product {} must not be negative!",
                    item.product_code
                )));
            }
            if !self.catalog.exists_by_code(&item.product_code).await? {
                return Err(ParticipantError::Validation(format!(
                    "Product {} does not exist in catalog!",
                    item.product_code
                )));
            }
        }
        Ok(())
    }

    async fn apply(&self, envelope: &Envelope) -> Result<Order> {
        self.ledger
            .save(CompensationRecord::applied(
                envelope.order_id(),
                envelope.transaction_id().clone(),
                RESOURCE,
                false,
                true,
            ))
            .await?;
        Ok(envelope.payload().clone())
    }

    async fn compensate(&self, envelope: &Envelope) -> Result<Compensation> {
        let order_id = envelope.order_id();
        let transaction_id = envelope.transaction_id();
        let records = self.ledger.find(order_id, transaction_id).await?;

        let Some(record) = records.into_iter().find(|r| r.resource == RESOURCE) else {
            self.ledger
                .save(CompensationRecord::not_executed(
                    order_id,
                    transaction_id.clone(),
                    RESOURCE,
                ))
                .await?;
            return Ok(Compensation::NothingToRevert);
        };

        match record.state {
            CompensationState::Reverted => Ok(Compensation::AlreadyReverted),
            CompensationState::NotExecuted => Ok(Compensation::NothingToRevert),
            CompensationState::Applied => {
                let mut record = record.reverted();
                record.new_value = Some(false);
                self.ledger.save(record).await?;
                Ok(Compensation::Reverted(None))
            }
        }
    }
}
