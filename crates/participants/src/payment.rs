//! Payment participant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Envelope, EventSource, Money, Order, OrderId, TransactionId};
use messaging::Topic;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ParticipantError;
use crate::handler::{Compensation, Participant};
use crate::record::{CompensationLedger, CompensationRecord, CompensationState, InMemoryLedger};

const RESOURCE: &str = "payment";

/// Smallest amount the payment participant accepts by default.
pub const DEFAULT_MIN_AMOUNT: Money = Money::from_cents(10);

/// Lifecycle of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Refund,
}

/// A charge made for one saga attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    pub total_amount: Money,
    pub total_items: u32,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    fn pending(order: &Order, transaction_id: TransactionId) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            order_id: order.id,
            transaction_id,
            total_amount: order.calculate_total_amount()?,
            total_items: order.calculate_total_items()?,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }
}

/// Storage for payments, keyed by saga attempt.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>>;

    async fn save(&self, payment: Payment) -> Result<()>;
}

/// In-memory payment store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<(OrderId, TransactionId), Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>> {
        let key = (order_id, transaction_id.clone());
        Ok(self.payments.read().await.get(&key).cloned())
    }

    async fn save(&self, payment: Payment) -> Result<()> {
        let key = (payment.order_id, payment.transaction_id.clone());
        self.payments.write().await.insert(key, payment);
        Ok(())
    }
}

/// Charges the order total and writes the totals into the order snapshot.
///
/// Refunds on rollback. The compensation record tracks the payment status
/// transition. It is saved before the charge and released if the charge
/// cannot be stored.
pub struct PaymentParticipant {
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<dyn CompensationLedger<PaymentStatus>>,
    min_amount: Money,
}

impl PaymentParticipant {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<dyn CompensationLedger<PaymentStatus>>,
    ) -> Self {
        Self {
            payments,
            ledger,
            min_amount: DEFAULT_MIN_AMOUNT,
        }
    }

    /// Overrides the minimum payable amount.
    pub fn with_min_amount(mut self, min_amount: Money) -> Self {
        self.min_amount = min_amount;
        self
    }

    /// Creates a payment participant over in-memory stores.
    pub fn in_memory() -> (
        Self,
        InMemoryPaymentStore,
        InMemoryLedger<PaymentStatus>,
    ) {
        let payments = InMemoryPaymentStore::new();
        let ledger = InMemoryLedger::new();
        let participant = Self::new(Arc::new(payments.clone()), Arc::new(ledger.clone()));
        (participant, payments, ledger)
    }

    pub fn min_amount(&self) -> Money {
        self.min_amount
    }

    async fn charge(&self, payment: Payment) -> Result<Payment> {
        self.payments.save(payment.clone()).await?;
        let payment = payment.with_status(PaymentStatus::Success);
        self.payments.save(payment.clone()).await?;
        Ok(payment)
    }
}

#[async_trait]
impl Participant for PaymentParticipant {
    fn source(&self) -> EventSource {
        EventSource::Payment
    }

    fn name(&self) -> &'static str {
        "payment"
    }

    fn action(&self) -> &'static str {
        "realize payment"
    }

    fn success_message(&self) -> &'static str {
        "Payment realized successfully!"
    }

    fn forward_topic(&self) -> Topic {
        Topic::PaymentSuccess
    }

    fn rollback_topic(&self) -> Topic {
        Topic::PaymentFail
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
        order.calculate_total_items()?;
        if order.calculate_total_amount()? < self.min_amount {
            return Err(ParticipantError::Validation(format!(
                "The minimum amount available is {}",
                self.min_amount
            )));
        }
        Ok(())
    }

    async fn apply(&self, envelope: &Envelope) -> Result<Order> {
        let payment = Payment::pending(envelope.payload(), envelope.transaction_id().clone())?;
        let record = CompensationRecord::applied(
            payment.order_id,
            payment.transaction_id.clone(),
            RESOURCE,
            PaymentStatus::Pending,
            PaymentStatus::Success,
        );
        self.ledger.save(record.clone()).await?;

        let payment = match self.charge(payment).await {
            Ok(payment) => payment,
            Err(e) => {
                if let Err(release) = self.ledger.save(record.released()).await {
                    tracing::error!(error = %release, "failed to release payment record");
                }
                return Err(e);
            }
        };

        tracing::debug!(
            total_amount = %payment.total_amount,
            total_items = payment.total_items,
            "payment charged"
        );
        Ok(envelope
            .payload()
            .clone()
            .with_totals(payment.total_amount, payment.total_items))
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
                let payment = self
                    .payments
                    .find(order_id, transaction_id)
                    .await?
                    .ok_or_else(|| {
                        ParticipantError::NotFound("Payment not found by order".to_string())
                    })?
                    .with_status(PaymentStatus::Refund);
                self.payments.save(payment.clone()).await?;

                let mut record = record.reverted();
                record.new_value = Some(PaymentStatus::Refund);
                self.ledger.save(record).await?;

                let order = envelope
                    .payload()
                    .clone()
                    .with_totals(payment.total_amount, payment.total_items);
                Ok(Compensation::Reverted(Some(order)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FailingLedger;
    use common::{OrderItem, SagaStatus};

    struct UnavailableStore;

    #[async_trait]
    impl PaymentStore for UnavailableStore {
        async fn find(&self, _: OrderId, _: &TransactionId) -> Result<Option<Payment>> {
            Ok(None)
        }

        async fn save(&self, _: Payment) -> Result<()> {
            Err(ParticipantError::Store("payments unavailable".into()))
        }
    }

    fn envelope(products: Vec<OrderItem>) -> Envelope {
        Envelope::new(Order::new(OrderId::new(), TransactionId::generate(), products))
            .record(EventSource::ProductValidation, SagaStatus::Success, "valid")
    }

    fn sample_order() -> Envelope {
        envelope(vec![
            OrderItem::new("BOOKS", 3, Money::from_dollars(10)),
            OrderItem::new("MUSIC", 1, Money::from_dollars(5)),
        ])
    }

    #[tokio::test]
    async fn test_minimum_amount() {
        let (payment, _, _) = PaymentParticipant::in_memory();
        assert!(payment.check(&sample_order()).await.is_ok());

        let cheap = envelope(vec![OrderItem::new("BOOKS", 1, Money::from_cents(9))]);
        let err = payment.check(&cheap).await.unwrap_err();
        assert_eq!(err.to_string(), "The minimum amount available is $0.10");

        let exact = envelope(vec![OrderItem::new("BOOKS", 1, Money::from_cents(10))]);
        assert!(payment.check(&exact).await.is_ok());
    }

    #[tokio::test]
    async fn test_configured_minimum() {
        let (payment, _, _) = PaymentParticipant::in_memory();
        let payment = payment.with_min_amount(Money::from_dollars(100));
        assert!(payment.check(&sample_order()).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_fills_totals() {
        let (payment, store, _) = PaymentParticipant::in_memory();
        let env = sample_order();

        let order = payment.apply(&env).await.unwrap();
        assert_eq!(order.total_amount, Money::from_dollars(35));
        assert_eq!(order.total_items, 4);

        let stored = store
            .find(env.order_id(), env.transaction_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn test_refund_once() {
        let (payment, store, ledger) = PaymentParticipant::in_memory();
        let env = sample_order();
        payment.apply(&env).await.unwrap();

        let first = payment.compensate(&env).await.unwrap();
        match first {
            Compensation::Reverted(Some(order)) => {
                assert_eq!(order.total_amount, Money::from_dollars(35));
                assert_eq!(order.total_items, 4);
            }
            other => panic!("unexpected compensation: {other:?}"),
        }
        assert_eq!(
            payment.compensate(&env).await.unwrap(),
            Compensation::AlreadyReverted
        );

        let stored = store
            .find(env.order_id(), env.transaction_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Refund);
        let records = ledger.find(env.order_id(), env.transaction_id()).await.unwrap();
        assert_eq!(records[0].new_value, Some(PaymentStatus::Refund));
    }

    #[tokio::test]
    async fn test_total_overflow_is_a_validation_failure() {
        let (payment, store, ledger) = PaymentParticipant::in_memory();
        let env = envelope(vec![OrderItem::new(
            "BOOKS",
            2,
            Money::from_cents(i64::MAX / 2 + 1),
        )]);

        let err = payment.check(&env).await.unwrap_err();
        assert!(matches!(err, ParticipantError::Validation(_)));
        assert!(err.to_string().contains("too large"));

        let items = envelope(vec![
            OrderItem::new("BOOKS", u32::MAX, Money::from_cents(1)),
            OrderItem::new("MUSIC", 1, Money::from_cents(1)),
        ]);
        assert!(matches!(
            payment.check(&items).await.unwrap_err(),
            ParticipantError::Validation(_)
        ));
        assert!(matches!(
            payment.apply(&items).await.unwrap_err(),
            ParticipantError::Validation(_)
        ));
        assert!(store.is_empty().await);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_ledger_failure_charges_nothing() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(FailingLedger::<PaymentStatus>::after(0));
        let payment = PaymentParticipant::new(Arc::new(store.clone()), ledger.clone());
        let env = sample_order();

        let err = payment.apply(&env).await.unwrap_err();
        assert!(matches!(err, ParticipantError::Store(_)));
        assert!(store.is_empty().await);
        assert!(ledger.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_releases_record() {
        let ledger = InMemoryLedger::<PaymentStatus>::new();
        let payment = PaymentParticipant::new(Arc::new(UnavailableStore), Arc::new(ledger.clone()));
        let env = sample_order();

        assert!(payment.apply(&env).await.is_err());
        let records = ledger.find(env.order_id(), env.transaction_id()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, CompensationState::NotExecuted);
        assert_eq!(
            payment.compensate(&env).await.unwrap(),
            Compensation::NothingToRevert
        );
    }

    #[tokio::test]
    async fn test_refund_without_payment() {
        let (payment, store, ledger) = PaymentParticipant::in_memory();
        let env = sample_order();

        assert_eq!(
            payment.compensate(&env).await.unwrap(),
            Compensation::NothingToRevert
        );
        assert!(store.is_empty().await);
        assert_eq!(ledger.len().await, 1);
    }
}
