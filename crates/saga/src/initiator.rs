//! Saga initiator: turns an order request into the first envelope.

use std::sync::Arc;

use common::{Envelope, Order, OrderId, OrderItem, TransactionId};
use messaging::{Channel, Topic};

use crate::Result;

/// Places orders by publishing their initial envelope to `start-saga`.
pub struct Initiator<C: ?Sized> {
    channel: Arc<C>,
}

impl<C: ?Sized> Clone for Initiator<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<C> Initiator<C>
where
    C: Channel + ?Sized,
{
    pub fn new(channel: Arc<C>) -> Self {
        Self { channel }
    }

    /// Creates a new order attempt and starts its saga.
    ///
    /// Returns the envelope as published; its order id and transaction id
    /// identify the saga in the read model.
    pub async fn place_order(&self, products: Vec<OrderItem>) -> Result<Envelope> {
        let order = Order::new(OrderId::new(), TransactionId::generate(), products);
        let envelope = Envelope::new(order);

        self.channel.publish(Topic::StartSaga, &envelope).await?;
        tracing::info!(
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
            items = envelope.payload().products.len(),
            "order placed"
        );
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use messaging::InMemoryChannel;

    #[tokio::test]
    async fn test_place_order_publishes_fresh_envelope() {
        let channel = InMemoryChannel::recording();
        let initiator = Initiator::new(Arc::new(channel.clone()));

        let envelope = initiator
            .place_order(vec![OrderItem::new("MOVIES", 2, Money::from_dollars(3))])
            .await
            .unwrap();

        assert!(envelope.history().is_empty());
        assert!(envelope.status().is_none());
        assert!(!envelope.transaction_id().is_empty());
        assert_eq!(
            channel.published(Topic::StartSaga).await.unwrap(),
            vec![envelope]
        );
    }

    #[tokio::test]
    async fn test_each_order_gets_its_own_ids() {
        let initiator = Initiator::new(Arc::new(InMemoryChannel::new()));
        let items = vec![OrderItem::new("MUSIC", 1, Money::from_dollars(1))];

        let first = initiator.place_order(items.clone()).await.unwrap();
        let second = initiator.place_order(items).await.unwrap();

        assert_ne!(first.order_id(), second.order_id());
        assert_ne!(first.transaction_id(), second.transaction_id());
    }
}
