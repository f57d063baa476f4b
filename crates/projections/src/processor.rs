//! Ending notification processor: feeds `notify-ending` into a saga log.

use std::sync::Arc;

use async_trait::async_trait;
use common::Envelope;
use messaging::{Channel, EnvelopeHandler, Subscription, Topic};

use crate::Result;
use crate::saga_log::{SagaLog, SagaLogEntry};

/// Consumer group the processor subscribes with.
pub const GROUP: &str = "order-service";

/// Records every ending notification in a [`SagaLog`].
pub struct EndingProcessor<L: ?Sized> {
    log: Arc<L>,
}

impl<L: ?Sized> Clone for EndingProcessor<L> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<L> EndingProcessor<L>
where
    L: SagaLog + ?Sized + 'static,
{
    pub fn new(log: Arc<L>) -> Self {
        Self { log }
    }

    /// Records one ending notification.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn process(&self, envelope: Envelope) -> Result<SagaLogEntry> {
        let entry = self.log.record(envelope).await?;
        metrics::counter!("saga_log_records_total").increment(1);
        tracing::info!(
            status = ?entry.status,
            history = entry.envelope.history().len(),
            "saga outcome recorded"
        );
        Ok(entry)
    }

    /// Subscribes the processor to the ending notification topic.
    pub async fn subscribe<C>(&self, channel: &C) -> Result<Subscription>
    where
        C: Channel + ?Sized,
    {
        let subscription = channel
            .subscribe(Topic::NotifyEnding, GROUP, Arc::new(self.clone()))
            .await?;
        Ok(subscription)
    }
}

#[async_trait]
impl<L> EnvelopeHandler for EndingProcessor<L>
where
    L: SagaLog + ?Sized + 'static,
{
    async fn handle(&self, envelope: Envelope) -> messaging::Result<()> {
        self.process(envelope).await?;
        Ok(())
    }
}
