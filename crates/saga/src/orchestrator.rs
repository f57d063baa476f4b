//! The orchestrator: the only component that decides where an envelope goes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Envelope, EventSource, SagaStatus};
use messaging::{Channel, DeadLetter, DeadLetterSink, EnvelopeHandler, Subscription, Topic};

use crate::Result;
use crate::error::SagaError;
use crate::order_saga::SAGA_TYPE;
use crate::transitions::TransitionTable;

/// Consumer group the orchestrator subscribes with.
pub const GROUP: &str = "orchestrator";

/// What happened to an envelope the orchestrator handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Published to a topic.
    Published(Topic, Envelope),
    /// Could not be routed and went to the dead letter sink.
    DeadLettered(String),
}

/// Routes envelopes between participants using a [`TransitionTable`].
pub struct Orchestrator<C: ?Sized> {
    channel: Arc<C>,
    table: Arc<TransitionTable>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl<C: ?Sized> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            table: Arc::clone(&self.table),
            dead_letters: Arc::clone(&self.dead_letters),
        }
    }
}

impl<C> Orchestrator<C>
where
    C: Channel + ?Sized + 'static,
{
    /// Creates an orchestrator for the order saga.
    pub fn new(channel: Arc<C>, dead_letters: Arc<dyn DeadLetterSink>) -> Result<Self> {
        Ok(Self::with_table(
            channel,
            Arc::new(TransitionTable::order_saga()?),
            dead_letters,
        ))
    }

    /// Creates an orchestrator with a custom routing table.
    pub fn with_table(
        channel: Arc<C>,
        table: Arc<TransitionTable>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            channel,
            table,
            dead_letters,
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Starts a saga: stamps the envelope and routes it to the first participant.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            saga_type = SAGA_TYPE,
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn start(&self, envelope: Envelope) -> Result<Routed> {
        let envelope = envelope.record(
            EventSource::Orchestrator,
            SagaStatus::Success,
            "Saga started!",
        );
        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(envelope_id = %envelope.id(), "saga started");
        self.route(Topic::StartSaga, envelope).await
    }

    /// Routes a participant report exactly as received.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn continue_saga(&self, envelope: Envelope) -> Result<Routed> {
        self.route(Topic::Orchestrator, envelope).await
    }

    /// Closes a saga that went through every participant.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn finish_success(&self, envelope: Envelope) -> Result<Routed> {
        let envelope = envelope.record(
            EventSource::Orchestrator,
            SagaStatus::Success,
            "Saga finished successfully!",
        );
        metrics::counter!("saga_completed").increment(1);
        self.record_duration(&envelope);
        tracing::info!("saga finished successfully");
        self.notify_ending(envelope).await
    }

    /// Closes a saga that was rolled back.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn finish_fail(&self, envelope: Envelope) -> Result<Routed> {
        let reason = envelope
            .last_history()
            .map(|h| h.message.clone())
            .unwrap_or_default();
        let envelope = envelope.record(
            EventSource::Orchestrator,
            SagaStatus::Fail,
            "Saga finished with errors!",
        );
        metrics::counter!("saga_failed").increment(1);
        self.record_duration(&envelope);
        tracing::warn!(%reason, "saga finished with errors");
        self.notify_ending(envelope).await
    }

    /// Dispatches an envelope consumed from one of the orchestrator's topics.
    pub async fn handle(&self, topic: Topic, envelope: Envelope) -> Result<Routed> {
        match topic {
            Topic::StartSaga => self.start(envelope).await,
            Topic::FinishSuccess => self.finish_success(envelope).await,
            Topic::FinishFail => self.finish_fail(envelope).await,
            _ => self.continue_saga(envelope).await,
        }
    }

    /// Subscribes the orchestrator to its four inbound topics.
    pub async fn subscribe(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::with_capacity(4);
        for topic in [
            Topic::StartSaga,
            Topic::Orchestrator,
            Topic::FinishSuccess,
            Topic::FinishFail,
        ] {
            let handler = Arc::new(OrchestratorHandler {
                orchestrator: self.clone(),
                topic,
            });
            subscriptions.push(self.channel.subscribe(topic, GROUP, handler).await?);
        }
        tracing::info!("orchestrator subscribed");
        Ok(subscriptions)
    }

    async fn route(&self, consumed_from: Topic, envelope: Envelope) -> Result<Routed> {
        match self.table.resolve(&envelope) {
            Ok(topic) => {
                self.channel.publish(topic, &envelope).await?;
                Ok(Routed::Published(topic, envelope))
            }
            Err(e) if e.is_routing_failure() => self.dead_letter(consumed_from, &envelope, e).await,
            Err(e) => Err(e),
        }
    }

    async fn dead_letter(
        &self,
        consumed_from: Topic,
        envelope: &Envelope,
        error: SagaError,
    ) -> Result<Routed> {
        let reason = error.to_string();
        tracing::error!(
            envelope_id = %envelope.id(),
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
            error = %reason,
            "routing failed, envelope dead-lettered"
        );
        metrics::counter!("saga_routing_failures").increment(1);

        let letter = DeadLetter::for_envelope(consumed_from, GROUP, envelope, reason.clone())?;
        self.dead_letters.send(letter).await?;
        Ok(Routed::DeadLettered(reason))
    }

    async fn notify_ending(&self, envelope: Envelope) -> Result<Routed> {
        self.channel.publish(Topic::NotifyEnding, &envelope).await?;
        Ok(Routed::Published(Topic::NotifyEnding, envelope))
    }

    fn record_duration(&self, envelope: &Envelope) {
        let elapsed = Utc::now() - envelope.created_at();
        let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
        metrics::histogram!("saga_duration_seconds").record(seconds);
    }
}

struct OrchestratorHandler<C: ?Sized> {
    orchestrator: Orchestrator<C>,
    topic: Topic,
}

#[async_trait]
impl<C> EnvelopeHandler for OrchestratorHandler<C>
where
    C: Channel + ?Sized + 'static,
{
    async fn handle(&self, envelope: Envelope) -> messaging::Result<()> {
        self.orchestrator.handle(self.topic, envelope).await?;
        Ok(())
    }
}
