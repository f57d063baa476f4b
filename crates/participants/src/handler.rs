//! The processing template every participant runs.
//!
//! A participant only supplies its domain logic through [`Participant`].
//! [`ParticipantHandler`] owns the rest of the contract: the idempotency
//! guard, turning failures into saga statuses, appending exactly one history
//! entry per envelope, and always reporting back to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Envelope, EventSource, Order, OrderId, SagaStatus, TransactionId};
use messaging::{Channel, EnvelopeHandler, Subscription, Topic};

use crate::Result;
use crate::error::ParticipantError;

/// Outcome of a compensation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Side effects were undone. Carries the order snapshot to forward when
    /// compensating changed it.
    Reverted(Option<Order>),
    /// An earlier rollback already undid the side effects.
    AlreadyReverted,
    /// No forward action was ever recorded for the attempt.
    NothingToRevert,
}

/// Domain logic of one saga participant.
#[async_trait]
pub trait Participant: Send + Sync + 'static {
    /// The source stamped on envelopes this participant produces.
    fn source(&self) -> EventSource;

    /// Human readable name used in rollback messages, e.g. "payment".
    fn name(&self) -> &'static str;

    /// What the forward action does, used as "Fail to {action}: ...".
    fn action(&self) -> &'static str;

    /// History message for a successful forward action.
    fn success_message(&self) -> &'static str;

    /// Topic carrying forward requests.
    fn forward_topic(&self) -> Topic;

    /// Topic carrying compensation requests.
    fn rollback_topic(&self) -> Topic;

    /// Returns true if this attempt already left a record.
    async fn already_processed(
        &self,
        order_id: OrderId,
        transaction_id: &TransactionId,
    ) -> Result<bool>;

    /// Checks the order against current state without changing anything.
    async fn check(&self, envelope: &Envelope) -> Result<()>;

    /// Performs the forward action, records how to undo it and returns the
    /// order snapshot to forward.
    async fn apply(&self, envelope: &Envelope) -> Result<Order>;

    /// Undoes the forward action of this attempt, if there was one.
    async fn compensate(&self, envelope: &Envelope) -> Result<Compensation>;
}

/// Runs a [`Participant`] against a [`Channel`].
pub struct ParticipantHandler<P: ?Sized, C: ?Sized> {
    participant: Arc<P>,
    channel: Arc<C>,
}

impl<P: ?Sized, C: ?Sized> Clone for ParticipantHandler<P, C> {
    fn clone(&self) -> Self {
        Self {
            participant: Arc::clone(&self.participant),
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<P, C> ParticipantHandler<P, C>
where
    P: Participant + ?Sized,
    C: Channel + ?Sized + 'static,
{
    pub fn new(participant: Arc<P>, channel: Arc<C>) -> Self {
        Self {
            participant,
            channel,
        }
    }

    /// Handles a forward request and reports the outcome to the orchestrator.
    ///
    /// Returns the envelope that was published. Only publish failures are
    /// returned as errors.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            source = %self.participant.source(),
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn process(&self, envelope: Envelope) -> Result<Envelope> {
        let next = self.process_envelope(envelope).await;
        self.channel.publish(Topic::Orchestrator, &next).await?;
        Ok(next)
    }

    /// Handles a compensation request and reports back to the orchestrator.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            source = %self.participant.source(),
            order_id = %envelope.order_id(),
            transaction_id = %envelope.transaction_id(),
        )
    )]
    pub async fn rollback(&self, envelope: Envelope) -> Result<Envelope> {
        let next = self.rollback_envelope(envelope).await;
        self.channel.publish(Topic::Orchestrator, &next).await?;
        Ok(next)
    }

    /// Runs the forward action and returns the resulting envelope without
    /// publishing it.
    pub async fn process_envelope(&self, envelope: Envelope) -> Envelope {
        let source = self.participant.source();
        let next = match self.forward(&envelope).await {
            Ok(order) => {
                tracing::info!("forward action succeeded");
                envelope.with_payload(order).record(
                    source,
                    SagaStatus::Success,
                    self.participant.success_message(),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "forward action failed");
                envelope.record(
                    source,
                    SagaStatus::RollbackPending,
                    format!("Fail to {}: {}", self.participant.action(), e),
                )
            }
        };

        let status = next.status().map_or("UNKNOWN", |s| s.as_str());
        metrics::counter!(
            "participant_forward_total",
            "source" => source.as_str(),
            "status" => status
        )
        .increment(1);
        next
    }

    /// Runs the compensation and returns the resulting envelope without
    /// publishing it.
    pub async fn rollback_envelope(&self, envelope: Envelope) -> Envelope {
        let source = self.participant.source();
        let name = self.participant.name();

        let (envelope, message) = match self.participant.compensate(&envelope).await {
            Ok(Compensation::Reverted(order)) => {
                tracing::info!("rollback executed");
                let envelope = match order {
                    Some(order) => envelope.with_payload(order),
                    None => envelope,
                };
                (envelope, format!("Rollback executed for {name}!"))
            }
            Ok(Compensation::AlreadyReverted) => {
                tracing::info!("rollback already executed, nothing to do");
                (envelope, format!("Rollback already executed for {name}"))
            }
            Ok(Compensation::NothingToRevert) => {
                tracing::info!("no forward action recorded, nothing to roll back");
                (envelope, format!("Nothing to roll back for {name}"))
            }
            Err(e) => {
                tracing::error!(error = %e, "rollback failed");
                (envelope, format!("Rollback not executed for {name}: {e}"))
            }
        };

        metrics::counter!("participant_rollback_total", "source" => source.as_str()).increment(1);
        envelope.record(source, SagaStatus::Fail, message)
    }

    async fn forward(&self, envelope: &Envelope) -> Result<Order> {
        let order_id = envelope.order_id();
        let transaction_id = envelope.transaction_id();
        if self
            .participant
            .already_processed(order_id, transaction_id)
            .await?
        {
            return Err(ParticipantError::AlreadyProcessed {
                order_id,
                transaction_id: transaction_id.clone(),
            });
        }

        self.participant.check(envelope).await?;
        self.participant.apply(envelope).await
    }
}

impl<P, C> ParticipantHandler<P, C>
where
    P: Participant + ?Sized,
    C: Channel + ?Sized + 'static,
{
    /// Subscribes the forward and rollback entry points to the participant's
    /// topics, using the participant's name as the consumer group.
    pub async fn subscribe(&self) -> Result<(Subscription, Subscription)> {
        let group = self.participant.source().as_str();

        let forward = self
            .channel
            .subscribe(
                self.participant.forward_topic(),
                group,
                Arc::new(ForwardHandler(self.clone())),
            )
            .await?;
        let rollback = self
            .channel
            .subscribe(
                self.participant.rollback_topic(),
                group,
                Arc::new(RollbackHandler(self.clone())),
            )
            .await?;

        tracing::info!(
            source = %self.participant.source(),
            forward = %self.participant.forward_topic(),
            rollback = %self.participant.rollback_topic(),
            "participant subscribed"
        );
        Ok((forward, rollback))
    }
}

struct ForwardHandler<P: ?Sized, C: ?Sized>(ParticipantHandler<P, C>);

#[async_trait]
impl<P, C> EnvelopeHandler for ForwardHandler<P, C>
where
    P: Participant + ?Sized,
    C: Channel + ?Sized + 'static,
{
    async fn handle(&self, envelope: Envelope) -> messaging::Result<()> {
        self.0.process(envelope).await?;
        Ok(())
    }
}

struct RollbackHandler<P: ?Sized, C: ?Sized>(ParticipantHandler<P, C>);

#[async_trait]
impl<P, C> EnvelopeHandler for RollbackHandler<P, C>
where
    P: Participant + ?Sized,
    C: Channel + ?Sized + 'static,
{
    async fn handle(&self, envelope: Envelope) -> messaging::Result<()> {
        self.0.rollback(envelope).await?;
        Ok(())
    }
}
