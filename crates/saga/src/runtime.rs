//! Wires the orchestrator and the participants onto one channel.

use std::sync::Arc;

use messaging::{Channel, DeadLetterSink, Subscription};
use participants::{
    InventoryParticipant, ParticipantHandler, PaymentParticipant, ProductValidation,
};

use crate::Result;
use crate::orchestrator::Orchestrator;

/// The participants of the order saga.
pub struct Participants {
    pub validation: ProductValidation,
    pub payment: PaymentParticipant,
    pub inventory: InventoryParticipant,
}

/// A running saga: every component subscribed to its topics.
pub struct SagaRuntime {
    subscriptions: Vec<Subscription>,
}

impl SagaRuntime {
    /// Subscribes the orchestrator and every participant.
    pub async fn start<C>(
        channel: Arc<C>,
        dead_letters: Arc<dyn DeadLetterSink>,
        participants: Participants,
    ) -> Result<Self>
    where
        C: Channel + ?Sized + 'static,
    {
        let orchestrator = Orchestrator::new(Arc::clone(&channel), dead_letters)?;
        let mut subscriptions = orchestrator.subscribe().await?;

        let (forward, rollback) =
            ParticipantHandler::new(Arc::new(participants.validation), Arc::clone(&channel))
                .subscribe()
                .await?;
        subscriptions.extend([forward, rollback]);

        let (forward, rollback) =
            ParticipantHandler::new(Arc::new(participants.payment), Arc::clone(&channel))
                .subscribe()
                .await?;
        subscriptions.extend([forward, rollback]);

        let (forward, rollback) =
            ParticipantHandler::new(Arc::new(participants.inventory), channel)
                .subscribe()
                .await?;
        subscriptions.extend([forward, rollback]);

        tracing::info!(subscriptions = subscriptions.len(), "saga runtime started");
        Ok(Self { subscriptions })
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Stops every consumer.
    pub fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        tracing::info!("saga runtime stopped");
    }
}
