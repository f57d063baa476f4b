//! Saga error types.

use common::{EnvelopeId, EventSource, OrderId, SagaStatus, TransactionId};
use messaging::MessagingError;
use participants::ParticipantError;
use thiserror::Error;

/// Errors that can occur while building the routing table or routing envelopes.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The envelope carries no source or no status to route on.
    #[error(
        "Envelope {envelope_id} has no source or status (order {order_id}, transaction {transaction_id})"
    )]
    MissingRoutingKey {
        envelope_id: EnvelopeId,
        order_id: OrderId,
        transaction_id: TransactionId,
    },

    /// No transition is configured for the envelope's source and status.
    #[error("Topic not found for source {event_source} and status {status}")]
    TopicNotFound {
        event_source: EventSource,
        status: SagaStatus,
    },

    /// Two transitions share the same source and status.
    #[error("Duplicate transition for source {event_source} and status {status}")]
    DuplicateTransition {
        event_source: EventSource,
        status: SagaStatus,
    },

    /// A participant of the chain has no transition for a status it can report.
    #[error("Missing transition for source {event_source} and status {status}")]
    MissingTransition {
        event_source: EventSource,
        status: SagaStatus,
    },

    /// A participant could not be wired to the channel.
    #[error("Participant error: {0}")]
    Participant(#[from] ParticipantError),

    /// Publishing or dead-lettering failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl SagaError {
    /// Routing failures are permanent for the envelope that caused them.
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self,
            SagaError::MissingRoutingKey { .. } | SagaError::TopicNotFound { .. }
        )
    }
}

impl From<SagaError> for MessagingError {
    fn from(error: SagaError) -> Self {
        match error {
            SagaError::Messaging(e) => e,
            other => MessagingError::Handler(other.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
