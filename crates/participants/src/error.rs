//! Participant error types.

use common::{ModelError, OrderId, TransactionId};
use messaging::MessagingError;
use thiserror::Error;

/// Errors raised while a participant processes or compensates an order.
///
/// Everything except [`ParticipantError::Messaging`] is turned into a saga
/// status and a history entry; only channel failures leave the handler.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// The idempotency guard found a record for this attempt.
    #[error("There's another transaction for this validation: order {order_id}, transaction {transaction_id}")]
    AlreadyProcessed {
        order_id: OrderId,
        transaction_id: TransactionId,
    },

    /// The order violates a domain rule.
    #[error("{0}")]
    Validation(String),

    /// A record the participant depends on does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A concurrent update changed the state this update was based on.
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Publishing the outcome failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// Amounts that do not fit are a property of the order, not of the store.
impl From<ModelError> for ParticipantError {
    fn from(error: ModelError) -> Self {
        ParticipantError::Validation(error.to_string())
    }
}

impl From<ParticipantError> for MessagingError {
    fn from(error: ParticipantError) -> Self {
        match error {
            ParticipantError::Messaging(e) => e,
            other => MessagingError::Handler(other.to_string()),
        }
    }
}

/// Convenience type alias for participant results.
pub type Result<T> = std::result::Result<T, ParticipantError>;
