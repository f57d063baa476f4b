use thiserror::Error;

use crate::topic::Topic;

/// Errors that can occur when publishing or consuming saga messages.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A message could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The channel name is not one of the saga topics.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// A consumer group is already attached to the topic.
    #[error("Consumer group '{group}' is already subscribed to {topic}")]
    AlreadySubscribed { topic: Topic, group: String },

    /// A subscriber failed to handle a delivery; eligible for redelivery.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Waiting for messages on a topic timed out.
    #[error("Timed out waiting for {expected} message(s) on {topic}, saw {actual}")]
    Timeout {
        topic: Topic,
        expected: usize,
        actual: usize,
    },
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
