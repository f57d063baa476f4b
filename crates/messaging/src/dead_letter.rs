//! Dead letters: messages the saga gave up on.
//!
//! A message ends up here when it cannot be decoded, when its subscriber
//! keeps failing after the configured number of delivery attempts, or when
//! the orchestrator cannot route it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Envelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::codec;
use crate::topic::Topic;

/// A message that could not be processed, kept for manual review and replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Topic the message was consumed from.
    pub topic: Topic,
    /// Consumer group that gave up on it.
    pub group: String,
    /// Raw wire payload, kept verbatim.
    pub payload: String,
    /// Why processing stopped.
    pub error: String,
    /// How many delivery attempts were made.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Creates a dead letter for a raw payload.
    pub fn new(
        topic: Topic,
        group: impl Into<String>,
        payload: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            topic,
            group: group.into(),
            payload: payload.into(),
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    /// Creates a dead letter for an envelope that was decoded but not processed.
    pub fn for_envelope(
        topic: Topic,
        group: impl Into<String>,
        envelope: &Envelope,
        error: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(topic, group, codec::encode(envelope)?, error, 1))
    }

    /// Decodes the payload back into an envelope, if it is one.
    pub fn envelope(&self) -> Result<Envelope> {
        codec::decode(&self.payload)
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Stores a dead letter.
    async fn send(&self, letter: DeadLetter) -> Result<()>;
}

/// In-memory dead letter sink.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetters {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetters {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all dead letters received so far, oldest first.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    /// Returns the number of dead letters received.
    pub async fn count(&self) -> usize {
        self.letters.read().await.len()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        tracing::error!(
            topic = %letter.topic,
            group = %letter.group,
            attempts = letter.attempts,
            error = %letter.error,
            "message dead-lettered"
        );
        metrics::counter!("channel_dead_letters_total", "topic" => letter.topic.as_str())
            .increment(1);
        self.letters.write().await.push(letter);
        Ok(())
    }
}
