//! The channel abstraction every saga component talks through.

use std::sync::Arc;

use async_trait::async_trait;
use common::Envelope;
use tokio::task::JoinHandle;

use crate::Result;
use crate::topic::Topic;

/// Handles envelopes delivered from a subscription.
///
/// Returning an error asks the channel to redeliver the envelope; business
/// failures must be encoded in the envelope itself and never returned here.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<()>;
}

/// Named publish/subscribe channels with at-least-once delivery.
///
/// Each consumer group attached to a topic receives every message published
/// to it. Within a topic, messages with the same order id are delivered in
/// publish order; nothing is guaranteed across topics.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publishes an envelope to a topic, keyed by its order id.
    async fn publish(&self, topic: Topic, envelope: &Envelope) -> Result<()>;

    /// Attaches a consumer group to a topic.
    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<Subscription>;
}

/// A running subscription. Dropping it leaves the consumers running;
/// call [`Subscription::unsubscribe`] to stop them.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    group: String,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps the consumer tasks backing a subscription.
    pub fn new(topic: Topic, group: impl Into<String>, workers: Vec<JoinHandle<()>>) -> Self {
        Self {
            topic,
            group: group.into(),
            workers,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Number of consumer tasks serving this subscription.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops every consumer task of this subscription.
    pub fn unsubscribe(self) {
        tracing::debug!(topic = %self.topic, group = %self.group, "unsubscribing");
        for worker in &self.workers {
            worker.abort();
        }
    }
}
