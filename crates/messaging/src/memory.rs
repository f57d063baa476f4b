use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Envelope, OrderId};
use futures_util::FutureExt;
use tokio::sync::{Notify, RwLock, mpsc};

use crate::channel::{Channel, EnvelopeHandler, Subscription};
use crate::codec;
use crate::dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetters};
use crate::topic::Topic;
use crate::{MessagingError, Result};

/// Delivery settings for the in-memory channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Consumer tasks per subscription. Messages are partitioned across
    /// them by order id.
    pub workers: usize,
    /// Delivery attempts before a failing message is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff: Duration,
    /// Published envelopes kept per topic for [`InMemoryChannel::published`].
    /// The oldest are dropped first; `0` keeps none.
    pub retained_per_topic: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_delivery_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            retained_per_topic: 0,
        }
    }
}

/// Envelopes kept per topic by [`InMemoryChannel::recording`].
pub const RECORDING_CAPACITY: usize = 10_000;

type Partition = mpsc::UnboundedSender<Arc<str>>;

#[derive(Default)]
struct TopicState {
    published: usize,
    retained: VecDeque<Arc<str>>,
    groups: HashMap<String, Vec<Partition>>,
}

impl TopicState {
    fn retain(&mut self, payload: &Arc<str>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.retained.len() >= capacity {
            self.retained.pop_front();
        }
        self.retained.push_back(Arc::clone(payload));
    }
}

/// In-process broker implementing [`Channel`].
///
/// Every published envelope is encoded to JSON and handed to each consumer
/// group. Inside a group the message goes to the partition picked by
/// hashing the order id, so one saga's messages are handled in order while
/// different sagas run concurrently. Only a count of published messages is
/// kept, plus the last [`ChannelConfig::retained_per_topic`] payloads.
#[derive(Clone)]
pub struct InMemoryChannel {
    topics: Arc<RwLock<HashMap<Topic, TopicState>>>,
    config: ChannelConfig,
    dead_letters: Arc<dyn DeadLetterSink>,
    published: Arc<Notify>,
}

impl InMemoryChannel {
    /// Creates a channel with default settings and its own dead letter sink.
    pub fn new() -> Self {
        Self::with_config(
            ChannelConfig::default(),
            Arc::new(InMemoryDeadLetters::new()),
        )
    }

    /// Like [`InMemoryChannel::new`], but keeps up to [`RECORDING_CAPACITY`]
    /// envelopes per topic so they can be inspected.
    pub fn recording() -> Self {
        Self::with_config(
            ChannelConfig {
                retained_per_topic: RECORDING_CAPACITY,
                ..ChannelConfig::default()
            },
            Arc::new(InMemoryDeadLetters::new()),
        )
    }

    /// Creates a channel with explicit settings and dead letter sink.
    pub fn with_config(config: ChannelConfig, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            config,
            dead_letters,
            published: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Returns the retained envelopes of a topic, in publish order.
    pub async fn published(&self, topic: Topic) -> Result<Vec<Envelope>> {
        let topics = self.topics.read().await;
        topics
            .get(&topic)
            .map(|state| state.retained.iter().map(|p| codec::decode(p)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Returns the number of envelopes ever published to a topic.
    pub async fn published_count(&self, topic: Topic) -> usize {
        self.topics
            .read()
            .await
            .get(&topic)
            .map_or(0, |state| state.published)
    }

    /// Waits until at least `count` envelopes have been published to a topic,
    /// then returns the retained ones.
    pub async fn wait_for(
        &self,
        topic: Topic,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Envelope>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.published_count(topic).await >= count {
                return self.published(topic).await;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(MessagingError::Timeout {
                    topic,
                    expected: count,
                    actual: self.published_count(topic).await,
                });
            }
        }
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn partition_for(order_id: OrderId, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    order_id.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[async_trait]
impl Channel for InMemoryChannel {
    async fn publish(&self, topic: Topic, envelope: &Envelope) -> Result<()> {
        let payload: Arc<str> = Arc::from(codec::encode(envelope)?);
        let order_id = envelope.order_id();

        {
            let mut topics = self.topics.write().await;
            let state = topics.entry(topic).or_default();
            state.published += 1;
            state.retain(&payload, self.config.retained_per_topic);
            state.groups.retain(|group, partitions| {
                let index = partition_for(order_id, partitions.len());
                if partitions[index].send(Arc::clone(&payload)).is_ok() {
                    return true;
                }
                tracing::debug!(%topic, %group, "dropping stopped consumer group");
                false
            });
        }

        tracing::debug!(
            %topic,
            %order_id,
            transaction_id = %envelope.transaction_id(),
            "envelope published"
        );
        metrics::counter!("channel_published_total", "topic" => topic.as_str()).increment(1);
        self.published.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<Subscription> {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic).or_default();
        if state.groups.contains_key(group) {
            return Err(MessagingError::AlreadySubscribed {
                topic,
                group: group.to_string(),
            });
        }

        let worker_count = self.config.workers.max(1);
        let mut partitions = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for partition in 0..worker_count {
            let (sender, receiver) = mpsc::unbounded_channel();
            partitions.push(sender);
            let consumer = Consumer {
                topic,
                group: group.to_string(),
                handler: Arc::clone(&handler),
                dead_letters: Arc::clone(&self.dead_letters),
                max_attempts: self.config.max_delivery_attempts.max(1),
                backoff: self.config.retry_backoff,
            };
            workers.push(tokio::spawn(consumer.run(partition, receiver)));
        }
        state.groups.insert(group.to_string(), partitions);

        tracing::info!(%topic, group, workers = worker_count, "consumer group subscribed");
        Ok(Subscription::new(topic, group, workers))
    }
}

/// One consumer task of a subscription.
struct Consumer {
    topic: Topic,
    group: String,
    handler: Arc<dyn EnvelopeHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    max_attempts: u32,
    backoff: Duration,
}

impl Consumer {
    async fn run(self, partition: usize, mut receiver: mpsc::UnboundedReceiver<Arc<str>>) {
        while let Some(payload) = receiver.recv().await {
            self.deliver(&payload).await;
        }
        tracing::debug!(topic = %self.topic, group = %self.group, partition, "consumer stopped");
    }

    async fn deliver(&self, payload: &str) {
        let envelope = match codec::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.dead_letter(payload, e.to_string(), 0).await;
                return;
            }
        };

        for attempt in 1..=self.max_attempts {
            let outcome = AssertUnwindSafe(self.handler.handle(envelope.clone()))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handler panicked".to_string(),
            };

            if attempt == self.max_attempts {
                self.dead_letter(payload, error, attempt).await;
                return;
            }

            tracing::warn!(
                topic = %self.topic,
                group = %self.group,
                order_id = %envelope.order_id(),
                attempt,
                %error,
                "delivery failed, retrying"
            );
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }

    async fn dead_letter(&self, payload: &str, error: String, attempts: u32) {
        let letter = DeadLetter::new(self.topic, self.group.clone(), payload, error, attempts);
        if let Err(e) = self.dead_letters.send(letter).await {
            tracing::error!(topic = %self.topic, group = %self.group, error = %e, "failed to store dead letter");
        }
    }
}
