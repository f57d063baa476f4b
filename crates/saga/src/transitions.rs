//! Routing table: (last source, last status) to next topic.

use std::collections::HashSet;

use common::{Envelope, EventSource, SagaStatus};
use messaging::Topic;

use crate::error::SagaError;
use crate::order_saga;
use crate::Result;

/// One routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub source: EventSource,
    pub status: SagaStatus,
    pub topic: Topic,
}

/// A validated set of routing rules.
///
/// Lookups are pure: the same source and status always resolve to the same
/// topic. Building the table rejects duplicate keys.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rows: Vec<Transition>,
}

impl TransitionTable {
    /// Builds a table from rules, rejecting duplicate (source, status) keys.
    pub fn new(rows: &[Transition]) -> Result<Self> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in rows {
            if !seen.insert((row.source, row.status)) {
                return Err(SagaError::DuplicateTransition {
                    event_source: row.source,
                    status: row.status,
                });
            }
        }
        Ok(Self {
            rows: rows.to_vec(),
        })
    }

    /// Builds and checks the order saga table.
    pub fn order_saga() -> Result<Self> {
        let table = Self::new(&order_saga::TRANSITIONS)?;
        table.check_complete(&order_saga::CHAIN)?;
        Ok(table)
    }

    /// Verifies that every participant of `chain` can report every status and
    /// that the orchestrator can start and abort the saga.
    pub fn check_complete(&self, chain: &[EventSource]) -> Result<()> {
        let required = chain
            .iter()
            .flat_map(|source| SagaStatus::ALL.map(|status| (*source, status)))
            .chain([
                (EventSource::Orchestrator, SagaStatus::Success),
                (EventSource::Orchestrator, SagaStatus::Fail),
            ]);

        for (source, status) in required {
            if self.lookup(source, status).is_none() {
                return Err(SagaError::MissingTransition {
                    event_source: source,
                    status,
                });
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> &[Transition] {
        &self.rows
    }

    /// Returns the topic of the first rule matching source and status.
    pub fn lookup(&self, source: EventSource, status: SagaStatus) -> Option<Topic> {
        self.rows
            .iter()
            .find(|row| row.source == source && row.status == status)
            .map(|row| row.topic)
    }

    /// Resolves the next topic for an envelope and logs the decision.
    pub fn resolve(&self, envelope: &Envelope) -> Result<Topic> {
        let (Some(source), Some(status)) = (envelope.source(), envelope.status()) else {
            return Err(SagaError::MissingRoutingKey {
                envelope_id: envelope.id(),
                order_id: envelope.order_id(),
                transaction_id: envelope.transaction_id().clone(),
            });
        };

        let topic = self
            .lookup(source, status)
            .ok_or(SagaError::TopicNotFound {
                event_source: source,
                status,
            })?;

        let order_id = envelope.order_id();
        let transaction_id = envelope.transaction_id();
        match status {
            SagaStatus::Success => {
                tracing::info!(%order_id, %transaction_id, %source, %topic, "routing to next topic")
            }
            SagaStatus::RollbackPending => {
                tracing::info!(%order_id, %transaction_id, %source, %topic, "rolling back")
            }
            SagaStatus::Fail => {
                tracing::info!(%order_id, %transaction_id, %source, %topic, "rolling back previous")
            }
        }
        Ok(topic)
    }
}
