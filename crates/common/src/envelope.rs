//! The envelope carried on every saga channel.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::order::Order;
use crate::types::{EnvelopeId, OrderId, TransactionId};

/// Outcome of the last transition recorded on an envelope.
///
/// The status describes only the most recent step, never the saga's
/// final disposition:
/// ```text
/// SUCCESS           forward action completed, go to the next participant
/// ROLLBACK_PENDING  forward action failed before committing, compensate predecessors
/// FAIL              compensation ran, keep walking backward
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Success,
    RollbackPending,
    Fail,
}

impl SagaStatus {
    /// All statuses, in protocol order.
    pub const ALL: [SagaStatus; 3] = [
        SagaStatus::Success,
        SagaStatus::RollbackPending,
        SagaStatus::Fail,
    ];

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Success => "SUCCESS",
            SagaStatus::RollbackPending => "ROLLBACK_PENDING",
            SagaStatus::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SagaStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus(s.to_string()))
    }
}

/// The component that produced the current envelope state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    #[serde(rename = "ORCHESTRATOR")]
    Orchestrator,
    #[serde(rename = "PRODUCT_VALIDATION_SERVICE")]
    ProductValidation,
    #[serde(rename = "PAYMENT_SERVICE")]
    Payment,
    #[serde(rename = "INVENTORY_SERVICE")]
    Inventory,
}

impl EventSource {
    /// All known sources.
    pub const ALL: [EventSource; 4] = [
        EventSource::Orchestrator,
        EventSource::ProductValidation,
        EventSource::Payment,
        EventSource::Inventory,
    ];

    /// Returns the wire name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Orchestrator => "ORCHESTRATOR",
            EventSource::ProductValidation => "PRODUCT_VALIDATION_SERVICE",
            EventSource::Payment => "PAYMENT_SERVICE",
            EventSource::Inventory => "INVENTORY_SERVICE",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| ModelError::UnknownSource(s.to_string()))
    }
}

/// One entry of the saga audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub source: EventSource,
    pub status: SagaStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// The unit of work flowing through every saga channel.
///
/// Envelopes are values: each hop consumes the envelope it received and
/// produces a new one through [`Envelope::record`] or
/// [`Envelope::with_payload`]. The history can only be appended to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    order_id: OrderId,
    transaction_id: TransactionId,
    payload: Order,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    status: Option<SagaStatus>,
    #[serde(default)]
    history: Vec<History>,
    created_at: DateTime<Utc>,
}

impl Envelope {
    /// Creates the initial envelope for an order attempt.
    ///
    /// Source and status stay empty until the orchestrator starts the saga.
    pub fn new(order: Order) -> Self {
        Self {
            id: EnvelopeId::new(),
            order_id: order.id,
            transaction_id: order.transaction_id.clone(),
            payload: order,
            source: None,
            status: None,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn payload(&self) -> &Order {
        &self.payload
    }

    pub fn source(&self) -> Option<EventSource> {
        self.source
    }

    pub fn status(&self) -> Option<SagaStatus> {
        self.status
    }

    /// Returns the audit trail, oldest entry first.
    pub fn history(&self) -> &[History] {
        &self.history
    }

    /// Returns the most recent history entry.
    pub fn last_history(&self) -> Option<&History> {
        self.history.last()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Records a transition: sets source and status and appends exactly one
    /// history entry describing it.
    pub fn record(
        mut self,
        source: EventSource,
        status: SagaStatus,
        message: impl Into<String>,
    ) -> Self {
        self.source = Some(source);
        self.status = Some(status);
        self.history.push(History {
            source,
            status,
            message: message.into(),
            created_at: Utc::now(),
        });
        self
    }

    /// Replaces the order snapshot, keeping everything else.
    pub fn with_payload(mut self, payload: Order) -> Self {
        self.payload = payload;
        self
    }
}
