//! The order saga definition.
//!
//! Participants run in the order of [`CHAIN`]. Every envelope a participant
//! reports is routed by [`TRANSITIONS`]: forward on `SUCCESS`, to the
//! previous participant's rollback topic otherwise, and to `finish-fail`
//! once no predecessor is left.

use common::{EventSource, SagaStatus};
use messaging::Topic;

use crate::transitions::Transition;

/// Saga type identifier used in logs.
pub const SAGA_TYPE: &str = "OrderSaga";

/// Participants in forward order.
pub const CHAIN: [EventSource; 3] = [
    EventSource::ProductValidation,
    EventSource::Payment,
    EventSource::Inventory,
];

const fn row(source: EventSource, status: SagaStatus, topic: Topic) -> Transition {
    Transition {
        source,
        status,
        topic,
    }
}

/// Routing rules of the order saga, looked up first match wins.
pub static TRANSITIONS: [Transition; 11] = [
    row(EventSource::Orchestrator, SagaStatus::Success, Topic::ProductValidationSuccess),
    row(EventSource::Orchestrator, SagaStatus::Fail, Topic::FinishFail),
    row(EventSource::ProductValidation, SagaStatus::Success, Topic::PaymentSuccess),
    row(EventSource::ProductValidation, SagaStatus::RollbackPending, Topic::FinishFail),
    row(EventSource::ProductValidation, SagaStatus::Fail, Topic::FinishFail),
    row(EventSource::Payment, SagaStatus::Success, Topic::InventorySuccess),
    row(EventSource::Payment, SagaStatus::RollbackPending, Topic::ProductValidationFail),
    row(EventSource::Payment, SagaStatus::Fail, Topic::ProductValidationFail),
    row(EventSource::Inventory, SagaStatus::Success, Topic::FinishSuccess),
    row(EventSource::Inventory, SagaStatus::RollbackPending, Topic::PaymentFail),
    row(EventSource::Inventory, SagaStatus::Fail, Topic::PaymentFail),
];
