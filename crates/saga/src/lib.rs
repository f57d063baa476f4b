//! Orchestrated order saga.
//!
//! The [`Orchestrator`] receives every envelope the participants report and
//! decides where it goes next using the [`TransitionTable`]. Forward on
//! success, backward through the compensation topics on failure, until the
//! saga reaches `finish-success` or `finish-fail`. Either way it publishes
//! exactly one ending notification.
//!
//! ```text
//! start-saga ─► product validation ─► payment ─► inventory ─► finish-success
//!                      ▲                 │  ▲        │
//!                      └──── rollback ───┘  └────────┘         ─► finish-fail
//! ```

pub mod error;
pub mod initiator;
pub mod order_saga;
pub mod orchestrator;
pub mod runtime;
pub mod transitions;

pub use error::{Result, SagaError};
pub use initiator::Initiator;
pub use orchestrator::{Orchestrator, Routed};
pub use runtime::{Participants, SagaRuntime};
pub use transitions::{Transition, TransitionTable};
