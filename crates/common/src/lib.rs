//! Shared envelope model for the order saga.
//!
//! Every channel in the saga carries an [`Envelope`]: the order snapshot,
//! the identifiers of the current attempt, the outcome of the last step and
//! the append-only audit trail of everything that happened so far.

pub mod envelope;
pub mod error;
pub mod money;
pub mod order;
pub mod types;

pub use envelope::{Envelope, EventSource, History, SagaStatus};
pub use error::ModelError;
pub use money::Money;
pub use order::{Order, OrderItem, ProductCode};
pub use types::{EnvelopeId, OrderId, TransactionId};
