//! Query side of the order saga.
//!
//! The orchestrator publishes exactly one ending notification per finished
//! saga. [`EndingProcessor`] consumes them and stores the final envelope in a
//! [`SagaLog`], which answers "how did this order end, and why":
//! - [`InMemorySagaLog`] for tests and single-process runs
//! - [`PostgresSagaLog`] backed by `sqlx`

pub mod error;
pub mod postgres;
pub mod processor;
pub mod read_model;
pub mod saga_log;

pub use error::{ProjectionError, Result};
pub use postgres::PostgresSagaLog;
pub use processor::EndingProcessor;
pub use read_model::ReadModel;
pub use saga_log::{InMemorySagaLog, SagaLog, SagaLogEntry};
