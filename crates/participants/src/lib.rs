//! Saga participants.
//!
//! Each participant is a [`Participant`] implementation run by the generic
//! [`ParticipantHandler`]: product validation, payment and inventory. The
//! handler subscribes to the participant's forward and rollback topics and
//! reports every outcome back on the orchestrator topic.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use messaging::InMemoryChannel;
//! use participants::{InMemoryCatalog, ParticipantHandler, ProductValidation};
//!
//! # async fn example() -> participants::Result<()> {
//! let channel = Arc::new(InMemoryChannel::new());
//! let (validation, _ledger) = ProductValidation::in_memory(InMemoryCatalog::new(["BOOKS"]));
//! let handler = ParticipantHandler::new(Arc::new(validation), channel);
//! let (_forward, _rollback) = handler.subscribe().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod inventory;
pub mod payment;
pub mod record;
pub mod validation;

pub use error::{ParticipantError, Result};
pub use handler::{Compensation, Participant, ParticipantHandler};
pub use inventory::{InMemoryInventory, InventoryParticipant, InventoryStore, StockChange};
pub use payment::{
    DEFAULT_MIN_AMOUNT, InMemoryPaymentStore, Payment, PaymentParticipant, PaymentStatus,
    PaymentStore,
};
pub use record::{CompensationLedger, CompensationRecord, CompensationState, InMemoryLedger};
pub use validation::{InMemoryCatalog, ProductCatalog, ProductValidation};
