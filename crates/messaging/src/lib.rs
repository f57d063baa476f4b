//! Saga messaging.
//!
//! Components of the saga never call each other directly: they publish
//! [`Envelope`](common::Envelope)s to named [`Topic`]s and subscribe to the
//! topics they consume. [`InMemoryChannel`] is the in-process broker used by
//! the service and the tests; anything implementing [`Channel`] can replace it.

pub mod channel;
pub mod codec;
pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod topic;

pub use channel::{Channel, EnvelopeHandler, Subscription};
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetters};
pub use error::{MessagingError, Result};
pub use memory::{ChannelConfig, InMemoryChannel};
pub use topic::Topic;
