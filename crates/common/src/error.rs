//! Errors raised while reading the envelope model from its wire form.

use thiserror::Error;

/// Errors that can occur when parsing model values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The status name is not part of the saga protocol.
    #[error("Unknown saga status: {0}")]
    UnknownStatus(String),

    /// The source name does not identify a saga component.
    #[error("Unknown event source: {0}")]
    UnknownSource(String),

    /// An amount or quantity does not fit its representation.
    #[error("{0} is too large")]
    Overflow(String),
}
