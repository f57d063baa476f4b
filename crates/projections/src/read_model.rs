//! Read model trait for query-side views.

use async_trait::async_trait;

use crate::Result;

/// A read model providing query access to saga outcomes.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    async fn count(&self) -> Result<usize>;
}
