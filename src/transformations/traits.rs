//! Seams between the core and its per-event collaborators.

use async_trait::async_trait;

use super::error::{DecodeError, TransformationError};
use super::model::InsertionModel;
use super::repository::PersistMode;
use crate::types::config::transformer::TransformerConfig;
use crate::types::log::{DecodedLogEvent, Header};

/// Turns one header's logs for one event type into insertion models.
///
/// Implementations must be pure: no I/O, no hidden state. A malformed log
/// fails the whole batch; nothing is skipped silently.
pub trait Converter: Send + Sync + 'static {
    fn to_models(
        &self,
        config: &TransformerConfig,
        logs: &[DecodedLogEvent],
    ) -> Result<Vec<InsertionModel>, DecodeError>;
}

impl<F> Converter for F
where
    F: Fn(&TransformerConfig, &[DecodedLogEvent]) -> Result<Vec<InsertionModel>, DecodeError>
        + Send
        + Sync
        + 'static,
{
    fn to_models(
        &self,
        config: &TransformerConfig,
        logs: &[DecodedLogEvent],
    ) -> Result<Vec<InsertionModel>, DecodeError> {
        self(config, logs)
    }
}

/// A unit that processes one header's logs for one event type.
#[async_trait]
pub trait Transformer: Send + Sync + 'static {
    fn config(&self) -> &TransformerConfig;

    /// Ledger identity of this transformer.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Decode `logs` and persist the result for `header`, marking the header
    /// checked. `logs` may be empty.
    async fn execute(
        &self,
        header: &Header,
        logs: &[DecodedLogEvent],
        mode: PersistMode,
    ) -> Result<(), TransformationError>;
}
