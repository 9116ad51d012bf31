use std::sync::Arc;

use async_trait::async_trait;

use super::error::{DecodeError, TransformationError};
use super::repository::{PersistMode, Repository};
use super::traits::{Converter, Transformer};
use crate::types::config::transformer::TransformerConfig;
use crate::types::log::{DecodedLogEvent, Header};

/// Config + converter + repository: decode a header's logs, then persist
/// the models and mark the header checked in one transaction.
pub struct EventTransformer<C: Converter> {
    config: TransformerConfig,
    converter: C,
    repository: Arc<Repository>,
}

impl<C: Converter> EventTransformer<C> {
    pub fn new(config: TransformerConfig, converter: C, repository: Arc<Repository>) -> Self {
        Self {
            config,
            converter,
            repository,
        }
    }
}

#[async_trait]
impl<C: Converter> Transformer for EventTransformer<C> {
    fn config(&self) -> &TransformerConfig {
        &self.config
    }

    async fn execute(
        &self,
        header: &Header,
        logs: &[DecodedLogEvent],
        mode: PersistMode,
    ) -> Result<(), TransformationError> {
        let decode_err = |source| TransformationError::Decode {
            transformer: self.config.name.clone(),
            source,
        };

        if let Some(log) = logs.iter().find(|l| l.header_id != header.id) {
            return Err(decode_err(DecodeError::HeaderMismatch {
                log_index: log.log_index,
                expected: header.id,
                actual: log.header_id,
            }));
        }

        let models = self
            .converter
            .to_models(&self.config, logs)
            .map_err(decode_err)?;

        tracing::debug!(
            "Transformer {} decoded {} logs into {} models for block {}",
            self.config.name,
            logs.len(),
            models.len(),
            header.block_number
        );

        self.repository
            .persist(header.id, &self.config.name, models, mode)
            .await
            .map_err(|source| TransformationError::Persist {
                transformer: self.config.name.clone(),
                source,
            })
    }
}
