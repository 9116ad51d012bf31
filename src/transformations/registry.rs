//! Transformer registration and log routing.
//!
//! The registry maps each (contract address, topic0) trigger to the
//! transformers that decode it, and hands every transformer exactly the
//! logs that match its configuration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256};

use super::error::TransformationError;
use super::repository::PersistMode;
use super::traits::Transformer;
use crate::types::log::{DecodedLogEvent, Header};

/// Registry of all transformers, built at startup.
pub struct TransformerRegistry {
    /// Transformers indexed by (contract address, topic0) for fast lookup
    by_trigger: HashMap<(Address, B256), Vec<Arc<dyn Transformer>>>,
    /// All transformers, in registration order
    all: Vec<Arc<dyn Transformer>>,
    names: HashSet<String>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            by_trigger: HashMap::new(),
            all: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Register a transformer under every contract address it watches.
    ///
    /// Names are ledger keys, so registering two transformers with the same
    /// name is an error.
    pub fn register<T: Transformer>(&mut self, transformer: T) -> Result<(), TransformationError> {
        self.register_arc(Arc::new(transformer))
    }

    pub fn register_arc(
        &mut self,
        transformer: Arc<dyn Transformer>,
    ) -> Result<(), TransformationError> {
        let name = transformer.name().to_string();
        if name.is_empty() {
            return Err(TransformationError::ConfigError(
                "transformer name must not be empty".to_string(),
            ));
        }
        if !self.names.insert(name.clone()) {
            return Err(TransformationError::ConfigError(format!(
                "transformer '{}' is already registered",
                name
            )));
        }

        let topic0 = transformer.config().topic0();
        for address in &transformer.config().contract_addresses {
            self.by_trigger
                .entry((*address, topic0))
                .or_default()
                .push(transformer.clone());
        }

        self.all.push(transformer);
        Ok(())
    }

    /// Transformers triggered by `log`.
    pub fn transformers_for_log(&self, log: &DecodedLogEvent) -> Vec<Arc<dyn Transformer>> {
        let Some(topic0) = log.topic0() else {
            return Vec::new();
        };
        self.by_trigger
            .get(&(log.address, *topic0))
            .cloned()
            .unwrap_or_default()
    }

    /// The subset of `logs` that `transformer` decodes, in input order.
    pub fn logs_for(
        &self,
        transformer: &dyn Transformer,
        logs: &[DecodedLogEvent],
    ) -> Vec<DecodedLogEvent> {
        let config = transformer.config();
        let topic0 = config.topic0();
        logs.iter()
            .filter(|log| config.watches(&log.address) && log.topic0() == Some(&topic0))
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Transformer>> {
        self.all.iter().find(|t| t.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn transformer_count(&self) -> usize {
        self.all.len()
    }

    /// Run every transformer whose block range covers `header`, each in its
    /// own transaction, with the logs routed to it.
    ///
    /// A failing transformer does not stop the others; outcomes are returned
    /// per transformer name in registration order.
    pub async fn execute_header(
        &self,
        header: &Header,
        logs: &[DecodedLogEvent],
        mode: PersistMode,
    ) -> Vec<(String, Result<(), TransformationError>)> {
        let mut outcomes = Vec::with_capacity(self.all.len());

        for transformer in &self.all {
            if !transformer.config().covers_block(header.block_number) {
                continue;
            }

            let routed = self.logs_for(&**transformer, logs);
            let result = transformer.execute(header, &routed, mode).await;
            if let Err(e) = &result {
                tracing::error!(
                    "Transformer {} failed for block {} in {} phase: {}",
                    transformer.name(),
                    header.block_number,
                    e.phase(),
                    e
                );
            }
            outcomes.push((transformer.name().to_string(), result));
        }

        outcomes
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::types::config::transformer::TransformerConfig;

    /// Records the log indexes it was handed.
    struct Recorder {
        config: TransformerConfig,
        seen: Mutex<Vec<Vec<u32>>>,
    }

    impl Recorder {
        fn new(name: &str, addresses: Vec<Address>, signature: &str) -> Self {
            Self {
                config: TransformerConfig::new(name, addresses, signature),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transformer for Recorder {
        fn config(&self) -> &TransformerConfig {
            &self.config
        }

        async fn execute(
            &self,
            _header: &Header,
            logs: &[DecodedLogEvent],
            _mode: PersistMode,
        ) -> Result<(), TransformationError> {
            self.seen
                .lock()
                .unwrap()
                .push(logs.iter().map(|l| l.log_index).collect());
            if self.config.name == "broken" {
                return Err(TransformationError::ConfigError("broken".to_string()));
            }
            Ok(())
        }
    }

    const FOLD: &str = "Fold(bytes32,address,int256)";
    const BITE: &str = "Bite(bytes32,address,uint256,uint256,uint256,address,uint256)";

    fn vat() -> Address {
        Address::repeat_byte(0x11)
    }

    fn cat() -> Address {
        Address::repeat_byte(0x22)
    }

    fn log(address: Address, signature: &str, log_index: u32) -> DecodedLogEvent {
        DecodedLogEvent {
            header_id: 1,
            address,
            topics: vec![alloy_primitives::keccak256(signature.as_bytes())],
            data: vec![],
            transaction_hash: B256::ZERO,
            transaction_index: 0,
            log_index,
        }
    }

    fn header() -> Header {
        Header {
            id: 1,
            block_number: 50,
            hash: B256::ZERO,
            timestamp: 0,
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = TransformerRegistry::new();
        registry
            .register(Recorder::new("vat_fold", vec![vat()], FOLD))
            .unwrap();

        let err = registry
            .register(Recorder::new("vat_fold", vec![cat()], BITE))
            .unwrap_err();
        assert!(matches!(err, TransformationError::ConfigError(_)));
        assert_eq!(registry.transformer_count(), 1);
    }

    #[test]
    fn test_routing_by_address_and_topic() {
        let mut registry = TransformerRegistry::new();
        registry
            .register(Recorder::new("vat_fold", vec![vat()], FOLD))
            .unwrap();
        registry
            .register(Recorder::new("cat_bite", vec![cat()], BITE))
            .unwrap();

        let fold = log(vat(), FOLD, 0);
        let wrong_contract = log(cat(), FOLD, 1);
        let bite = log(cat(), BITE, 2);

        let names = |log: &DecodedLogEvent| -> Vec<String> {
            registry
                .transformers_for_log(log)
                .iter()
                .map(|t| t.name().to_string())
                .collect()
        };
        assert_eq!(names(&fold), vec!["vat_fold"]);
        assert!(names(&wrong_contract).is_empty());
        assert_eq!(names(&bite), vec!["cat_bite"]);

        let logs = vec![fold, wrong_contract, bite];
        let vat_fold = registry.get("vat_fold").unwrap();
        let routed = registry.logs_for(&**vat_fold, &logs);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].log_index, 0);
    }

    #[test]
    fn test_log_without_topics_matches_nothing() {
        let mut registry = TransformerRegistry::new();
        registry
            .register(Recorder::new("vat_fold", vec![vat()], FOLD))
            .unwrap();

        let mut anonymous = log(vat(), FOLD, 0);
        anonymous.topics.clear();
        assert!(registry.transformers_for_log(&anonymous).is_empty());
    }

    #[tokio::test]
    async fn test_execute_header_runs_every_transformer() {
        let fold = Arc::new(Recorder::new("vat_fold", vec![vat()], FOLD));
        let broken = Arc::new(Recorder::new("broken", vec![cat()], BITE));
        let mut late = Recorder::new("late", vec![vat()], FOLD);
        late.config.starting_block = 100;
        let late = Arc::new(late);

        let mut registry = TransformerRegistry::new();
        registry.register_arc(broken.clone()).unwrap();
        registry.register_arc(fold.clone()).unwrap();
        registry.register_arc(late.clone()).unwrap();

        let logs = vec![log(vat(), FOLD, 3), log(cat(), BITE, 4), log(vat(), FOLD, 5)];
        let outcomes = registry
            .execute_header(&header(), &logs, PersistMode::Normal)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "broken");
        assert!(outcomes[0].1.is_err());
        assert_eq!(outcomes[1].0, "vat_fold");
        assert!(outcomes[1].1.is_ok());

        assert_eq!(*fold.seen.lock().unwrap(), vec![vec![3, 5]]);
        assert_eq!(*broken.seen.lock().unwrap(), vec![vec![4]]);
        assert!(late.seen.lock().unwrap().is_empty());
    }
}
