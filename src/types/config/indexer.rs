use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::config::database::DatabaseConfig;
use crate::types::config::transformer::TransformerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
}

impl IndexerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: IndexerConfig = serde_json::from_str(content)?;

        let mut seen = HashSet::new();
        for transformer in &config.transformers {
            anyhow::ensure!(
                seen.insert(transformer.name.as_str()),
                "duplicate transformer name '{}'",
                transformer.name
            );
        }

        Ok(config)
    }

    pub fn transformer(&self, name: &str) -> Option<&TransformerConfig> {
        self.transformers.iter().find(|t| t.name == name)
    }
}
