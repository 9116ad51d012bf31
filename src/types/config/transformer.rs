use alloy_primitives::{keccak256, Address, B256};
use serde::Deserialize;

/// Static description of one event transformer: which contracts it watches,
/// which event it decodes and over which blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformerConfig {
    /// Unique transformer identity, used as the checked-header ledger key.
    pub name: String,
    pub contract_addresses: Vec<Address>,
    /// Canonical event signature, e.g. "LogNote(bytes4,address,bytes32,bytes32,bytes)".
    pub event_signature: String,
    #[serde(default)]
    pub starting_block: u64,
    #[serde(default)]
    pub ending_block: Option<u64>,
}

impl TransformerConfig {
    pub fn new(
        name: impl Into<String>,
        contract_addresses: Vec<Address>,
        event_signature: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            contract_addresses,
            event_signature: event_signature.into(),
            starting_block: 0,
            ending_block: None,
        }
    }

    /// keccak256 of the event signature.
    pub fn topic0(&self) -> B256 {
        keccak256(self.event_signature.as_bytes())
    }

    pub fn watches(&self, address: &Address) -> bool {
        self.contract_addresses.contains(address)
    }

    pub fn covers_block(&self, block_number: u64) -> bool {
        block_number >= self.starting_block
            && self.ending_block.map_or(true, |end| block_number <= end)
    }
}
