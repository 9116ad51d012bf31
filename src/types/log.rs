//! Input types handed to the core by the log-fetching collaborator.

use alloy_primitives::{Address, B256};

/// A block header as stored in the `headers` table.
///
/// The core only needs its identity (`id`) and ordering attributes; the
/// fetcher owns everything else about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: i64,
    pub block_number: u64,
    pub hash: B256,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

/// A header that has been fetched but not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHeader {
    pub block_number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

/// A raw event log fetched for a header. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLogEvent {
    /// Id of the header this log belongs to
    pub header_id: i64,
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub transaction_hash: B256,
    pub transaction_index: u32,
    pub log_index: u32,
}

impl DecodedLogEvent {
    /// The event signature hash, if the log has any topics.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}
