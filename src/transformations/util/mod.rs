//! Utility functions for converters.
//!
//! Common helpers for checking log shape and pulling typed values out of
//! topics and data words.

use alloy_primitives::{Address, B256, I256, U256};

use super::error::DecodeError;
use crate::types::log::DecodedLogEvent;

/// Size of one ABI word.
pub const WORD_SIZE: usize = 32;

/// Check that `log` has exactly `expected_topics` topics and at least
/// `min_data_len` bytes of data.
pub fn verify_log(
    log: &DecodedLogEvent,
    expected_topics: usize,
    min_data_len: usize,
) -> Result<(), DecodeError> {
    if log.topics.len() != expected_topics {
        return Err(DecodeError::TopicCount {
            log_index: log.log_index,
            expected: expected_topics,
            actual: log.topics.len(),
        });
    }
    if log.data.len() < min_data_len {
        return Err(DecodeError::DataTooShort {
            log_index: log.log_index,
            minimum: min_data_len,
            actual: log.data.len(),
        });
    }
    Ok(())
}

fn topic(log: &DecodedLogEvent, index: usize) -> Result<&B256, DecodeError> {
    log.topics.get(index).ok_or(DecodeError::TopicCount {
        log_index: log.log_index,
        expected: index.saturating_add(1),
        actual: log.topics.len(),
    })
}

/// Decode a bytes32 topic as a right-padded ASCII string, e.g. an ilk
/// identifier such as "ETH-A".
pub fn topic_to_string(log: &DecodedLogEvent, index: usize) -> Result<String, DecodeError> {
    bytes32_to_string(topic(log, index)?).ok_or_else(|| {
        DecodeError::invalid_field(log.log_index, format!("topic {} is not UTF-8", index))
    })
}

/// Decode a left-padded address topic.
pub fn topic_to_address(log: &DecodedLogEvent, index: usize) -> Result<Address, DecodeError> {
    let word = topic(log, index)?;
    Ok(Address::from_word(*word))
}

/// The `index`th 32-byte word of the log's data.
pub fn data_word(log: &DecodedLogEvent, index: usize) -> Result<B256, DecodeError> {
    let too_short = |minimum| DecodeError::DataTooShort {
        log_index: log.log_index,
        minimum,
        actual: log.data.len(),
    };

    let end = index
        .checked_add(1)
        .and_then(|words| words.checked_mul(WORD_SIZE))
        .ok_or_else(|| too_short(usize::MAX))?;
    log.data
        .get(end - WORD_SIZE..end)
        .map(B256::from_slice)
        .ok_or_else(|| too_short(end))
}

/// Decode a data word as a uint256, rendered in decimal for NUMERIC columns.
pub fn data_uint(log: &DecodedLogEvent, index: usize) -> Result<String, DecodeError> {
    let word = data_word(log, index)?;
    Ok(U256::from_be_bytes(word.0).to_string())
}

/// Decode a data word as an int256, rendered in decimal for NUMERIC columns.
pub fn data_int(log: &DecodedLogEvent, index: usize) -> Result<String, DecodeError> {
    let word = data_word(log, index)?;
    Ok(I256::from_be_bytes(word.0).to_string())
}

/// Trailing NUL bytes are padding.
pub fn bytes32_to_string(bytes: &B256) -> Option<String> {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8(bytes[..end].to_vec()).ok()
}

/// Format an address as a hex string with 0x prefix.
pub fn format_address(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr))
}

/// Format a bytes32 as a hex string with 0x prefix.
pub fn format_bytes32(bytes: &B256) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a hex string (with or without 0x prefix) to bytes.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s)
}
