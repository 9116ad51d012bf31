//! Storage for block headers, the referent of every checked-header record
//! and of every event row's `header_id`.

use std::sync::Arc;

use alloy_primitives::B256;
use tokio_postgres::Row;

use super::error::DbError;
use super::pool::DbPool;
use super::types::to_bigint;
use crate::types::log::{Header, NewHeader};

pub struct HeaderRepository {
    db: Arc<DbPool>,
}

impl HeaderRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Store a header, or return the existing row for the same
    /// `(block_number, hash)`.
    pub async fn create_or_get(&self, header: &NewHeader) -> Result<Header, DbError> {
        let block_number = to_bigint("block number", header.block_number)?;
        let hash = header.hash.as_slice();
        let timestamp = to_bigint("block timestamp", header.timestamp)?;
        let client = self.db.get().await?;

        let inserted = client
            .query_opt(
                "INSERT INTO headers (block_number, hash, block_timestamp) VALUES ($1, $2, $3)
                 ON CONFLICT (block_number, hash) DO NOTHING
                 RETURNING id, block_number, hash, block_timestamp",
                &[&block_number, &hash, &timestamp],
            )
            .await?;

        if let Some(row) = inserted {
            return row_to_header(&row);
        }

        let row = client
            .query_one(
                "SELECT id, block_number, hash, block_timestamp FROM headers
                 WHERE block_number = $1 AND hash = $2",
                &[&block_number, &hash],
            )
            .await?;
        row_to_header(&row)
    }

    /// The most recently stored header at `block_number`, if any.
    pub async fn get_by_block_number(&self, block_number: u64) -> Result<Option<Header>, DbError> {
        let rows = self
            .db
            .query(
                "SELECT id, block_number, hash, block_timestamp FROM headers
                 WHERE block_number = $1 ORDER BY id DESC LIMIT 1",
                &[&to_bigint("block number", block_number)?],
            )
            .await?;

        rows.first().map(row_to_header).transpose()
    }
}

pub(crate) fn row_to_header(row: &Row) -> Result<Header, DbError> {
    let id: i64 = row.try_get(0)?;
    let block_number: i64 = row.try_get(1)?;
    let hash: Vec<u8> = row.try_get(2)?;
    let timestamp: i64 = row.try_get(3)?;

    if hash.len() != 32 {
        return Err(DbError::InvalidRow(format!(
            "header {} has a {}-byte hash",
            id,
            hash.len()
        )));
    }

    let unsigned = |what: &str, value: i64| {
        u64::try_from(value)
            .map_err(|_| DbError::InvalidRow(format!("header {} has a negative {}", id, what)))
    };

    Ok(Header {
        id,
        block_number: unsigned("block number", block_number)?,
        hash: B256::from_slice(&hash),
        timestamp: unsigned("timestamp", timestamp)?,
    })
}
