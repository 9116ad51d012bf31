//! Per (header, transformer) processing counter.
//!
//! No record means the pair is unprocessed (count 0). Every successful
//! `persist`, normal or recheck, increments the count inside the same
//! transaction as the rows it covers. Counts never decrease.
//!
//! The ledger only records outcomes; deciding whether to invoke a
//! transformer for a header is the caller's job, using `checked_count` or
//! `unchecked_headers`.

use std::sync::Arc;

use tokio_postgres::Transaction;

use crate::db::headers::row_to_header;
use crate::db::types::to_bigint;
use crate::db::{DbError, DbPool};
use crate::types::log::Header;

/// Increment the count for `(header_id, transformer)`, creating the record
/// at 1 if absent. Returns the new count.
pub async fn mark_checked(
    tx: &Transaction<'_>,
    header_id: i64,
    transformer: &str,
) -> Result<i32, DbError> {
    let row = tx
        .query_one(
            "INSERT INTO checked_headers (header_id, transformer, check_count) VALUES ($1, $2, 1)
             ON CONFLICT (header_id, transformer)
             DO UPDATE SET check_count = checked_headers.check_count + 1
             RETURNING check_count",
            &[&header_id, &transformer],
        )
        .await?;

    Ok(row.try_get(0)?)
}

/// Read access to the ledger outside of a persist transaction.
pub struct CheckedHeaders {
    db: Arc<DbPool>,
}

impl CheckedHeaders {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Number of completed passes of `transformer` over `header_id`; 0 when
    /// it has never been processed.
    pub async fn checked_count(&self, header_id: i64, transformer: &str) -> Result<i32, DbError> {
        let rows = self
            .db
            .query(
                "SELECT check_count FROM checked_headers WHERE header_id = $1 AND transformer = $2",
                &[&header_id, &transformer],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(row.try_get(0)?),
            None => Ok(0),
        }
    }

    /// Headers with `starting_block <= block_number <= ending_block` whose
    /// count for `transformer` is below `recheck_limit`, in block order.
    ///
    /// A limit of 1 selects headers never checked; a larger limit also
    /// selects headers eligible for another recheck pass.
    pub async fn unchecked_headers(
        &self,
        starting_block: u64,
        ending_block: Option<u64>,
        transformer: &str,
        recheck_limit: i32,
    ) -> Result<Vec<Header>, DbError> {
        if recheck_limit < 1 {
            return Ok(Vec::new());
        }

        let starting_block = to_bigint("starting block", starting_block)?;
        let ending_block = ending_block
            .map(|b| to_bigint("ending block", b))
            .transpose()?;
        let rows = self
            .db
            .query(
                "SELECT h.id, h.block_number, h.hash, h.block_timestamp
                 FROM headers h
                 LEFT JOIN checked_headers c ON c.header_id = h.id AND c.transformer = $1
                 WHERE h.block_number >= $2
                   AND ($3::bigint IS NULL OR h.block_number <= $3)
                   AND COALESCE(c.check_count, 0) < $4
                 ORDER BY h.block_number, h.id",
                &[
                    &transformer,
                    &starting_block,
                    &ending_block,
                    &recheck_limit,
                ],
            )
            .await?;

        rows.iter().map(row_to_header).collect()
    }
}
