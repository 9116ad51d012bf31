//! Shared setup for database-backed tests.
//!
//! Tests are skipped when `DATABASE_URL` is not set. Each test gets its own
//! schema for event tables, so tests can run concurrently against one
//! database. Ledger and mapping tables are shared; tests keep apart by using
//! fresh headers and fresh natural keys.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use alloy_primitives::B256;
use event_transformer::db::{DbPool, HeaderRepository};
use event_transformer::types::log::{Header, NewHeader};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

pub struct TestDb {
    pub db: Arc<DbPool>,
    pub schema: String,
}

pub async fn setup() -> Option<TestDb> {
    event_transformer::logging::init("warn");

    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let db = DbPool::new(&url).await.expect("connect");
    db.run_migrations(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await
        .expect("migrations");

    let schema = format!("test_{}", Uuid::new_v4().simple());
    let client = db.get().await.expect("client");
    client
        .batch_execute(&format!(
            "CREATE SCHEMA {schema};
             CREATE TABLE {schema}.vat_init (
                 id        BIGSERIAL PRIMARY KEY,
                 header_id BIGINT  NOT NULL REFERENCES public.headers (id) ON DELETE CASCADE,
                 log_index INTEGER NOT NULL,
                 ilk_id    BIGINT  NOT NULL REFERENCES public.ilks (id),
                 UNIQUE (header_id, log_index)
             );
             CREATE TABLE {schema}.vat_fold (
                 id        BIGSERIAL PRIMARY KEY,
                 header_id BIGINT  NOT NULL REFERENCES public.headers (id) ON DELETE CASCADE,
                 log_index INTEGER NOT NULL,
                 ilk_id    BIGINT  NOT NULL REFERENCES public.ilks (id),
                 urn_id    BIGINT  NOT NULL REFERENCES public.urns (id),
                 rate      NUMERIC NOT NULL,
                 UNIQUE (header_id, log_index)
             );
             CREATE TABLE {schema}.notes (
                 header_id BIGINT NOT NULL,
                 body      TEXT   NOT NULL
             );"
        ))
        .await
        .expect("create test schema");

    Some(TestDb {
        db: Arc::new(db),
        schema,
    })
}

impl TestDb {
    pub async fn teardown(self) {
        let client = self.db.get().await.expect("client");
        client
            .batch_execute(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .await
            .expect("drop test schema");
    }

    pub async fn header(&self, block_number: u64) -> Header {
        HeaderRepository::new(self.db.clone())
            .create_or_get(&NewHeader {
                block_number,
                hash: random_hash(),
                timestamp: 1_600_000_000 + block_number,
            })
            .await
            .expect("create header")
    }

    pub async fn count(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> i64 {
        let rows = self.db.query(sql, params).await.expect("count query");
        rows[0].get(0)
    }
}

pub fn random_hash() -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    B256::from(bytes)
}

/// A block range no other test is using.
pub fn random_block() -> u64 {
    (Uuid::new_v4().as_u128() % 1_000_000_000_000) as u64 * 10
}

/// A natural key no other test is using, e.g. "ETH-A-3f2a..".
pub fn fresh_key(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
