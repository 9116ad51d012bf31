//! Natural key -> surrogate id resolution.
//!
//! Every foreign-key role owns a mapping relation with a `BIGSERIAL id` and
//! one unique constraint over its natural-key columns. Rows are created on
//! first sighting and never updated or deleted, so an id, once committed,
//! is stable for every later transaction in every process.
//!
//! Creation is `INSERT .. ON CONFLICT DO NOTHING RETURNING id`. A resolver
//! that loses a creation race gets no row back, and re-reads the winner's
//! id with a fresh statement. This relies on READ COMMITTED, where each
//! statement sees rows committed before it started.

use std::collections::HashMap;
use std::fmt;

use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use super::error::ResolutionError;
use crate::db::pool::{qualified_table, quote_ident};
use crate::db::DbError;

const MAX_ATTEMPTS: usize = 3;

/// A kind of natural key and the relation that maps it to surrogate ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKeyRole {
    pub name: &'static str,
    pub schema: &'static str,
    pub table: &'static str,
    /// Natural-key columns, in the order a [`NaturalKey`]'s parts are given.
    pub key_columns: &'static [&'static str],
}

/// Collateral type, e.g. "ETH-A".
pub const ILK: ForeignKeyRole = ForeignKeyRole {
    name: "ilk",
    schema: "public",
    table: "ilks",
    key_columns: &["identifier"],
};

/// Position, keyed by collateral type and owner.
pub const URN: ForeignKeyRole = ForeignKeyRole {
    name: "urn",
    schema: "public",
    table: "urns",
    key_columns: &["ilk_identifier", "identifier"],
};

/// Account or contract address.
pub const ADDRESS: ForeignKeyRole = ForeignKeyRole {
    name: "address",
    schema: "public",
    table: "addresses",
    key_columns: &["address"],
};

impl ForeignKeyRole {
    /// Reject keys that can never be stored for this role.
    pub fn check(&self, key: &NaturalKey) -> Result<(), ResolutionError> {
        if key.parts().len() != self.key_columns.len() {
            return Err(ResolutionError::KeyArity {
                role: self.name,
                expected: self.key_columns.len(),
                actual: key.parts().len(),
            });
        }
        if key.is_empty() {
            return Err(ResolutionError::EmptyKey { role: self.name });
        }
        Ok(())
    }

    fn select_sql(&self) -> String {
        let conditions = self
            .key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        format!(
            "SELECT id::bigint FROM {} WHERE {}",
            qualified_table(self.schema, self.table),
            conditions
        )
    }

    fn insert_sql(&self) -> String {
        let columns = self
            .key_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=self.key_columns.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING RETURNING id::bigint",
            qualified_table(self.schema, self.table),
            columns,
            placeholders,
            columns
        )
    }
}

/// A natural key: one string, or an ordered tuple of strings for composite
/// keys that are looked up as a single unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// True when there are no parts or any part is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(|p| p.is_empty())
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<&str> for NaturalKey {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for NaturalKey {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<(&str, &str)> for NaturalKey {
    fn from((a, b): (&str, &str)) -> Self {
        Self::composite([a, b])
    }
}

impl From<(String, String)> for NaturalKey {
    fn from((a, b): (String, String)) -> Self {
        Self::composite([a, b])
    }
}

impl From<Vec<String>> for NaturalKey {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

/// Get-or-create resolution bound to one open transaction.
///
/// Results are memoised only for the life of the resolver, which cannot
/// outlive its transaction; nothing is shared across units of work.
pub struct ForeignKeyResolver<'a> {
    tx: &'a Transaction<'a>,
    resolved: HashMap<(ForeignKeyRole, NaturalKey), i64>,
}

impl<'a> ForeignKeyResolver<'a> {
    pub fn new(tx: &'a Transaction<'a>) -> Self {
        Self {
            tx,
            resolved: HashMap::new(),
        }
    }

    /// Return the surrogate id for `key`, creating the mapping row if none
    /// exists. Unknown keys are never an error.
    pub async fn resolve(
        &mut self,
        role: &ForeignKeyRole,
        key: &NaturalKey,
    ) -> Result<i64, ResolutionError> {
        role.check(key)?;

        let cache_key = (*role, key.clone());
        if let Some(id) = self.resolved.get(&cache_key) {
            return Ok(*id);
        }

        let id = resolve_in_transaction(self.tx, role, key).await?;
        self.resolved.insert(cache_key, id);
        Ok(id)
    }
}

/// Uncached get-or-create of one natural key inside `tx`.
pub async fn resolve_in_transaction(
    tx: &Transaction<'_>,
    role: &ForeignKeyRole,
    key: &NaturalKey,
) -> Result<i64, ResolutionError> {
    role.check(key)?;

    let db_err = |e: tokio_postgres::Error| ResolutionError::Database {
        role: role.name,
        source: DbError::from(e),
    };

    let params: Vec<&(dyn ToSql + Sync)> = key
        .parts()
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect();
    let select_sql = role.select_sql();
    let insert_sql = role.insert_sql();

    for attempt in 1..=MAX_ATTEMPTS {
        if let Some(row) = tx
            .query_opt(select_sql.as_str(), &params[..])
            .await
            .map_err(db_err)?
        {
            return row.try_get(0).map_err(db_err);
        }

        if let Some(row) = tx
            .query_opt(insert_sql.as_str(), &params[..])
            .await
            .map_err(db_err)?
        {
            let id: i64 = row.try_get(0).map_err(db_err)?;
            tracing::debug!("Created {} mapping '{}' with id {}", role.name, key, id);
            return Ok(id);
        }

        tracing::debug!(
            "Lost race creating {} mapping '{}' (attempt {}), re-reading",
            role.name,
            key,
            attempt
        );
    }

    Err(ResolutionError::Unresolved {
        role: role.name,
        key: key.to_string(),
        attempts: MAX_ATTEMPTS,
    })
}
