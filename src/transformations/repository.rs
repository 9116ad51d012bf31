//! Transactional persistence of insertion models for one header.
//!
//! A `persist` call is one unit of work:
//!
//! ```text
//! BEGIN
//!   validate models, reject repeated conflict keys
//!   resolve every foreign key (get-or-create, same transaction)
//!   INSERT each model, in the order given
//!   checked_headers(header, transformer) += 1
//! COMMIT            -- or ROLLBACK on any failure, leaving nothing behind
//! ```
//!
//! Nothing is kept in memory between calls, so any number of processes can
//! persist against the same database concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio_postgres::Transaction;

use super::checked_headers::{mark_checked, CheckedHeaders};
use super::error::{ModelError, PersistError};
use super::foreign_keys::{ForeignKeyResolver, ForeignKeyRole, NaturalKey};
use super::model::InsertionModel;
use crate::db::pool::execute_operation;
use crate::db::{DbError, DbPool, DbValue};

/// How a header is being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// First pass over a header. Rows whose conflict target already exists
    /// are left untouched.
    #[default]
    Normal,
    /// Explicit reprocessing of an already-checked header. Rows whose
    /// conflict target already exists are overwritten with the new values.
    Recheck,
}

pub struct Repository {
    db: Arc<DbPool>,
}

impl Repository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<DbPool> {
        &self.db
    }

    /// Write `models` for `header_id` and record the pass in the ledger,
    /// atomically. An empty `models` still marks the header checked.
    pub async fn persist(
        &self,
        header_id: i64,
        transformer: &str,
        models: Vec<InsertionModel>,
        mode: PersistMode,
    ) -> Result<(), PersistError> {
        let model_count = models.len();

        let mut client = self.db.get().await.map_err(PersistError::Transaction)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| PersistError::Transaction(DbError::from(e)))?;

        match write_models(&tx, header_id, transformer, models, mode).await {
            Ok(check_count) => {
                tx.commit()
                    .await
                    .map_err(|e| PersistError::Transaction(DbError::from(e)))?;

                if mode == PersistMode::Normal && check_count > 1 {
                    tracing::warn!(
                        "Header {} was already checked by {} and was processed again without recheck (count={})",
                        header_id,
                        transformer,
                        check_count
                    );
                }

                tracing::debug!(
                    "Persisted {} models for header {} ({}, {:?}), check_count={}",
                    model_count,
                    header_id,
                    transformer,
                    mode,
                    check_count
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        "Rollback failed for header {} ({}): {}",
                        header_id,
                        transformer,
                        rollback_err
                    );
                }

                tracing::error!(
                    "Persist failed in {} phase for header {} ({}), rolled back: {}",
                    e.phase(),
                    header_id,
                    transformer,
                    e
                );
                Err(e)
            }
        }
    }

    /// Number of completed passes of `transformer` over `header_id`.
    pub async fn checked_count(&self, header_id: i64, transformer: &str) -> Result<i32, DbError> {
        CheckedHeaders::new(self.db.clone())
            .checked_count(header_id, transformer)
            .await
    }
}

async fn write_models(
    tx: &Transaction<'_>,
    header_id: i64,
    transformer: &str,
    mut models: Vec<InsertionModel>,
    mode: PersistMode,
) -> Result<i32, PersistError> {
    for model in &models {
        model
            .validate()
            .map_err(|source| PersistError::InvalidModel {
                table: model.qualified_table(),
                source,
            })?;
    }
    check_conflict_keys(&models)?;

    let resolved = resolve_foreign_keys(tx, &models).await?;

    for model in &mut models {
        substitute_foreign_keys(model, &resolved);

        let op = model
            .to_operation(mode)
            .map_err(|source| PersistError::InvalidModel {
                table: model.qualified_table(),
                source,
            })?;

        execute_operation(tx, &op)
            .await
            .map_err(|source| PersistError::Insert {
                table: model.qualified_table(),
                source,
            })?;
    }

    mark_checked(tx, header_id, transformer)
        .await
        .map_err(|source| PersistError::LedgerUpdate { header_id, source })
}

/// Reject a batch in which two models target the same table with the same
/// conflict-column values.
///
/// In normal mode the second write would be skipped by `ON CONFLICT DO
/// NOTHING` while its foreign keys were still created. Foreign-key columns
/// are compared by natural key since their ids are not known yet.
fn check_conflict_keys(models: &[InsertionModel]) -> Result<(), PersistError> {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    for (index, model) in models.iter().enumerate() {
        if model.conflict_columns.is_empty() {
            continue;
        }

        let key = model
            .conflict_columns
            .iter()
            .map(|column| match model.foreign_key_values.get(column) {
                Some(fk) => format!("{}={}:{}", column, fk.role.name, fk.key),
                None => format!("{}={:?}", column, model.value(column)),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let table = model.qualified_table();

        if let Some(first) = seen.insert((table.clone(), key.clone()), index) {
            return Err(PersistError::InvalidModel {
                table: table.clone(),
                source: ModelError::DuplicateConflictKey {
                    table,
                    key,
                    first,
                    second: index,
                },
            });
        }
    }

    Ok(())
}

/// (mapping schema, mapping table, natural key)
type MappingKey = (&'static str, &'static str, NaturalKey);
type ResolvedKeys = BTreeMap<MappingKey, i64>;

/// Resolve every distinct natural key in the batch.
///
/// Keys are resolved in one global order (mapping table, then key) so that
/// concurrent persists acquire mapping-row locks in the same order.
async fn resolve_foreign_keys(
    tx: &Transaction<'_>,
    models: &[InsertionModel],
) -> Result<ResolvedKeys, PersistError> {
    // First model column that references each key, for error reporting.
    let mut pending: BTreeMap<MappingKey, (ForeignKeyRole, String, String)> = BTreeMap::new();

    for model in models {
        for (column, fk) in &model.foreign_key_values {
            pending
                .entry((fk.role.schema, fk.role.table, fk.key.clone()))
                .or_insert_with(|| (fk.role, model.qualified_table(), column.clone()));
        }
    }

    let mut resolver = ForeignKeyResolver::new(tx);
    let mut resolved = ResolvedKeys::new();

    for ((schema, table, key), (role, model_table, column)) in pending {
        let id = resolver
            .resolve(&role, &key)
            .await
            .map_err(|source| PersistError::Resolve {
                table: model_table,
                column,
                source,
            })?;
        resolved.insert((schema, table, key), id);
    }

    Ok(resolved)
}

fn substitute_foreign_keys(model: &mut InsertionModel, resolved: &ResolvedKeys) {
    let substitutions: Vec<(String, i64)> = model
        .foreign_key_values
        .iter()
        .filter_map(|(column, fk)| {
            resolved
                .get(&(fk.role.schema, fk.role.table, fk.key.clone()))
                .map(|id| (column.clone(), *id))
        })
        .collect();

    for (column, id) in substitutions {
        model.set_value(&column, DbValue::Int64(id));
    }
}
