//! The neutral, schema-agnostic description of one row to be written.
//!
//! Converters build `InsertionModel`s without any I/O; the repository turns
//! them into parameterized inserts after substituting resolved foreign keys.
//!
//! Columns can be named with plain strings, or with a per-table enum that
//! implements [`Column`] so that a misspelled column is a compile error:
//!
//! ```ignore
//! #[derive(Clone, Copy)]
//! enum VatFileIlk { HeaderId, LogIndex, IlkId, What, Data }
//!
//! impl Column for VatFileIlk {
//!     fn name(self) -> &'static str {
//!         match self {
//!             VatFileIlk::HeaderId => "header_id",
//!             VatFileIlk::LogIndex => "log_index",
//!             VatFileIlk::IlkId => "ilk_id",
//!             VatFileIlk::What => "what",
//!             VatFileIlk::Data => "data",
//!         }
//!     }
//! }
//!
//! let model = InsertionModel::builder("maker", "vat_file_ilk")
//!     .column(VatFileIlk::HeaderId, DbValue::Int64(header.id))
//!     .column(VatFileIlk::LogIndex, DbValue::Int32(0))
//!     .foreign_key(VatFileIlk::IlkId, ILK, "ETH-A")
//!     .column(VatFileIlk::What, "spot")
//!     .column(VatFileIlk::Data, DbValue::Numeric("1000".into()))
//!     .conflict_on([VatFileIlk::HeaderId, VatFileIlk::LogIndex])
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use super::error::ModelError;
use super::foreign_keys::{ForeignKeyRole, NaturalKey};
use super::repository::PersistMode;
use crate::db::{DbOperation, DbValue, OnConflict};

/// Something that names a column of a target table.
pub trait Column: Copy {
    fn name(self) -> &'static str;
}

impl Column for &'static str {
    fn name(self) -> &'static str {
        self
    }
}

/// A natural key waiting to be replaced by the surrogate id of `role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyValue {
    pub role: ForeignKeyRole,
    pub key: NaturalKey,
}

/// One row to be written.
///
/// Invariant: every entry of `foreign_key_values` is keyed by a column that
/// also appears in `ordered_columns`; that column's value is a placeholder
/// until the repository resolves the key.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionModel {
    pub schema: String,
    pub table: String,
    /// Column order used for positional parameter binding.
    pub ordered_columns: Vec<String>,
    pub column_values: HashMap<String, DbValue>,
    /// Placeholder column -> natural key to resolve before insert.
    pub foreign_key_values: HashMap<String, ForeignKeyValue>,
    /// Unique constraint identifying the source log (e.g. header_id, log_index).
    /// Empty means rows are written with a plain INSERT.
    pub conflict_columns: Vec<String>,
}

impl InsertionModel {
    pub fn builder<C: Column>(schema: impl Into<String>, table: impl Into<String>) -> ModelBuilder<C> {
        ModelBuilder {
            model: InsertionModel {
                schema: schema.into(),
                table: table.into(),
                ordered_columns: Vec::new(),
                column_values: HashMap::new(),
                foreign_key_values: HashMap::new(),
                conflict_columns: Vec::new(),
            },
            error: None,
            _columns: PhantomData,
        }
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn has_foreign_keys(&self) -> bool {
        !self.foreign_key_values.is_empty()
    }

    pub fn value(&self, column: &str) -> Option<&DbValue> {
        self.column_values.get(column)
    }

    pub(crate) fn set_value(&mut self, column: &str, value: DbValue) {
        self.column_values.insert(column.to_string(), value);
    }

    /// Check the model's invariants. Models built with [`ModelBuilder`]
    /// are checked on `build()`; this is for models assembled by hand.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.schema.is_empty() {
            return Err(ModelError::EmptyIdentifier("schema"));
        }
        if self.table.is_empty() {
            return Err(ModelError::EmptyIdentifier("table"));
        }

        let mut seen = HashSet::new();
        for column in &self.ordered_columns {
            if !seen.insert(column.as_str()) {
                return Err(ModelError::DuplicateColumn {
                    table: self.qualified_table(),
                    column: column.clone(),
                });
            }
            if !self.column_values.contains_key(column) {
                return Err(ModelError::MissingValue {
                    table: self.qualified_table(),
                    column: column.clone(),
                });
            }
        }

        for (column, fk) in &self.foreign_key_values {
            if !seen.contains(column.as_str()) {
                return Err(ModelError::MissingPlaceholder {
                    table: self.qualified_table(),
                    column: column.clone(),
                });
            }
            if fk.key.parts().len() != fk.role.key_columns.len() {
                return Err(ModelError::NaturalKeyArity {
                    table: self.qualified_table(),
                    column: column.clone(),
                    expected: fk.role.key_columns.len(),
                    actual: fk.key.parts().len(),
                });
            }
            if fk.key.is_empty() {
                return Err(ModelError::EmptyNaturalKey {
                    table: self.qualified_table(),
                    column: column.clone(),
                });
            }
        }

        for column in &self.conflict_columns {
            if !seen.contains(column.as_str()) {
                return Err(ModelError::UnknownConflictColumn {
                    table: self.qualified_table(),
                    column: column.clone(),
                });
            }
        }

        Ok(())
    }

    /// Compile to a single write, binding values in `ordered_columns` order.
    pub(crate) fn to_operation(&self, mode: PersistMode) -> Result<DbOperation, ModelError> {
        let values = self
            .ordered_columns
            .iter()
            .map(|column| {
                self.column_values
                    .get(column)
                    .cloned()
                    .ok_or_else(|| ModelError::MissingValue {
                        table: self.qualified_table(),
                        column: column.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if self.conflict_columns.is_empty() {
            return Ok(DbOperation::Insert {
                schema: self.schema.clone(),
                table: self.table.clone(),
                columns: self.ordered_columns.clone(),
                values,
            });
        }

        let on_conflict = match mode {
            PersistMode::Normal => OnConflict::DoNothing,
            PersistMode::Recheck => OnConflict::DoUpdate(
                self.ordered_columns
                    .iter()
                    .filter(|c| !self.conflict_columns.contains(c))
                    .cloned()
                    .collect(),
            ),
        };

        Ok(DbOperation::Upsert {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns: self.ordered_columns.clone(),
            values,
            conflict_columns: self.conflict_columns.clone(),
            on_conflict,
        })
    }
}

/// Builds an [`InsertionModel`] column by column, in insert order.
pub struct ModelBuilder<C: Column> {
    model: InsertionModel,
    error: Option<ModelError>,
    _columns: PhantomData<C>,
}

impl<C: Column> ModelBuilder<C> {
    pub fn column(mut self, column: C, value: impl Into<DbValue>) -> Self {
        self.push(column.name(), value.into());
        self
    }

    /// Add a foreign-key column. Its value is resolved from `key` at
    /// persist time.
    pub fn foreign_key(
        mut self,
        column: C,
        role: ForeignKeyRole,
        key: impl Into<NaturalKey>,
    ) -> Self {
        let name = column.name();
        self.push(name, DbValue::Null);
        self.model.foreign_key_values.insert(
            name.to_string(),
            ForeignKeyValue {
                role,
                key: key.into(),
            },
        );
        self
    }

    /// Declare the unique constraint that identifies a row's source log.
    pub fn conflict_on(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.model.conflict_columns = columns.into_iter().map(|c| c.name().to_string()).collect();
        self
    }

    pub fn build(self) -> Result<InsertionModel, ModelError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.model.validate()?;
        Ok(self.model)
    }

    fn push(&mut self, name: &'static str, value: DbValue) {
        if self.model.column_values.contains_key(name) {
            if self.error.is_none() {
                self.error = Some(ModelError::DuplicateColumn {
                    table: self.model.qualified_table(),
                    column: name.to_string(),
                });
            }
            return;
        }
        self.model.ordered_columns.push(name.to_string());
        self.model.column_values.insert(name.to_string(), value);
    }
}
