//! Transformation error types.
//!
//! Every failure of a `persist` call names the phase it happened in, so a
//! caller can tell a bad decode from a failed insert or ledger update.

use thiserror::Error;

use crate::db::DbError;

/// An insertion model that breaks its own invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model has an empty {0} name")]
    EmptyIdentifier(&'static str),

    #[error("column '{column}' appears more than once in {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("foreign key '{column}' in {table} has no placeholder column")]
    MissingPlaceholder { table: String, column: String },

    #[error("column '{column}' in {table} has no value")]
    MissingValue { table: String, column: String },

    #[error("conflict column '{column}' is not a column of {table}")]
    UnknownConflictColumn { table: String, column: String },

    #[error("foreign key '{column}' in {table} has an empty natural key")]
    EmptyNaturalKey { table: String, column: String },

    #[error("foreign key '{column}' in {table} has {actual} key parts, its role takes {expected}")]
    NaturalKeyArity {
        table: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("models {first} and {second} both target {table} with conflict key ({key})")]
    DuplicateConflictKey {
        table: String,
        key: String,
        first: usize,
        second: usize,
    },
}

/// A log that does not have the shape its converter expects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log {log_index} has {actual} topics, expected {expected}")]
    TopicCount {
        log_index: u32,
        expected: usize,
        actual: usize,
    },

    #[error("log {log_index} has {actual} bytes of data, expected at least {minimum}")]
    DataTooShort {
        log_index: u32,
        minimum: usize,
        actual: usize,
    },

    #[error("log {log_index}: {message}")]
    InvalidField { log_index: u32, message: String },

    #[error("log {log_index} belongs to header {actual}, expected header {expected}")]
    HeaderMismatch {
        log_index: u32,
        expected: i64,
        actual: i64,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl DecodeError {
    pub fn invalid_field(log_index: u32, message: impl Into<String>) -> Self {
        Self::InvalidField {
            log_index,
            message: message.into(),
        }
    }
}

/// Failure to map a natural key to its surrogate id.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("natural key for role '{role}' has {actual} parts, expected {expected}")]
    KeyArity {
        role: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("natural key for role '{role}' is empty")]
    EmptyKey { role: &'static str },

    #[error("could not resolve '{key}' for role '{role}' after {attempts} attempts")]
    Unresolved {
        role: &'static str,
        key: String,
        attempts: usize,
    },

    #[error("database error resolving role '{role}': {source}")]
    Database {
        role: &'static str,
        #[source]
        source: DbError,
    },
}

/// Failure of one `persist` call. The transaction has been rolled back.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("transaction error: {0}")]
    Transaction(#[source] DbError),

    #[error("resolve phase failed for {table}.{column}: {source}")]
    Resolve {
        table: String,
        column: String,
        #[source]
        source: ResolutionError,
    },

    #[error("insert phase failed for {table}: {source}")]
    Insert {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("invalid model for {table}: {source}")]
    InvalidModel {
        table: String,
        #[source]
        source: ModelError,
    },

    #[error("ledger-update phase failed for header {header_id}: {source}")]
    LedgerUpdate {
        header_id: i64,
        #[source]
        source: DbError,
    },
}

impl PersistError {
    /// Short name of the phase that failed.
    pub fn phase(&self) -> &'static str {
        match self {
            PersistError::Transaction(_) => "transaction",
            PersistError::Resolve { .. } => "resolve",
            PersistError::Insert { .. } | PersistError::InvalidModel { .. } => "insert",
            PersistError::LedgerUpdate { .. } => "ledger-update",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Transformer '{transformer}' decode phase failed: {source}")]
    Decode {
        transformer: String,
        #[source]
        source: DecodeError,
    },

    #[error("Transformer '{transformer}' {source}")]
    Persist {
        transformer: String,
        #[source]
        source: PersistError,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl TransformationError {
    /// Short name of the phase that failed.
    pub fn phase(&self) -> &'static str {
        match self {
            TransformationError::Decode { .. } => "decode",
            TransformationError::Persist { source, .. } => source.phase(),
            TransformationError::DatabaseError(_) => "database",
            TransformationError::ConfigError(_) => "config",
        }
    }
}
