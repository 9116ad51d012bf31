use serde::Serialize;
use serde_json::Value as JsonValue;

use super::error::DbError;

/// Convert an unsigned value for a BIGINT column, refusing to wrap.
pub(crate) fn to_bigint(what: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange { what, value })
}

/// A value that can be bound into a column of an insertion model.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// NULL value. Also the placeholder held by foreign-key columns until
    /// their natural key has been resolved.
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 16-bit integer (SMALLINT)
    Int16(i16),
    /// Signed 32-bit integer (INTEGER)
    Int32(i32),
    /// Signed 64-bit integer (BIGINT)
    Int64(i64),
    /// Unsigned 64-bit integer (stored as BIGINT)
    Uint64(u64),
    /// Text (unlimited length)
    Text(String),
    /// Raw bytes (stored as BYTEA)
    Bytes(Vec<u8>),
    /// Ethereum address (20 bytes, stored as BYTEA)
    Address([u8; 20]),
    /// 32-byte word (stored as BYTEA)
    Bytes32([u8; 32]),
    /// Decimal string for uint256/int256 (stored as NUMERIC)
    Numeric(String),
    /// Unix timestamp in seconds (stored as TIMESTAMPTZ)
    Timestamp(i64),
    /// JSON value (stored as JSONB)
    Json(JsonValue),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Create a JSON value from any serializable type.
    pub fn json<T: Serialize>(value: T) -> Result<Self, serde_json::Error> {
        Ok(DbValue::Json(serde_json::to_value(value)?))
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int64(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int32(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Bytes(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// What an insert does when it hits the table's conflict target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row.
    DoNothing,
    /// Overwrite the listed columns with the incoming values.
    DoUpdate(Vec<String>),
}

/// A single write compiled from an insertion model.
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// Simple INSERT
    Insert {
        schema: String,
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
    },
    /// INSERT with an ON CONFLICT clause
    Upsert {
        schema: String,
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        on_conflict: OnConflict,
    },
}

impl DbOperation {
    pub fn table(&self) -> String {
        match self {
            DbOperation::Insert { schema, table, .. } | DbOperation::Upsert { schema, table, .. } => {
                format!("{}.{}", schema, table)
            }
        }
    }
}
