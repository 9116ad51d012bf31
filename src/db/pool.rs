use std::path::Path;

use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Transaction};

use super::error::DbError;
use super::types::{to_bigint, DbOperation, DbValue, OnConflict};
use crate::types::config::database::DatabaseConfig;

const DEFAULT_MAX_CONNECTIONS: usize = 16;

pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    /// Build a pool for `database_url` and check that a connection can be
    /// established.
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let db = Self::lazy(database_url, DEFAULT_MAX_CONNECTIONS)?;

        let _conn = db.pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(db)
    }

    /// Build a pool from configuration. Connections are opened lazily.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DbError> {
        let url = config.database_url()?;
        Self::lazy(&url, config.max_connections)
    }

    /// Build a pool from configuration, check connectivity, and apply any
    /// pending migrations from `config.migrations_dir`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let url = config.database_url()?;
        let db = Self::lazy(&url, config.max_connections)?;

        let _conn = db.pool.get().await?;
        db.run_migrations(&config.migrations_dir).await?;
        tracing::info!("Database ready ({} max connections)", config.max_connections);

        Ok(db)
    }

    /// Build a pool without opening any connection.
    pub(crate) fn lazy(database_url: &str, max_size: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        Ok(Self { pool })
    }

    /// Check a client out of the pool.
    pub async fn get(&self) -> Result<Object, DbError> {
        Ok(self.pool.get().await?)
    }

    pub async fn run_migrations(&self, dir: &Path) -> Result<(), DbError> {
        super::migrations::run(&self.pool, dir).await
    }

    pub async fn query(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, DbError> {
        let client = self.pool.get().await?;
        let rows = client.query(query, params).await?;
        Ok(rows)
    }
}

/// Execute one compiled operation inside the caller's transaction.
///
/// Returns the number of rows written; an upsert that hit its conflict
/// target with `DO NOTHING` writes zero rows.
pub(crate) async fn execute_operation(
    tx: &Transaction<'_>,
    op: &DbOperation,
) -> Result<u64, DbError> {
    let (sql, params) = build_operation_sql(op)?;
    let params_refs: Vec<&(dyn ToSql + Sync)> =
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    match tx.execute(sql.as_str(), &params_refs[..]).await {
        Ok(rows) => Ok(rows),
        Err(e) => {
            let db_err: DbError = e.into();
            tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", sql, db_err);
            Err(db_err)
        }
    }
}

#[derive(Debug)]
pub(crate) enum SqlParam {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &tokio_postgres::types::Type,
        out: &mut BytesMut,
    ) -> Result<tokio_postgres::types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(tokio_postgres::types::IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int16(v) => v.to_sql(ty, out),
            SqlParam::Int32(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Float64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
            SqlParam::Bytes(v) => v.to_sql(ty, out),
            SqlParam::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &tokio_postgres::types::Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i16 as ToSql>::accepts(ty)
            || <i32 as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <Vec<u8> as ToSql>::accepts(ty)
            || <serde_json::Value as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(value: &DbValue) -> Result<SqlParam, DbError> {
    Ok(match value {
        DbValue::Null => SqlParam::Null,
        DbValue::Bool(v) => SqlParam::Bool(*v),
        DbValue::Int16(v) => SqlParam::Int16(*v),
        DbValue::Int32(v) => SqlParam::Int32(*v),
        DbValue::Int64(v) => SqlParam::Int64(*v),
        DbValue::Uint64(v) => SqlParam::Int64(to_bigint("value", *v)?),
        DbValue::Text(v) => SqlParam::Text(v.clone()),
        DbValue::Bytes(v) => SqlParam::Bytes(v.clone()),
        DbValue::Address(v) => SqlParam::Bytes(v.to_vec()),
        DbValue::Bytes32(v) => SqlParam::Bytes(v.to_vec()),
        DbValue::Numeric(v) => SqlParam::Text(v.clone()),
        DbValue::Timestamp(v) => SqlParam::Float64(*v as f64),
        DbValue::Json(v) => SqlParam::Json(v.clone()),
    })
}

fn convert_values_to_params(values: &[DbValue]) -> Result<Vec<SqlParam>, DbError> {
    values.iter().map(convert_db_value).collect()
}

/// Generate the SQL placeholder for a value at the given parameter index.
/// Uses casts for types that need special handling:
/// - Timestamp → `to_timestamp($N)`
/// - Numeric → `$N::text::numeric` (sent as text, cast by PostgreSQL)
fn placeholder_for(value: &DbValue, param_idx: usize) -> String {
    match value {
        DbValue::Timestamp(_) => format!("to_timestamp(${})", param_idx),
        DbValue::Numeric(_) => format!("${}::text::numeric", param_idx),
        _ => format!("${}", param_idx),
    }
}

/// Wrap an identifier in double quotes to handle reserved keywords.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn quote_cols(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn placeholders(values: &[DbValue]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder_for(v, i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn build_operation_sql(op: &DbOperation) -> Result<(String, Vec<SqlParam>), DbError> {
    match op {
        DbOperation::Insert {
            schema,
            table,
            columns,
            values,
        } => build_insert_sql(schema, table, columns, values),
        DbOperation::Upsert {
            schema,
            table,
            columns,
            values,
            conflict_columns,
            on_conflict,
        } => build_upsert_sql(schema, table, columns, values, conflict_columns, on_conflict),
    }
}

fn build_insert_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    values: &[DbValue],
) -> Result<(String, Vec<SqlParam>), DbError> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(schema, table),
        quote_cols(columns),
        placeholders(values)
    );

    Ok((sql, convert_values_to_params(values)?))
}

fn build_upsert_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    values: &[DbValue],
    conflict_columns: &[String],
    on_conflict: &OnConflict,
) -> Result<(String, Vec<SqlParam>), DbError> {
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({})",
        qualified_table(schema, table),
        quote_cols(columns),
        placeholders(values),
        quote_cols(conflict_columns)
    );

    let sql = match on_conflict {
        OnConflict::DoUpdate(update_columns) if !update_columns.is_empty() => {
            let updates = update_columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} DO UPDATE SET {}", insert, updates)
        }
        _ => format!("{} DO NOTHING", insert),
    };

    Ok((sql, convert_values_to_params(values)?))
}
