use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::db::DbError;

/// Connection settings for the shared store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Environment variable holding the PostgreSQL connection string.
    #[serde(default = "default_database_url_env_var")]
    pub url_env_var: String,

    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Directory of `.sql` migration files, applied in filename order.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

fn default_database_url_env_var() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env_var: default_database_url_env_var(),
            max_connections: default_max_connections(),
            migrations_dir: default_migrations_dir(),
        }
    }
}

impl DatabaseConfig {
    /// Read the connection string from the environment, loading `.env`
    /// first if the variable is not already set.
    pub fn database_url(&self) -> Result<String, DbError> {
        if let Ok(url) = env::var(&self.url_env_var) {
            return Ok(url);
        }

        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        env::var(&self.url_env_var).map_err(|_| {
            DbError::ConfigError(format!(
                "environment variable {} is not set",
                self.url_env_var
            ))
        })
    }
}
