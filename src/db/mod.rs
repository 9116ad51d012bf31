pub mod error;
pub mod headers;
pub mod migrations;
pub mod pool;
pub mod types;

pub use error::DbError;
pub use headers::HeaderRepository;
pub use pool::DbPool;
pub use types::{DbOperation, DbValue, OnConflict};
