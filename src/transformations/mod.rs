//! Transform-and-persist pipeline for decoded event logs.
//!
//! This module provides:
//! - Insertion models describing one row to write, with foreign keys given
//!   as natural keys
//! - Get-or-create resolution of natural keys to surrogate ids
//! - A per (header, transformer) checked-header ledger
//! - A repository that writes a header's models and its ledger update in
//!   one transaction
//! - Converter/transformer traits and a registry that routes logs to them
//!
//! # Architecture
//!
//! ```text
//! Logs for a header ──► TransformerRegistry ──► EventTransformer
//!                                                 │
//!                                                 ├─ Converter::to_models   (pure)
//!                                                 └─ Repository::persist    (one transaction)
//!                                                      ├─ ForeignKeyResolver  (get-or-create)
//!                                                      ├─ INSERT models
//!                                                      └─ checked_headers += 1
//! ```
//!
//! # Example Converter
//!
//! ```ignore
//! use event_transformer::transformations::{
//!     util, Converter, DecodeError, InsertionModel, TransformerConfig, ILK,
//! };
//! use event_transformer::types::log::DecodedLogEvent;
//!
//! pub struct VatFoldConverter;
//!
//! impl Converter for VatFoldConverter {
//!     fn to_models(
//!         &self,
//!         _config: &TransformerConfig,
//!         logs: &[DecodedLogEvent],
//!     ) -> Result<Vec<InsertionModel>, DecodeError> {
//!         let mut models = Vec::with_capacity(logs.len());
//!         for log in logs {
//!             util::verify_log(log, 4, 0)?;
//!             models.push(
//!                 InsertionModel::builder("maker", "vat_fold")
//!                     .column("header_id", log.header_id)
//!                     .column("log_index", log.log_index as i32)
//!                     .foreign_key("ilk_id", ILK, util::topic_to_string(log, 1)?)
//!                     .conflict_on(["header_id", "log_index"])
//!                     .build()?,
//!             );
//!         }
//!         Ok(models)
//!     }
//! }
//! ```

pub mod checked_headers;
pub mod error;
pub mod foreign_keys;
pub mod model;
pub mod registry;
pub mod repository;
pub mod traits;
pub mod transformer;
pub mod util;

// Re-exports for convenience
pub use checked_headers::CheckedHeaders;
pub use error::{DecodeError, ModelError, PersistError, ResolutionError, TransformationError};
pub use foreign_keys::{ForeignKeyResolver, ForeignKeyRole, NaturalKey, ADDRESS, ILK, URN};
pub use model::{Column, InsertionModel, ModelBuilder};
pub use registry::TransformerRegistry;
pub use repository::{PersistMode, Repository};
pub use traits::{Converter, Transformer};
pub use transformer::EventTransformer;
pub use crate::types::config::transformer::TransformerConfig;
