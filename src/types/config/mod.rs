pub mod database;
pub mod indexer;
pub mod transformer;
