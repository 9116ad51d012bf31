pub mod db;
pub mod logging;
pub mod transformations;
pub mod types;
