//! Infrastructure layer - database and Redis connections.

mod db;
pub mod migrations;
pub mod redis;

pub use db::Database;
pub use migrations::Migrator;
