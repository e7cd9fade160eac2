//! Storage Module
//!
//! SQLite-based persistent document store for memory records.

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{Storage, StoreStats};
