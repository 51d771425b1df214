//! Database Layer
//!
//! This module handles all persistence using libsql:
//!
//! - Database initialization and connection management
//! - Shared `users` and `mindmaps` tables
//! - Per-mindmap `nodes_<id>` / `node_content_<id>` tables
//! - Store traits consumed by the managers, and their libsql implementation
//!
//! Managers depend on the traits in [`store`], never on libsql directly.

mod database;
mod error;
mod libsql_store;
mod store;

pub use database::{node_content_table, nodes_table, DatabaseService};
pub use error::DatabaseError;
pub use libsql_store::LibsqlStore;
pub use store::{MindmapStore, NodeStore, UserStore};
