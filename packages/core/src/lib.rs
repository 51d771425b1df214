//! Mindnoscape Core
//!
//! Multi-user, multi-session mind-map engine: ordered trees of labelled nodes
//! with key/value content, persisted in an embedded libsql database and driven
//! by a uniform `scope operation args` command vocabulary.
//!
//! # Architecture
//!
//! - **Per-mindmap tables**: every mindmap gets its own `nodes_<id>` and
//!   `node_content_<id>` tables, named from the integer id only
//! - **Event-driven managers**: user, mindmap and node managers coordinate
//!   through an in-process event bus instead of calling each other
//! - **Serialised execution**: all commands run on one executor task, in
//!   submission order
//!
//! # Modules
//!
//! - [`models`] - Data structures (User, Mindmap, Node, Command)
//! - [`db`] - Database layer with libsql integration
//! - [`events`] - Typed publish/subscribe between managers
//! - [`services`] - Domain managers and import/export
//! - [`session`] - Sessions, command validation and the executor
//! - [`adapter`] - Connection adapters (stdio)
//! - [`config`] - JSON configuration file

pub mod adapter;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod services;
pub mod session;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use models::*;
pub use services::{DataManager, ErrorKind, ServiceError};
pub use session::{SessionError, SessionManager, SessionManagerConfig};
