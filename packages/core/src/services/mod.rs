//! Business Services
//!
//! This module contains the domain managers and their composition root:
//!
//! - `UserManager` - Accounts, password hashing and authentication
//! - `MindmapManager` - Mindmap metadata and owner/public-read access control
//! - `NodeManager` - Tree operations: add, move, update, delete, sort, find
//! - `DataManager` - Wires the managers to the store and the event bus, and
//!   runs mindmap import/export
//!
//! Managers never touch each other's tables. Cross-entity effects (cascading
//! deletes, root/mindmap renames, tree hydration) travel over the event bus.

mod data_manager;
pub mod error;
pub mod file_io;
mod mindmap_manager;
mod node_manager;
mod user_manager;

pub use data_manager::DataManager;
pub use error::{ErrorKind, ServiceError};
pub use file_io::{DocumentFormat, MindmapDocument};
pub use mindmap_manager::{permission_for, MindmapManager};
pub use node_manager::NodeManager;
pub use user_manager::UserManager;
