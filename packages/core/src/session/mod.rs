//! Sessions and the command pipeline
//!
//! - [`Session`] - per-connection state plus the `scope -> operation -> handler`
//!   dispatch table
//! - [`SessionManager`] - session lifecycle, idle expiry, and the single
//!   executor every command runs on
//! - [`catalog`] - command aliases, argument bounds and help text
//! - `history` - per-session undo/redo of node edits

pub mod catalog;
mod error;
mod handlers;
mod history;
mod manager;
#[allow(clippy::module_inception)]
mod session;
mod validation;

pub use error::SessionError;
pub use manager::{SessionManager, SessionManagerConfig, COMMAND_LOG_TARGET};
pub use session::Session;
pub use validation::command_prepare;
