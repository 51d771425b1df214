//! Adapters
//!
//! Adapters run their own I/O loops and turn input into [`Command`]s, which
//! the [`AdapterManager`] routes to the session bound to each connection.
//!
//! [`Command`]: crate::models::Command

mod manager;
pub mod stdio;

pub use manager::{Adapter, AdapterManager};
pub use stdio::{CommandSource, LineSource, Presenter, StdioAdapter, TextPresenter};
