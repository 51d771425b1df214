//! Events
//!
//! Typed domain events and the in-process bus that carries them between the
//! user, mindmap and node managers.

mod bus;
mod event;

pub use bus::{Dispatch, EventBus};
pub use event::{Event, EventKind};
