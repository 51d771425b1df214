//! Domain Events
//!
//! Events published by the managers when state changes. Peers subscribe by
//! [`EventKind`] and react without calling each other directly: the node
//! manager creates roots on `MindmapAdded`, the mindmap manager cascades on
//! `UserDeleted`, and so on.

use crate::models::{Mindmap, SharedMindmap, User};

/// Domain events carried on the [`EventBus`](super::EventBus)
#[derive(Debug, Clone)]
pub enum Event {
    /// A user is about to be removed; owned mindmaps must go first
    UserDeleted(User),

    /// A mindmap row and its node tables exist; the root does not yet
    MindmapAdded(Mindmap),

    /// A mindmap is about to be removed; its nodes must go first
    MindmapDeleted(Mindmap),

    /// Mindmap metadata changed
    MindmapUpdated { mindmap: Mindmap, old_name: String },

    /// A session bound this mindmap; its tree should be hydrated
    MindmapSelected(SharedMindmap),

    /// The root node of a mindmap was renamed
    RootNodeRenamed {
        mindmap_id: i64,
        old_name: String,
        new_name: String,
    },

    NodeUpdated { mindmap_id: i64, node_id: i64 },

    NodeDeleted { mindmap_id: i64, node_id: i64 },

    NodeSorted { mindmap_id: i64, node_id: i64 },
}

/// Subscription key for [`Event`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserDeleted,
    MindmapAdded,
    MindmapDeleted,
    MindmapUpdated,
    MindmapSelected,
    RootNodeRenamed,
    NodeUpdated,
    NodeDeleted,
    NodeSorted,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UserDeleted(_) => EventKind::UserDeleted,
            Event::MindmapAdded(_) => EventKind::MindmapAdded,
            Event::MindmapDeleted(_) => EventKind::MindmapDeleted,
            Event::MindmapUpdated { .. } => EventKind::MindmapUpdated,
            Event::MindmapSelected(_) => EventKind::MindmapSelected,
            Event::RootNodeRenamed { .. } => EventKind::RootNodeRenamed,
            Event::NodeUpdated { .. } => EventKind::NodeUpdated,
            Event::NodeDeleted { .. } => EventKind::NodeDeleted,
            Event::NodeSorted { .. } => EventKind::NodeSorted,
        }
    }

    /// Short label for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::UserDeleted(_) => "user:deleted",
            Event::MindmapAdded(_) => "mindmap:added",
            Event::MindmapDeleted(_) => "mindmap:deleted",
            Event::MindmapUpdated { .. } => "mindmap:updated",
            Event::MindmapSelected(_) => "mindmap:selected",
            Event::RootNodeRenamed { .. } => "node:root-renamed",
            Event::NodeUpdated { .. } => "node:updated",
            Event::NodeDeleted { .. } => "node:deleted",
            Event::NodeSorted { .. } => "node:sorted",
        }
    }
}
