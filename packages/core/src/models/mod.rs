//! Data Models
//!
//! This module contains the core data structures used throughout Mindnoscape:
//!
//! - `User` - Account that owns mindmaps
//! - `Mindmap` - Named tree of nodes held as an id-keyed arena
//! - `Node` - Tree element with dotted positional index and key/value content
//! - `Command` - Parsed `scope operation args` unit of work
//!
//! Store-facing types (`New*`, `*Filter`, `*Patch`) sit next to the entity
//! they describe.

mod command;
mod mindmap;
mod node;
mod user;

pub use command::{Command, CommandOutput, FLAG_ID, FLAG_REVERSE};
pub use mindmap::{
    compare_nodes, Mindmap, MindmapFilter, MindmapInfo, MindmapPatch, NewMindmap, Permission,
    SharedMindmap,
};
pub use node::{
    child_index, index_rank, is_valid_index, FindFields, IndexChange, NewNode, Node, NodeFilter,
    NodeInfo, NodePatch, NodeUpdate, ROOT_INDEX, ROOT_NODE_ID, ROOT_PARENT_ID,
};
pub use user::{NewUser, User, UserFilter, UserInfo, UserPatch};
