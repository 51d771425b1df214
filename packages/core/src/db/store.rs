//! Store Traits - Persistence Abstraction
//!
//! The managers talk to persistence only through these traits, one per
//! entity kind. Implementations must be `Send + Sync` so they can be shared
//! across event handler tasks.
//!
//! # Contract
//!
//! - Every multi-row operation is a single transaction: on success the
//!   database satisfies the tree invariants, on failure it is unchanged.
//! - Filters are conjunctive; `None` fields match everything.
//! - Constraint failures surface as [`DatabaseError::DuplicateKey`] or
//!   [`DatabaseError::ConstraintViolation`], missing rows as
//!   [`DatabaseError::NotFound`].

use crate::db::DatabaseError;
use crate::models::{
    IndexChange, Mindmap, MindmapFilter, MindmapPatch, NewMindmap, NewNode, NewUser, Node,
    NodeFilter, NodePatch, User, UserFilter, UserPatch,
};
use async_trait::async_trait;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and return its id
    async fn user_add(&self, user: NewUser) -> Result<i64, DatabaseError>;

    async fn user_get(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError>;

    async fn user_update(&self, user: &User, patch: &UserPatch) -> Result<(), DatabaseError>;

    async fn user_delete(&self, user: &User) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait MindmapStore: Send + Sync {
    /// Insert a mindmap and create its node tables in the same transaction
    async fn mindmap_add(&self, mindmap: NewMindmap) -> Result<i64, DatabaseError>;

    /// Matching mindmaps, metadata only (`nodes` left empty)
    async fn mindmap_get(&self, filter: &MindmapFilter) -> Result<Vec<Mindmap>, DatabaseError>;

    async fn mindmap_update(
        &self,
        mindmap: &Mindmap,
        patch: &MindmapPatch,
    ) -> Result<(), DatabaseError>;

    /// Drop the node tables and remove the row in one transaction
    async fn mindmap_delete(&self, mindmap: &Mindmap) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert a node and return its id
    ///
    /// With `force_id` the node is stored under that id instead of a
    /// generated one (used for the root and for imports).
    async fn node_add(
        &self,
        mindmap_id: i64,
        node: NewNode,
        force_id: Option<i64>,
    ) -> Result<i64, DatabaseError>;

    /// Matching nodes with content, `children` left empty
    async fn node_get(&self, mindmap_id: i64, filter: &NodeFilter)
        -> Result<Vec<Node>, DatabaseError>;

    async fn node_update(
        &self,
        mindmap_id: i64,
        node_id: i64,
        patch: &NodePatch,
    ) -> Result<(), DatabaseError>;

    /// Persist a batch of index rewrites in one transaction
    async fn node_reindex(
        &self,
        mindmap_id: i64,
        changes: &[IndexChange],
    ) -> Result<(), DatabaseError>;

    /// Delete the given nodes and their content in one transaction
    async fn node_delete(&self, mindmap_id: i64, node_ids: &[i64]) -> Result<(), DatabaseError>;

    /// Delete every node of a mindmap; a no-op when the tables are gone
    async fn node_delete_all(&self, mindmap_id: i64) -> Result<(), DatabaseError>;
}
