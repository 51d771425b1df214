//! Node Manager
//!
//! Owns the node tree of every mindmap: adding, moving, updating, deleting,
//! sorting and searching nodes, and keeping positional indices consistent.
//!
//! # Hydration
//!
//! Operations take the caller's `&mut Mindmap` (held under the session's
//! mindmap lock). Each one first calls [`NodeManager::mindmap_ensure_loaded`],
//! which creates the root if it is missing and loads the tree from the store.
//! The `MindmapSelected` handler runs the same routine, so whichever gets
//! there first does the work and the other sees a hydrated tree.
//!
//! # Persistence
//!
//! Structural operations apply the change in memory, compute the index
//! rewrites, then persist. When the store rejects the write, the in-memory
//! tree is restored from a snapshot.

use crate::db::{DatabaseError, MindmapStore, NodeStore};
use crate::events::{Event, EventBus, EventKind};
use crate::models::{
    child_index, is_valid_index, FindFields, IndexChange, Mindmap, MindmapFilter, NewNode, Node,
    NodeFilter, NodeInfo, NodePatch, NodeUpdate, SharedMindmap, ROOT_INDEX, ROOT_NODE_ID, ROOT_PARENT_ID,
};
use crate::services::error::ServiceError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

pub struct NodeManager {
    store: Arc<dyn NodeStore>,
    /// Read-only here: root renames check the owner's mindmap names
    mindmaps: Arc<dyn MindmapStore>,
    bus: Arc<EventBus>,
}

impl NodeManager {
    pub fn new(
        store: Arc<dyn NodeStore>,
        mindmaps: Arc<dyn MindmapStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            mindmaps,
            bus,
        }
    }

    /// Subscribe to mindmap lifecycle events
    pub fn register(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::MindmapAdded, "NodeManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (Some(manager), Event::MindmapAdded(mindmap)) => {
                            manager.root_ensure(mindmap.id, &mindmap.name).await?;
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            });

        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::MindmapDeleted, "NodeManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (Some(manager), Event::MindmapDeleted(mindmap)) => {
                            manager.store.node_delete_all(mindmap.id).await?;
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            });

        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::MindmapUpdated, "NodeManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (Some(manager), Event::MindmapUpdated { mindmap, old_name })
                            if mindmap.name != old_name =>
                        {
                            manager.root_rename_stored(mindmap.id, &mindmap.name).await?;
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            });

        let weak = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::MindmapSelected, "NodeManager", move |event| {
                let manager = weak.upgrade();
                async move {
                    match (manager, event) {
                        (Some(manager), Event::MindmapSelected(shared)) => {
                            manager.mindmap_hydrate(&shared).await?;
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            });
    }

    /// Create the root of `mindmap_id` unless it already exists
    ///
    /// Safe to race: a concurrent insert of the same root counts as success.
    pub async fn root_ensure(&self, mindmap_id: i64, name: &str) -> Result<(), ServiceError> {
        let existing = self
            .store
            .node_get(mindmap_id, &NodeFilter::by_id(ROOT_NODE_ID))
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let root = NewNode {
            parent_id: ROOT_PARENT_ID,
            name: name.to_string(),
            index: ROOT_INDEX.to_string(),
            content: BTreeMap::new(),
        };
        match self.store.node_add(mindmap_id, root, Some(ROOT_NODE_ID)).await {
            Ok(_) => {
                tracing::debug!("Created root of mindmap {}", mindmap_id);
                Ok(())
            }
            Err(DatabaseError::DuplicateKey(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn root_rename_stored(&self, mindmap_id: i64, name: &str) -> Result<(), ServiceError> {
        let patch = NodePatch {
            name: Some(name.to_string()),
            ..Default::default()
        };
        match self.store.node_update(mindmap_id, ROOT_NODE_ID, &patch).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound { .. }) => self.root_ensure(mindmap_id, name).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the in-memory tree with the stored one
    pub async fn mindmap_load(&self, mindmap: &mut Mindmap) -> Result<(), ServiceError> {
        let nodes = self
            .store
            .node_get(mindmap.id, &NodeFilter::default())
            .await?;
        mindmap.nodes = nodes.into_iter().map(|node| (node.id, node)).collect();
        mindmap.link_children();
        tracing::debug!(
            "Loaded {} node(s) of mindmap {}",
            mindmap.nodes.len(),
            mindmap.id
        );
        Ok(())
    }

    /// Make sure the root exists and the tree is hydrated
    pub async fn mindmap_ensure_loaded(&self, mindmap: &mut Mindmap) -> Result<(), ServiceError> {
        if mindmap.is_loaded() {
            return Ok(());
        }
        self.root_ensure(mindmap.id, &mindmap.name).await?;
        self.mindmap_load(mindmap).await
    }

    async fn mindmap_hydrate(&self, shared: &SharedMindmap) -> Result<(), ServiceError> {
        let mut mindmap = shared.lock().await;
        self.mindmap_ensure_loaded(&mut mindmap).await
    }

    /// Resolve a user-supplied identifier: a dotted index, or an id with `by_id`
    pub fn node_resolve(
        &self,
        mindmap: &Mindmap,
        identifier: &str,
        by_id: bool,
    ) -> Result<i64, ServiceError> {
        let found = if by_id {
            let id: i64 = identifier.parse().map_err(|_| {
                ServiceError::invalid_argument(format!("'{}' is not a node id", identifier))
            })?;
            mindmap.node(id)
        } else {
            if !is_valid_index(identifier) {
                return Err(ServiceError::invalid_argument(format!(
                    "'{}' is not a node index",
                    identifier
                )));
            }
            mindmap.node_by_index(identifier)
        };
        found
            .map(|node| node.id)
            .ok_or_else(|| ServiceError::NodeNotFound(identifier.to_string()))
    }

    /// Add `name` under `parent_id`; returns the new node's id
    ///
    /// The index continues after the highest sibling rank in the store.
    #[instrument(skip(self, mindmap, content), fields(mindmap_id = mindmap.id))]
    pub async fn node_add(
        &self,
        mindmap: &mut Mindmap,
        parent_id: i64,
        name: &str,
        content: BTreeMap<String, String>,
        force_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;

        if name.is_empty() {
            return Err(ServiceError::invalid_argument("node name must not be empty"));
        }
        let parent_index = mindmap
            .node(parent_id)
            .map(|parent| parent.index.clone())
            .ok_or(ServiceError::ParentNotFound(parent_id))?;

        let siblings = self
            .store
            .node_get(mindmap.id, &NodeFilter::by_parent(parent_id))
            .await?;
        let highest = siblings
            .iter()
            .filter(|sibling| sibling.id != parent_id)
            .map(Node::rank)
            .filter(|rank| *rank != u64::MAX)
            .max()
            .unwrap_or(0);
        let index = child_index(&parent_index, highest as usize + 1);

        let new_node = NewNode {
            parent_id,
            name: name.to_string(),
            index: index.clone(),
            content: content.clone(),
        };
        let id = self.store.node_add(mindmap.id, new_node, force_id).await?;

        let now = chrono::Utc::now();
        mindmap.nodes.insert(
            id,
            Node {
                id,
                mindmap_id: mindmap.id,
                parent_id,
                name: name.to_string(),
                index,
                content,
                children: Vec::new(),
                created: now,
                updated: now,
            },
        );
        if let Some(parent) = mindmap.nodes.get_mut(&parent_id) {
            parent.children.push(id);
        }

        tracing::debug!("Added node {} under {}", id, parent_id);
        Ok(id)
    }

    /// Snapshot of one node
    pub async fn node_get(&self, mindmap: &mut Mindmap, node_id: i64) -> Result<Node, ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;
        mindmap
            .node(node_id)
            .cloned()
            .ok_or_else(|| ServiceError::NodeNotFound(node_id.to_string()))
    }

    /// Rename, edit content, and/or re-parent a node
    ///
    /// Content entries merge; an empty value removes the key. Renaming the
    /// root renames the mindmap too, so the new name must be free among the
    /// owner's mindmaps. A re-parent is persisted before the rename.
    #[instrument(skip(self, mindmap, update), fields(mindmap_id = mindmap.id))]
    pub async fn node_update(
        &self,
        mindmap: &mut Mindmap,
        node_id: i64,
        update: NodeUpdate,
    ) -> Result<(), ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;

        let current = mindmap
            .node(node_id)
            .cloned()
            .ok_or_else(|| ServiceError::NodeNotFound(node_id.to_string()))?;

        if let Some(target) = update.parent_id {
            if current.is_root() {
                return Err(ServiceError::root_protected("the root cannot be moved"));
            }
            if mindmap.node(target).is_none() {
                return Err(ServiceError::ParentNotFound(target));
            }
            if mindmap.is_within(target, node_id) {
                return Err(ServiceError::MoveWouldCreateCycle {
                    node_id,
                    target_id: target,
                });
            }
        }
        if let Some(name) = &update.name {
            if name.is_empty() {
                return Err(ServiceError::invalid_argument("node name must not be empty"));
            }
        }

        let renamed = update
            .name
            .clone()
            .filter(|name| *name != current.name);
        if let (true, Some(name)) = (current.is_root(), &renamed) {
            self.root_name_check(mindmap, name).await?;
        }
        let content = if update.content.is_empty() {
            None
        } else {
            let mut merged = current.content.clone();
            for (key, value) in &update.content {
                if value.is_empty() {
                    merged.remove(key);
                } else {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(merged)
        };

        if let Some(target) = update.parent_id {
            self.node_relink(mindmap, node_id, target).await?;
        }

        if renamed.is_some() || content.is_some() {
            let patch = NodePatch {
                name: renamed.clone(),
                content: content.clone(),
                ..Default::default()
            };
            self.store.node_update(mindmap.id, node_id, &patch).await?;
            if let Some(node) = mindmap.nodes.get_mut(&node_id) {
                if let Some(name) = &renamed {
                    node.name = name.clone();
                }
                if let Some(content) = content {
                    node.content = content;
                }
                node.updated = chrono::Utc::now();
            }
        }

        if let (true, Some(new_name)) = (current.is_root(), renamed) {
            mindmap.name = new_name.clone();
            self.bus
                .publish(Event::RootNodeRenamed {
                    mindmap_id: mindmap.id,
                    old_name: current.name.clone(),
                    new_name,
                })
                .settled()
                .await;
        }

        self.bus.publish(Event::NodeUpdated {
            mindmap_id: mindmap.id,
            node_id,
        });
        Ok(())
    }

    /// Fail with `DuplicateKey` when another mindmap of the owner is called `name`
    async fn root_name_check(&self, mindmap: &Mindmap, name: &str) -> Result<(), ServiceError> {
        let filter = MindmapFilter {
            name: Some(name.to_string()),
            owner: Some(mindmap.owner.clone()),
            ..Default::default()
        };
        let taken = self.mindmaps.mindmap_get(&filter).await?;
        if taken.iter().any(|other| other.id != mindmap.id) {
            return Err(ServiceError::duplicate_key("Mindmap", name));
        }
        Ok(())
    }

    /// Detach `node_id`, append it under `target`, and persist the new layout
    async fn node_relink(
        &self,
        mindmap: &mut Mindmap,
        node_id: i64,
        target: i64,
    ) -> Result<(), ServiceError> {
        let snapshot = mindmap.nodes.clone();
        let old_parent = mindmap.node(node_id).map(|node| node.parent_id);

        if let Some(parent) = old_parent.and_then(|id| mindmap.nodes.get_mut(&id)) {
            parent.children.retain(|child| *child != node_id);
        }
        if let Some(parent) = mindmap.nodes.get_mut(&target) {
            parent.children.push(node_id);
        }
        if let Some(node) = mindmap.nodes.get_mut(&node_id) {
            node.parent_id = target;
        }

        let mut changes = mindmap.reindex();
        match changes.iter_mut().find(|change| change.id == node_id) {
            Some(change) => change.parent_id = Some(target),
            None => changes.push(IndexChange {
                id: node_id,
                index: mindmap
                    .node(node_id)
                    .map(|node| node.index.clone())
                    .unwrap_or_default(),
                parent_id: Some(target),
            }),
        }

        if let Err(e) = self.store.node_reindex(mindmap.id, &changes).await {
            mindmap.nodes = snapshot;
            return Err(e.into());
        }
        tracing::debug!("Moved node {} under {}", node_id, target);
        Ok(())
    }

    /// Move `node_id` to the end of `target`'s children
    pub async fn node_move(
        &self,
        mindmap: &mut Mindmap,
        node_id: i64,
        target: i64,
    ) -> Result<(), ServiceError> {
        self.node_update(
            mindmap,
            node_id,
            NodeUpdate {
                parent_id: Some(target),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete `node_id` and its whole subtree
    #[instrument(skip(self, mindmap), fields(mindmap_id = mindmap.id))]
    pub async fn node_delete(&self, mindmap: &mut Mindmap, node_id: i64) -> Result<(), ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;

        if node_id == ROOT_NODE_ID {
            return Err(ServiceError::root_protected("the root cannot be deleted"));
        }
        let parent_id = mindmap
            .node(node_id)
            .map(|node| node.parent_id)
            .ok_or_else(|| ServiceError::NodeNotFound(node_id.to_string()))?;

        let doomed = mindmap.subtree_ids(node_id);
        self.store.node_delete(mindmap.id, &doomed).await?;

        for id in &doomed {
            mindmap.nodes.remove(id);
        }
        if let Some(parent) = mindmap.nodes.get_mut(&parent_id) {
            parent.children.retain(|child| *child != node_id);
        }

        let changes = mindmap.reindex();
        if let Err(e) = self.store.node_reindex(mindmap.id, &changes).await {
            // Deletion is committed; reload to match whatever the store holds
            tracing::error!("Reindex after deleting node {} failed: {}", node_id, e);
            self.mindmap_load(mindmap).await?;
            return Err(e.into());
        }

        tracing::debug!("Deleted {} node(s) rooted at {}", doomed.len(), node_id);
        self.bus.publish(Event::NodeDeleted {
            mindmap_id: mindmap.id,
            node_id,
        });
        Ok(())
    }

    /// Case-insensitive substring search in pre-order
    pub async fn node_find(
        &self,
        mindmap: &mut Mindmap,
        fields: FindFields,
        query: &str,
    ) -> Result<Vec<NodeInfo>, ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;

        let needle = query.to_lowercase();
        let matches = |node: &Node| {
            (fields.name && node.name.to_lowercase().contains(&needle))
                || (fields.content
                    && node.content.iter().any(|(key, value)| {
                        key.to_lowercase().contains(&needle)
                            || value.to_lowercase().contains(&needle)
                    }))
                || (fields.index && node.index.contains(query))
        };

        Ok(mindmap
            .preorder()
            .into_iter()
            .filter_map(|id| mindmap.node(id))
            .filter(|node| matches(node))
            .map(NodeInfo::from)
            .collect())
    }

    /// Recursively sort the subtree under `node_id`
    ///
    /// Orders by `content[field]` (or by name with an empty field); see
    /// [`compare_nodes`](crate::models::compare_nodes).
    #[instrument(skip(self, mindmap), fields(mindmap_id = mindmap.id))]
    pub async fn node_sort(
        &self,
        mindmap: &mut Mindmap,
        node_id: i64,
        field: &str,
        reverse: bool,
    ) -> Result<(), ServiceError> {
        self.mindmap_ensure_loaded(mindmap).await?;
        if mindmap.node(node_id).is_none() {
            return Err(ServiceError::NodeNotFound(node_id.to_string()));
        }

        let snapshot = mindmap.nodes.clone();
        mindmap.sort_subtree(node_id, field, reverse);
        let changes = mindmap.reindex();
        if let Err(e) = self.store.node_reindex(mindmap.id, &changes).await {
            mindmap.nodes = snapshot;
            return Err(e.into());
        }

        tracing::debug!("Sorted under node {} ({} index change(s))", node_id, changes.len());
        self.bus.publish(Event::NodeSorted {
            mindmap_id: mindmap.id,
            node_id,
        });
        Ok(())
    }

    pub fn node_to_info(&self, node: &Node) -> NodeInfo {
        NodeInfo::from(node)
    }
}
