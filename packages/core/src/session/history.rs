//! Per-session undo/redo of node edits
//!
//! Every successful `node add`, `update`, `move` and `delete` records a
//! [`NodeEdit`] holding enough of the tree to replay it in either direction.
//! Restored nodes keep their original ids, so later entries stay valid after
//! an undo/redo round. The history belongs to the selected mindmap and is
//! cleared whenever the selection changes.

use crate::models::{Mindmap, Node, NodeUpdate};
use crate::services::{NodeManager, ServiceError};
use crate::session::error::SessionError;
use std::collections::BTreeMap;

/// Edits kept per session
const HISTORY_LIMIT: usize = 100;

/// Name and content of a node at one point in time
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Revision {
    pub name: String,
    pub content: BTreeMap<String, String>,
}

impl From<&Node> for Revision {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            content: node.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeEdit {
    Add(Node),
    /// Deleted subtree, parents before children
    Delete(Vec<Node>),
    Move {
        node_id: i64,
        from: i64,
        to: i64,
    },
    Update {
        node_id: i64,
        before: Revision,
        after: Revision,
    },
}

impl NodeEdit {
    async fn apply(&self, nodes: &NodeManager, mindmap: &mut Mindmap) -> Result<(), ServiceError> {
        match self {
            NodeEdit::Add(node) => node_restore(nodes, mindmap, node).await,
            NodeEdit::Delete(subtree) => match subtree.first() {
                Some(top) => nodes.node_delete(mindmap, top.id).await,
                None => Ok(()),
            },
            NodeEdit::Move { node_id, to, .. } => nodes.node_move(mindmap, *node_id, *to).await,
            NodeEdit::Update { node_id, after, .. } => {
                revision_apply(nodes, mindmap, *node_id, after).await
            }
        }
    }

    async fn revert(&self, nodes: &NodeManager, mindmap: &mut Mindmap) -> Result<(), ServiceError> {
        match self {
            NodeEdit::Add(node) => nodes.node_delete(mindmap, node.id).await,
            NodeEdit::Delete(subtree) => {
                for node in subtree {
                    node_restore(nodes, mindmap, node).await?;
                }
                Ok(())
            }
            NodeEdit::Move { node_id, from, .. } => {
                nodes.node_move(mindmap, *node_id, *from).await
            }
            NodeEdit::Update {
                node_id, before, ..
            } => revision_apply(nodes, mindmap, *node_id, before).await,
        }
    }
}

/// Re-add `node` under its old parent with its old id
async fn node_restore(
    nodes: &NodeManager,
    mindmap: &mut Mindmap,
    node: &Node,
) -> Result<(), ServiceError> {
    nodes
        .node_add(
            mindmap,
            node.parent_id,
            &node.name,
            node.content.clone(),
            Some(node.id),
        )
        .await
        .map(|_| ())
}

/// Bring `node_id` to exactly the name and content of `target`
async fn revision_apply(
    nodes: &NodeManager,
    mindmap: &mut Mindmap,
    node_id: i64,
    target: &Revision,
) -> Result<(), ServiceError> {
    let current = nodes.node_get(mindmap, node_id).await?;
    // an empty value removes the key
    let mut content: BTreeMap<String, String> = current
        .content
        .keys()
        .filter(|key| !target.content.contains_key(*key))
        .map(|key| (key.clone(), String::new()))
        .collect();
    content.extend(target.content.clone());

    let update = NodeUpdate {
        name: Some(target.name.clone()),
        content,
        parent_id: None,
    };
    nodes.node_update(mindmap, node_id, update).await
}

/// Linear history with a cursor; recording after an undo drops the redo tail
#[derive(Debug, Default)]
pub(crate) struct History {
    edits: Vec<NodeEdit>,
    /// Number of edits currently applied
    applied: usize,
}

impl History {
    pub fn record(&mut self, edit: NodeEdit) {
        self.edits.truncate(self.applied);
        self.edits.push(edit);
        if self.edits.len() > HISTORY_LIMIT {
            self.edits.remove(0);
        }
        self.applied = self.edits.len();
    }

    pub fn clear(&mut self) {
        self.edits.clear();
        self.applied = 0;
    }

    /// Revert the latest applied edit; the cursor only moves on success
    pub async fn undo(
        &mut self,
        nodes: &NodeManager,
        mindmap: &mut Mindmap,
    ) -> Result<(), SessionError> {
        let edit = match self.applied.checked_sub(1).and_then(|i| self.edits.get(i)) {
            Some(edit) => edit.clone(),
            None => return Err(SessionError::invalid_argument("nothing to undo")),
        };
        edit.revert(nodes, mindmap).await?;
        self.applied -= 1;
        Ok(())
    }

    /// Re-apply the latest undone edit; the cursor only moves on success
    pub async fn redo(
        &mut self,
        nodes: &NodeManager,
        mindmap: &mut Mindmap,
    ) -> Result<(), SessionError> {
        let edit = self
            .edits
            .get(self.applied)
            .cloned()
            .ok_or_else(|| SessionError::invalid_argument("nothing to redo"))?;
        edit.apply(nodes, mindmap).await?;
        self.applied += 1;
        Ok(())
    }
}
