//! Mindmap Data Structures
//!
//! A mindmap is a named tree owned by one user. The tree is held as an
//! id-keyed arena: `nodes` owns every node, and each node lists its children
//! by id in rank order. The root always lives at [`ROOT_NODE_ID`].
//!
//! Tree algorithms that only touch in-memory state live here so they can be
//! exercised without a store: index recalculation, recursive sort, subtree
//! collection, cycle detection, and text rendering.

use crate::models::node::{child_index, IndexChange, Node, ROOT_INDEX, ROOT_NODE_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mindmap shared between a session and the hydration event handler
pub type SharedMindmap = Arc<Mutex<Mindmap>>;

/// Access level a user holds on a mindmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    None = 0,
    Read = 1,
    Owner = 2,
}

impl Permission {
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Permission::None => "none",
            Permission::Read => "read",
            Permission::Owner => "owner",
        };
        f.write_str(label)
    }
}

/// Named, owned tree of nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Mindmap {
    pub id: i64,
    pub name: String,
    /// Username of the owner
    pub owner: String,
    pub is_public: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Hydrated tree; empty until loaded from the store
    pub nodes: HashMap<i64, Node>,
}

/// Values required to insert a mindmap
#[derive(Debug, Clone)]
pub struct NewMindmap {
    pub name: String,
    pub owner: String,
    pub is_public: bool,
}

/// Conjunctive lookup predicate; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct MindmapFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub is_public: Option<bool>,
}

impl MindmapFilter {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Default::default()
        }
    }
}

/// Partial update applied by the store
#[derive(Debug, Clone, Default)]
pub struct MindmapPatch {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

/// Presentation summary of a mindmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindmapInfo {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub is_public: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Present only when the tree is hydrated
    pub node_count: Option<usize>,
    /// Present only when the tree is hydrated; a lone root has depth 1
    pub depth: Option<usize>,
}

impl fmt::Display for MindmapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (owner {}, {}",
            self.name,
            self.owner,
            if self.is_public { "public" } else { "private" }
        )?;
        if let (Some(count), Some(depth)) = (self.node_count, self.depth) {
            write!(f, ", {} nodes, depth {}", count, depth)?;
        }
        write!(f, ")")
    }
}

/// Sort key of one value: missing values first, then numbers, then text
#[derive(Debug, Clone, Copy)]
enum SortKey<'a> {
    Missing,
    Number(f64),
    Text(&'a str),
}

impl<'a> SortKey<'a> {
    fn of(value: &'a str) -> Self {
        if value.is_empty() {
            return SortKey::Missing;
        }
        match value.parse::<f64>() {
            Ok(number) => SortKey::Number(number),
            Err(_) => SortKey::Text(value),
        }
    }

    fn compare(self, other: SortKey<'_>) -> Ordering {
        match (self, other) {
            (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
            (SortKey::Missing, _) => Ordering::Less,
            (_, SortKey::Missing) => Ordering::Greater,
            (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(&y),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        }
    }
}

/// Sibling ordering used by `node sort`
///
/// Compares `content[field]` when a field is given, otherwise the names.
/// Numbers compare numerically and sort before text; missing values sort
/// first. Ties fall back to the name, then the id, so the order is total.
pub fn compare_nodes(a: &Node, b: &Node, field: &str) -> Ordering {
    let value = |node: &Node| -> String {
        if field.is_empty() {
            node.name.clone()
        } else {
            node.content.get(field).cloned().unwrap_or_default()
        }
    };
    let (value_a, value_b) = (value(a), value(b));

    SortKey::of(&value_a)
        .compare(SortKey::of(&value_b))
        .then_with(|| SortKey::of(&a.name).compare(SortKey::of(&b.name)))
        .then_with(|| a.id.cmp(&b.id))
}

impl Mindmap {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        owner: impl Into<String>,
        is_public: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            owner: owner.into(),
            is_public,
            created: now,
            updated: now,
            nodes: HashMap::new(),
        }
    }

    /// Whether the node tree has been loaded from the store
    pub fn is_loaded(&self) -> bool {
        self.nodes.contains_key(&ROOT_NODE_ID)
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&ROOT_NODE_ID)
    }

    pub fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_by_index(&self, index: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.index == index)
    }

    /// Child ids of `parent_id` found by scanning parent links
    fn children_by_scan(&self, parent_id: i64) -> Vec<i64> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| node.parent_id == parent_id && node.id != parent_id)
            .collect();
        children.sort_by(|a, b| a.rank().cmp(&b.rank()).then(a.id.cmp(&b.id)));
        children.into_iter().map(|node| node.id).collect()
    }

    /// Rebuild every `children` list from parent links, ordered by index rank
    pub fn link_children(&mut self) {
        let ids: Vec<i64> = self.nodes.keys().copied().collect();
        let links: Vec<(i64, Vec<i64>)> = ids
            .into_iter()
            .map(|id| (id, self.children_by_scan(id)))
            .collect();
        for (id, children) in links {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children = children;
            }
        }
    }

    /// Whether `node_id` equals `ancestor_id` or lies beneath it
    pub fn is_within(&self, node_id: i64, ancestor_id: i64) -> bool {
        let mut current = Some(node_id);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&id).map(|node| node.parent_id);
        }
        false
    }

    /// `node_id` and every descendant, found through parent links
    pub fn subtree_ids(&self, node_id: i64) -> Vec<i64> {
        let mut by_parent: HashMap<i64, Vec<i64>> = HashMap::new();
        for node in self.nodes.values() {
            if node.id != node.parent_id {
                by_parent.entry(node.parent_id).or_default().push(node.id);
            }
        }

        let mut collected = Vec::new();
        let mut queue = VecDeque::from([node_id]);
        while let Some(id) = queue.pop_front() {
            if collected.contains(&id) {
                continue;
            }
            collected.push(id);
            if let Some(children) = by_parent.get(&id) {
                queue.extend(children.iter().copied());
            }
        }
        collected
    }

    /// Node ids in pre-order, following `children`
    pub fn preorder(&self) -> Vec<i64> {
        self.preorder_from(ROOT_NODE_ID)
    }

    pub fn preorder_from(&self, start: i64) -> Vec<i64> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Recompute every index from the current `children` order
    ///
    /// Returns only the nodes whose index changed. Running it twice yields an
    /// empty second result.
    pub fn reindex(&mut self) -> Vec<IndexChange> {
        let mut changes = Vec::new();
        let mut queue = VecDeque::from([(ROOT_NODE_ID, ROOT_INDEX.to_string())]);

        while let Some((id, expected)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.index != expected {
                node.index = expected.clone();
                changes.push(IndexChange {
                    id,
                    index: expected.clone(),
                    parent_id: None,
                });
            }
            for (position, child_id) in node.children.iter().enumerate() {
                queue.push_back((*child_id, child_index(&expected, position + 1)));
            }
        }
        changes
    }

    /// Stable recursive sort of the subtree rooted at `node_id`
    pub fn sort_subtree(&mut self, node_id: i64, field: &str, reverse: bool) {
        for id in self.preorder_from(node_id) {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let mut children: Vec<&Node> = node
                .children
                .iter()
                .filter_map(|child| self.nodes.get(child))
                .collect();
            children.sort_by(|a, b| {
                let ordering = compare_nodes(a, b, field);
                if reverse {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
            let sorted: Vec<i64> = children.into_iter().map(|child| child.id).collect();
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children = sorted;
            }
        }
    }

    /// Number of levels in the tree; 0 when not hydrated
    pub fn depth(&self) -> usize {
        fn walk(mindmap: &Mindmap, id: i64) -> usize {
            mindmap
                .nodes
                .get(&id)
                .map(|node| {
                    1 + node
                        .children
                        .iter()
                        .map(|child| walk(mindmap, *child))
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0)
        }
        walk(self, ROOT_NODE_ID)
    }

    /// Indented text view of the subtree rooted at `start`
    pub fn render(&self, start: i64, show_ids: bool) -> String {
        let base_depth = self
            .nodes
            .get(&start)
            .map(|node| if node.is_root() { 0 } else { node.index.split('.').count() })
            .unwrap_or(0);

        let mut lines = Vec::new();
        for id in self.preorder_from(start) {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let depth = if node.is_root() {
                0
            } else {
                node.index.split('.').count() - base_depth
            };
            let mut line = format!("{}{} {}", "  ".repeat(depth), node.index, node.name);
            if show_ids {
                line.push_str(&format!(" [{}]", node.id));
            }
            for (key, value) in &node.content {
                line.push_str(&format!(" {}:{}", key, value));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    pub fn info(&self) -> MindmapInfo {
        let loaded = self.is_loaded();
        MindmapInfo {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            is_public: self.is_public,
            created: self.created,
            updated: self.updated,
            node_count: loaded.then(|| self.nodes.len()),
            depth: loaded.then(|| self.depth()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::ROOT_PARENT_ID;
    use std::collections::BTreeMap;

    fn node(id: i64, parent_id: i64, name: &str, index: &str) -> Node {
        let now = Utc::now();
        Node {
            id,
            mindmap_id: 1,
            parent_id,
            name: name.to_string(),
            index: index.to_string(),
            content: BTreeMap::new(),
            children: Vec::new(),
            created: now,
            updated: now,
        }
    }

    fn sample() -> Mindmap {
        let mut mindmap = Mindmap::new(1, "ideas", "alice", false);
        for n in [
            node(0, ROOT_PARENT_ID, "ideas", "0"),
            node(1, 0, "first", "1"),
            node(2, 0, "second", "2"),
            node(3, 1, "nested", "1.1"),
            node(4, 3, "deep", "1.1.1"),
        ] {
            mindmap.nodes.insert(n.id, n);
        }
        mindmap.link_children();
        mindmap
    }

    #[test]
    fn test_link_children_orders_by_rank() {
        let mindmap = sample();
        assert_eq!(mindmap.root().map(|r| r.children.clone()), Some(vec![1, 2]));
        assert_eq!(mindmap.node(1).map(|n| n.children.clone()), Some(vec![3]));
    }

    #[test]
    fn test_reindex_after_move_and_idempotent() {
        let mut mindmap = sample();
        // move "nested" under "second"
        mindmap.nodes.get_mut(&1).unwrap().children.clear();
        mindmap.nodes.get_mut(&2).unwrap().children.push(3);
        mindmap.nodes.get_mut(&3).unwrap().parent_id = 2;

        let changes = mindmap.reindex();
        assert_eq!(mindmap.node(3).unwrap().index, "2.1");
        assert_eq!(mindmap.node(4).unwrap().index, "2.1.1");
        assert_eq!(changes.len(), 2);
        assert!(mindmap.reindex().is_empty());
    }

    #[test]
    fn test_subtree_ids_uses_parent_links() {
        let mut mindmap = sample();
        // stale children list must not hide descendants
        mindmap.nodes.get_mut(&1).unwrap().children.clear();
        let mut ids = mindmap.subtree_ids(1);
        ids.sort();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn test_is_within_detects_descendants() {
        let mindmap = sample();
        assert!(mindmap.is_within(4, 1));
        assert!(mindmap.is_within(1, 1));
        assert!(!mindmap.is_within(2, 1));
    }

    #[test]
    fn test_sort_numeric_then_reverse() {
        let mut mindmap = Mindmap::new(1, "m", "alice", false);
        let mut root = node(0, ROOT_PARENT_ID, "m", "0");
        root.children = vec![1, 2, 3];
        mindmap.nodes.insert(0, root);
        for (id, name, priority) in [(1, "A", "10"), (2, "B", "2"), (3, "C", "5")] {
            let mut n = node(id, 0, name, &id.to_string());
            n.content.insert("priority".to_string(), priority.to_string());
            mindmap.nodes.insert(id, n);
        }

        mindmap.sort_subtree(0, "priority", false);
        assert_eq!(mindmap.root().unwrap().children, vec![2, 3, 1]);

        mindmap.sort_subtree(0, "priority", true);
        assert_eq!(mindmap.root().unwrap().children, vec![1, 3, 2]);
    }

    #[test]
    fn test_compare_falls_back_to_names_when_values_empty() {
        let a = node(1, 0, "alpha", "1");
        let b = node(2, 0, "beta", "2");
        assert_eq!(compare_nodes(&a, &b, "missing"), Ordering::Less);
        assert_eq!(compare_nodes(&b, &a, ""), Ordering::Greater);
    }

    #[test]
    fn test_compare_is_total_over_mixed_values() {
        let with = |id: i64, value: &str| {
            let mut n = node(id, 0, "same", &id.to_string());
            n.content.insert("v".to_string(), value.to_string());
            n
        };
        let (nine, ten, text) = (with(1, "9"), with(2, "10"), with(3, "1a"));
        assert_eq!(compare_nodes(&nine, &ten, "v"), Ordering::Less);
        assert_eq!(compare_nodes(&ten, &text, "v"), Ordering::Less);
        assert_eq!(compare_nodes(&nine, &text, "v"), Ordering::Less);

        let nan = with(4, "NaN");
        assert_eq!(compare_nodes(&nan, &nan, "v"), Ordering::Equal);
        assert_ne!(compare_nodes(&nan, &ten, "v"), Ordering::Equal);
        // equal values and names still order by id
        assert_eq!(compare_nodes(&with(5, "7"), &with(6, "7"), "v"), Ordering::Less);
    }

    #[test]
    fn test_sort_many_mixed_siblings_is_deterministic() {
        let values = ["9", "10", "1a", "NaN", "", "inf", "-3", "x", "2.5", "10"];
        let build = |order: &[i64]| {
            let mut mindmap = Mindmap::new(1, "m", "alice", false);
            let mut root = node(0, ROOT_PARENT_ID, "m", "0");
            root.children = order.to_vec();
            mindmap.nodes.insert(0, root);
            for id in 1..=40i64 {
                let mut n = node(id, 0, &format!("n{}", id % 7), &id.to_string());
                let value = values[id as usize % values.len()];
                if !value.is_empty() {
                    n.content.insert("v".to_string(), value.to_string());
                }
                mindmap.nodes.insert(id, n);
            }
            mindmap
        };

        let forward: Vec<i64> = (1..=40).collect();
        let backward: Vec<i64> = forward.iter().rev().copied().collect();
        let mut a = build(&forward);
        let mut b = build(&backward);
        a.sort_subtree(0, "v", false);
        b.sort_subtree(0, "v", false);
        assert_eq!(a.root().unwrap().children, b.root().unwrap().children);

        let sorted = a.root().unwrap().children.clone();
        a.sort_subtree(0, "v", false);
        assert_eq!(a.root().unwrap().children, sorted);
    }

    #[test]
    fn test_depth_and_render() {
        let mindmap = sample();
        assert_eq!(mindmap.depth(), 4);
        let text = mindmap.render(0, false);
        assert_eq!(
            text,
            "0 ideas\n  1 first\n    1.1 nested\n      1.1.1 deep\n  2 second"
        );
        assert_eq!(mindmap.render(3, true), "1.1 nested [3]\n  1.1.1 deep [4]");
    }
}
