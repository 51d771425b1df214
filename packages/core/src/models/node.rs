//! Node Data Structures
//!
//! Nodes form the ordered tree of a mindmap. Every node carries a stable
//! numeric `id` and a positional `index` (dotted decimal path from the root).
//! The index is recomputed on every structural change; the id never is.
//!
//! # Index rule
//!
//! - Root: `"0"`
//! - Direct child of the root: `"k"` where `k` is the 1-based sibling rank
//! - Deeper descendants: `parent.index + "." + k`

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Identifier of the root node in every mindmap
pub const ROOT_NODE_ID: i64 = 0;

/// Parent marker stored on the root node
pub const ROOT_PARENT_ID: i64 = -1;

/// Positional index of the root node
pub const ROOT_INDEX: &str = "0";

fn index_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)*$").expect("valid index regex"))
}

/// Whether `index` is a well-formed dotted-decimal path
pub fn is_valid_index(index: &str) -> bool {
    index_pattern().is_match(index)
}

/// Final component of an index (the sibling rank); malformed input ranks last
pub fn index_rank(index: &str) -> u64 {
    index
        .rsplit('.')
        .next()
        .and_then(|last| last.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

/// Index a child at `rank` receives under a parent with index `parent_index`
pub fn child_index(parent_index: &str, rank: usize) -> String {
    if parent_index == ROOT_INDEX {
        rank.to_string()
    } else {
        format!("{}.{}", parent_index, rank)
    }
}

/// Tree element of a mindmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,

    pub mindmap_id: i64,

    /// Parent node id; [`ROOT_PARENT_ID`] only for the root
    pub parent_id: i64,

    pub name: String,

    pub index: String,

    /// Free-form key/value metadata
    #[serde(default)]
    pub content: BTreeMap<String, String>,

    /// Child ids in rank order (in-memory only)
    #[serde(default, skip_serializing)]
    pub children: Vec<i64>,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_NODE_ID
    }

    /// Sibling rank encoded in this node's index
    pub fn rank(&self) -> u64 {
        index_rank(&self.index)
    }
}

/// Values required to insert a node
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub parent_id: i64,
    pub name: String,
    pub index: String,
    pub content: BTreeMap<String, String>,
}

/// Conjunctive lookup predicate over one mindmap's nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub name: Option<String>,
    pub index: Option<String>,
}

impl NodeFilter {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_parent(parent_id: i64) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Default::default()
        }
    }
}

/// Partial update applied by the store
///
/// `content`, when present, replaces the node's whole content map.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub name: Option<String>,
    pub parent_id: Option<i64>,
    pub index: Option<String>,
    pub content: Option<BTreeMap<String, String>>,
}

/// Positional rewrite for one node, persisted in batches
///
/// `parent_id` is set only for the node that changed parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChange {
    pub id: i64,
    pub index: String,
    pub parent_id: Option<i64>,
}

/// Requested change to a node
///
/// Content entries merge into the existing map; an empty value removes the key.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub content: BTreeMap<String, String>,
    pub parent_id: Option<i64>,
}

/// Which node fields a search inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindFields {
    pub name: bool,
    pub content: bool,
    pub index: bool,
}

impl Default for FindFields {
    fn default() -> Self {
        Self {
            name: true,
            content: true,
            index: false,
        }
    }
}

/// Presentation summary of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub index: String,
    pub content: BTreeMap<String, String>,
}

impl From<&Node> for NodeInfo {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            index: node.index.clone(),
            content: node.content.clone(),
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [id {}]", self.index, self.name, self.id)?;
        for (key, value) in &self.content {
            write!(f, " {}:{}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_index_under_root_and_deeper() {
        assert_eq!(child_index("0", 3), "3");
        assert_eq!(child_index("2", 1), "2.1");
        assert_eq!(child_index("2.1", 4), "2.1.4");
    }

    #[test]
    fn test_index_rank_uses_last_component() {
        assert_eq!(index_rank("0"), 0);
        assert_eq!(index_rank("12"), 12);
        assert_eq!(index_rank("1.2.10"), 10);
        assert_eq!(index_rank("x"), u64::MAX);
    }

    #[test]
    fn test_index_validation() {
        assert!(is_valid_index("0"));
        assert!(is_valid_index("1.2.3"));
        assert!(!is_valid_index(""));
        assert!(!is_valid_index("1."));
        assert!(!is_valid_index("a.1"));
    }
}
