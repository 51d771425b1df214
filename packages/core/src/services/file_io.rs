//! Mindmap document import/export
//!
//! A document carries the mindmap metadata, the nested `root` tree and a flat
//! `nodes` list. Both JSON (`serde_json`) and XML (`quick-xml`) encodings use
//! the same serde types. Content maps are written as `{key, value}` entries so
//! user-chosen keys never become XML element names.

use crate::models::{
    index_rank, Mindmap, Node, ROOT_INDEX, ROOT_NODE_ID, ROOT_PARENT_ID,
};
use crate::services::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Root element name of XML documents
const XML_ROOT: &str = "mindmap";

/// Serialization format of a mindmap document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl FromStr for DocumentFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DocumentFormat::Json),
            "xml" => Ok(DocumentFormat::Xml),
            other => Err(ServiceError::FormatUnsupported(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Json => f.write_str("json"),
            DocumentFormat::Xml => f.write_str("xml"),
        }
    }
}

impl DocumentFormat {
    /// Pick the format: an explicit name wins, then an `.xml` extension, else JSON
    pub fn resolve(path: &Path, explicit: Option<&str>) -> Result<Self, ServiceError> {
        if let Some(name) = explicit.filter(|name| !name.is_empty()) {
            return name.parse();
        }
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        Ok(if is_xml {
            DocumentFormat::Xml
        } else {
            DocumentFormat::Json
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub key: String,
    pub value: String,
}

fn entries(content: &BTreeMap<String, String>) -> Vec<ContentEntry> {
    content
        .iter()
        .map(|(key, value)| ContentEntry {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// One node in the flat `nodes` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub index: String,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
}

impl NodeRecord {
    pub fn content_map(&self) -> BTreeMap<String, String> {
        self.content
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            index: node.index.clone(),
            content: entries(&node.content),
        }
    }
}

/// One node of the nested tree, children in rank order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub index: String,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
    #[serde(default)]
    pub children: Vec<NodeDocument>,
}

impl NodeDocument {
    fn build(mindmap: &Mindmap, node: &Node) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            index: node.index.clone(),
            content: entries(&node.content),
            children: node
                .children
                .iter()
                .filter_map(|id| mindmap.node(*id))
                .map(|child| NodeDocument::build(mindmap, child))
                .collect(),
        }
    }

    fn flatten_into(&self, out: &mut Vec<NodeRecord>) {
        out.push(NodeRecord {
            id: self.id,
            parent_id: self.parent_id,
            name: self.name.clone(),
            index: self.index.clone(),
            content: self.content.clone(),
        });
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

/// Serialized form of a mindmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindmapDocument {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub is_public: bool,
    pub root: NodeDocument,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
}

impl MindmapDocument {
    /// Build a document from a hydrated mindmap
    pub fn from_mindmap(mindmap: &Mindmap) -> Result<Self, ServiceError> {
        let root = mindmap
            .root()
            .ok_or_else(|| ServiceError::NodeNotFound(ROOT_NODE_ID.to_string()))?;
        let nodes = mindmap
            .preorder()
            .into_iter()
            .filter_map(|id| mindmap.node(id))
            .map(NodeRecord::from)
            .collect();

        Ok(Self {
            name: mindmap.name.clone(),
            owner: mindmap.owner.clone(),
            is_public: mindmap.is_public,
            root: NodeDocument::build(mindmap, root),
            nodes,
        })
    }

    /// Node list the import works from
    ///
    /// The flat list is authoritative when present; otherwise the nested tree
    /// is flattened.
    pub fn records(&self) -> Vec<NodeRecord> {
        if !self.nodes.is_empty() {
            return self.nodes.clone();
        }
        let mut out = Vec::new();
        self.root.flatten_into(&mut out);
        out
    }

    /// Check the tree shape and return the records parents-first in rank order
    ///
    /// Runs before any mutation; the first record is the root.
    pub fn validate(&self) -> Result<Vec<NodeRecord>, ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::parse_error("document has no mindmap name"));
        }

        let records = self.records();
        let mut by_id: HashMap<i64, &NodeRecord> = HashMap::new();
        for record in &records {
            if by_id.insert(record.id, record).is_some() {
                return Err(ServiceError::parse_error(format!(
                    "duplicate node id {}",
                    record.id
                )));
            }
        }

        let root = by_id
            .get(&ROOT_NODE_ID)
            .ok_or_else(|| ServiceError::parse_error("document has no root node"))?;
        if root.parent_id != ROOT_PARENT_ID || root.index != ROOT_INDEX {
            return Err(ServiceError::parse_error(format!(
                "root must have parent {} and index \"{}\"",
                ROOT_PARENT_ID, ROOT_INDEX
            )));
        }

        let mut children: HashMap<i64, Vec<&NodeRecord>> = HashMap::new();
        for record in records.iter().filter(|r| r.id != ROOT_NODE_ID) {
            if record.id < 0 {
                return Err(ServiceError::parse_error(format!(
                    "invalid node id {}",
                    record.id
                )));
            }
            if record.name.is_empty() {
                return Err(ServiceError::parse_error(format!(
                    "node {} has no name",
                    record.id
                )));
            }
            if record.parent_id == record.id || !by_id.contains_key(&record.parent_id) {
                return Err(ServiceError::parse_error(format!(
                    "node {} refers to unknown parent {}",
                    record.id, record.parent_id
                )));
            }
            children.entry(record.parent_id).or_default().push(record);
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|r| (index_rank(&r.index), r.id));
        }

        let mut ordered = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        let mut stack = vec![*root];
        while let Some(record) = stack.pop() {
            seen.insert(record.id);
            ordered.push(record.clone());
            if let Some(kids) = children.get(&record.id) {
                stack.extend(kids.iter().rev().copied());
            }
        }

        if seen.len() != records.len() {
            return Err(ServiceError::parse_error(
                "document contains nodes unreachable from the root",
            ));
        }
        Ok(ordered)
    }

    pub fn encode(&self, format: DocumentFormat) -> Result<String, ServiceError> {
        match format {
            DocumentFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| ServiceError::Serialization(e.to_string())),
            DocumentFormat::Xml => quick_xml::se::to_string_with_root(XML_ROOT, self)
                .map_err(|e| ServiceError::Serialization(e.to_string())),
        }
    }

    pub fn decode(text: &str, format: DocumentFormat) -> Result<Self, ServiceError> {
        match format {
            DocumentFormat::Json => serde_json::from_str(text)
                .map_err(|e| ServiceError::parse_error(e.to_string())),
            DocumentFormat::Xml => quick_xml::de::from_str(text)
                .map_err(|e| ServiceError::parse_error(e.to_string())),
        }
    }
}

/// Write `document` to `path`, creating parent directories
pub async fn document_write(
    document: &MindmapDocument,
    path: &Path,
    format: DocumentFormat,
) -> Result<(), ServiceError> {
    let text = document.encode(format)?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, text).await?;
    tracing::info!("Exported mindmap '{}' to {} ({})", document.name, path.display(), format);
    Ok(())
}

pub async fn document_read(
    path: &Path,
    format: DocumentFormat,
) -> Result<MindmapDocument, ServiceError> {
    let text = tokio::fs::read_to_string(path).await?;
    let document = MindmapDocument::decode(&text, format)?;
    tracing::debug!("Read mindmap document '{}' from {}", document.name, path.display());
    Ok(document)
}
