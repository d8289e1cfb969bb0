//! Knowledge-graph model handed over by the parsing stage.
//!
//! The graph is owned by the caller and treated as read-only by the
//! serializer and the store. Field names follow the camelCase JSON produced
//! by the analysis collaborator.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Raw file contents keyed by file path.
pub type FileContents = HashMap<String, String>;

/// Kinds of nodes in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    /// A source file
    File,
    /// A directory
    Folder,
    /// Free function
    Function,
    /// Class/struct
    Class,
    /// Method defined on a class
    Method,
    /// Interface/trait/protocol
    Interface,
    /// Anything else the parser emits (variables, type aliases, ...)
    #[serde(other)]
    CodeElement,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::File => "File",
            NodeLabel::Folder => "Folder",
            NodeLabel::Function => "Function",
            NodeLabel::Class => "Class",
            NodeLabel::Method => "Method",
            NodeLabel::Interface => "Interface",
            NodeLabel::CodeElement => "CodeElement",
        }
    }

    /// Parse a label, falling back to `CodeElement` for unknown kinds.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "file" => NodeLabel::File,
            "folder" => NodeLabel::Folder,
            "function" => NodeLabel::Function,
            "class" => NodeLabel::Class,
            "method" => NodeLabel::Method,
            "interface" => NodeLabel::Interface,
            _ => NodeLabel::CodeElement,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Properties carried by every node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProperties {
    /// Short name (e.g. "main", "utils.py")
    pub name: String,
    /// File path relative to the repository root
    #[serde(default)]
    pub file_path: String,
    /// First line of the symbol (0-based)
    #[serde(default)]
    pub start_line: Option<u32>,
    /// Last line of the symbol (0-based, inclusive)
    #[serde(default)]
    pub end_line: Option<u32>,
    /// Precomputed embedding, if the producer already has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique, stable identifier (e.g. "File:src/a.py", "Function:src/a.py:main")
    pub id: String,
    pub label: NodeLabel,
    pub properties: NodeProperties,
}

impl GraphNode {
    /// Create a file node.
    pub fn file(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            id: format!("File:{}", path),
            label: NodeLabel::File,
            properties: NodeProperties {
                name,
                file_path: path.to_string(),
                ..Default::default()
            },
        }
    }

    /// Create a folder node.
    pub fn folder(path: &str) -> Self {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(path)
            .to_string();
        Self {
            id: format!("Folder:{}", path),
            label: NodeLabel::Folder,
            properties: NodeProperties {
                name,
                file_path: path.to_string(),
                ..Default::default()
            },
        }
    }

    /// Create a symbol node (function, class, method, ...) spanning a line range.
    pub fn symbol(label: NodeLabel, file_path: &str, name: &str, start_line: u32, end_line: u32) -> Self {
        Self {
            id: format!("{}:{}:{}", label.as_str(), file_path, name),
            label,
            properties: NodeProperties {
                name: name.to_string(),
                file_path: file_path.to_string(),
                start_line: Some(start_line),
                end_line: Some(end_line),
                embedding: None,
            },
        }
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a precomputed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.properties.embedding = Some(embedding);
        self
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub source_id: String,
    pub target_id: String,
    /// Relationship type (e.g. "CONTAINS", "CALLS", "IMPORTS")
    #[serde(rename = "type")]
    pub rel_type: String,
}

impl GraphRelationship {
    pub fn new(source_id: &str, target_id: &str, rel_type: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            rel_type: rel_type.to_string(),
        }
    }

    /// Parent contains child.
    pub fn contains(parent_id: &str, child_id: &str) -> Self {
        Self::new(parent_id, child_id, "CONTAINS")
    }

    /// Caller calls callee.
    pub fn calls(caller: &str, callee: &str) -> Self {
        Self::new(caller, callee, "CALLS")
    }

    /// File imports file.
    pub fn imports(from: &str, to: &str) -> Self {
        Self::new(from, to, "IMPORTS")
    }
}

/// Integrity violations detected before a graph is loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("relationship {rel_type} references unknown {end} node: {id}")]
    DanglingEndpoint {
        rel_type: String,
        end: &'static str,
        id: String,
    },
}

/// The full graph for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    pub fn add_relationship(&mut self, rel: GraphRelationship) {
        self.relationships.push(rel);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Check node-id uniqueness and that every relationship endpoint exists.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        for rel in &self.relationships {
            if !ids.contains(rel.source_id.as_str()) {
                return Err(GraphError::DanglingEndpoint {
                    rel_type: rel.rel_type.clone(),
                    end: "source",
                    id: rel.source_id.clone(),
                });
            }
            if !ids.contains(rel.target_id.as_str()) {
                return Err(GraphError::DanglingEndpoint {
                    rel_type: rel.rel_type.clone(),
                    end: "target",
                    id: rel.target_id.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        for label in [
            NodeLabel::File,
            NodeLabel::Folder,
            NodeLabel::Function,
            NodeLabel::Class,
            NodeLabel::Method,
            NodeLabel::Interface,
            NodeLabel::CodeElement,
        ] {
            assert_eq!(NodeLabel::parse(label.as_str()), label);
        }
        assert_eq!(NodeLabel::parse("TypeAlias"), NodeLabel::CodeElement);
    }

    #[test]
    fn test_file_and_folder_nodes() {
        let file = GraphNode::file("src/utils/a.py");
        assert_eq!(file.id, "File:src/utils/a.py");
        assert_eq!(file.properties.name, "a.py");

        let folder = GraphNode::folder("src/utils/");
        assert_eq!(folder.properties.name, "utils");
        assert_eq!(folder.label, NodeLabel::Folder);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "nodes": [
                {"id": "n1", "label": "Function",
                 "properties": {"name": "f", "filePath": "a.py", "startLine": 0, "endLine": 1}},
                {"id": "n2", "label": "Variable", "properties": {"name": "x"}}
            ],
            "relationships": [{"sourceId": "n1", "targetId": "n2", "type": "USES"}]
        }"#;
        let graph: KnowledgeGraph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.nodes[0].properties.start_line, Some(0));
        assert_eq!(graph.nodes[1].label, NodeLabel::CodeElement);
        assert_eq!(graph.relationships[0].rel_type, "USES");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(GraphNode::file("a.py"));
        graph.add_relationship(GraphRelationship::contains("File:a.py", "Function:a.py:gone"));

        let err = graph.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingEndpoint {
                rel_type: "CONTAINS".to_string(),
                end: "target",
                id: "Function:a.py:gone".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(GraphNode::file("a.py"));
        graph.add_node(GraphNode::file("a.py"));
        assert!(matches!(graph.validate(), Err(GraphError::DuplicateNode(_))));
    }
}
