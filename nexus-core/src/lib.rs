//! Nexus core - knowledge-graph model and bulk-load snapshot serialization.
//!
//! This crate is pure: no I/O, no engine access. It provides:
//! - The knowledge-graph types produced by the parsing stage
//! - Per-label content extraction (file bodies, symbol snippets, binary detection)
//! - The always-quoted CSV serializer feeding the embedded engine's `COPY FROM`
//!
//! # Usage
//!
//! ```rust
//! use nexus_core::{FileContents, GraphNode, GraphRelationship, KnowledgeGraph, NodeLabel, Snapshot};
//!
//! let mut graph = KnowledgeGraph::new();
//! graph.add_node(GraphNode::file("a.py"));
//! graph.add_node(GraphNode::symbol(NodeLabel::Function, "a.py", "f", 0, 1));
//! graph.add_relationship(GraphRelationship::contains("File:a.py", "Function:a.py:f"));
//!
//! let mut contents = FileContents::new();
//! contents.insert("a.py".to_string(), "def f():\n    pass\n".to_string());
//!
//! let snapshot = Snapshot::build(&graph, &contents);
//! assert_eq!(snapshot.node_rows, 2);
//! assert!(snapshot.edges_csv.starts_with("from,to,type\n"));
//! ```

pub mod content;
pub mod csv;
pub mod graph;

pub use content::{extract_content, is_binary_content, truncate_content};
pub use csv::{escape_field, escape_number, sanitize_text, serialize_edges, serialize_nodes, Snapshot};
pub use graph::{
    FileContents, GraphError, GraphNode, GraphRelationship, KnowledgeGraph, NodeLabel,
    NodeProperties,
};
