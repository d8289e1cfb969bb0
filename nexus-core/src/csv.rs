//! CSV snapshot serialization for the bulk-load path.
//!
//! Produces two RFC 4180 texts (nodes and relations). Every string field is
//! quoted, even when empty or absent, because code content routinely carries
//! commas, quotes and newlines. Line numbers are the only unquoted fields.

use crate::content::extract_content;
use crate::graph::{FileContents, KnowledgeGraph};

/// Header row of the node snapshot.
pub const NODE_HEADER: &str = "id,label,name,filePath,startLine,endLine,content";

/// Header row of the relation snapshot.
pub const EDGE_HEADER: &str = "from,to,type";

/// Serialized value of an absent line number.
pub const MISSING_LINE: i64 = -1;

fn is_stripped(c: char) -> bool {
    matches!(c as u32, 0..=8 | 11 | 12 | 14..=31 | 127 | 0xFFFE | 0xFFFF)
}

/// Remove characters that would break the importer's row/column framing.
///
/// Keeps tab, newline and carriage return; drops every other C0 control,
/// DEL, and the non-characters U+FFFE / U+FFFF.
pub fn sanitize_text(text: &str) -> String {
    if !text.chars().any(is_stripped) {
        return text.to_string();
    }
    text.chars().filter(|c| !is_stripped(*c)).collect()
}

/// Decode UTF-16 input, dropping lone surrogates, then sanitize.
pub fn sanitize_utf16(units: &[u16]) -> String {
    let decoded: String = char::decode_utf16(units.iter().copied())
        .filter_map(|r| r.ok())
        .collect();
    sanitize_text(&decoded)
}

/// Quote a string field. Absent values become an empty quoted field.
pub fn escape_field(value: Option<&str>) -> String {
    let clean = sanitize_text(value.unwrap_or(""));
    let mut out = String::with_capacity(clean.len() + 2);
    out.push('"');
    for c in clean.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render a numeric field unquoted, `-1` when absent.
pub fn escape_number(value: Option<u32>) -> String {
    value
        .map(i64::from)
        .unwrap_or(MISSING_LINE)
        .to_string()
}

/// Serialize all nodes, with per-label content, into the node snapshot.
pub fn serialize_nodes(graph: &KnowledgeGraph, file_contents: &FileContents) -> String {
    let mut out = String::with_capacity(NODE_HEADER.len() + 1 + graph.nodes.len() * 128);
    out.push_str(NODE_HEADER);
    out.push('\n');

    for node in &graph.nodes {
        let content = extract_content(node, file_contents);
        let row = [
            escape_field(Some(&node.id)),
            escape_field(Some(node.label.as_str())),
            escape_field(Some(&node.properties.name)),
            escape_field(Some(&node.properties.file_path)),
            escape_number(node.properties.start_line),
            escape_number(node.properties.end_line),
            escape_field(Some(&content)),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Serialize all relationships into the relation snapshot.
pub fn serialize_edges(graph: &KnowledgeGraph) -> String {
    let mut out = String::with_capacity(EDGE_HEADER.len() + 1 + graph.relationships.len() * 64);
    out.push_str(EDGE_HEADER);
    out.push('\n');

    for rel in &graph.relationships {
        let row = [
            escape_field(Some(&rel.source_id)),
            escape_field(Some(&rel.target_id)),
            escape_field(Some(&rel.rel_type)),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Both snapshots of one graph plus their row counts.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub nodes_csv: String,
    pub edges_csv: String,
    pub node_rows: usize,
    pub edge_rows: usize,
}

impl Snapshot {
    pub fn build(graph: &KnowledgeGraph, file_contents: &FileContents) -> Self {
        Self {
            nodes_csv: serialize_nodes(graph, file_contents),
            edges_csv: serialize_edges(graph),
            node_rows: graph.node_count(),
            edge_rows: graph.relationship_count(),
        }
    }

    /// Total size of both texts in bytes.
    pub fn byte_len(&self) -> usize {
        self.nodes_csv.len() + self.edges_csv.len()
    }
}
