//! Engine schema and bulk-load statements.
//!
//! Three DDL statements define the store: the node table, the relation
//! table, and the embedding column. The embedding column is added separately
//! so the bulk-load column list never has to mention it.

use std::path::Path;

/// Node table name.
pub const NODE_TABLE: &str = "code_nodes";

/// Relation table name.
pub const RELATION_TABLE: &str = "code_relations";

/// Staging file names inside the per-instance staging directory.
pub const NODES_STAGING_FILE: &str = "nodes.csv";
pub const RELATIONS_STAGING_FILE: &str = "relations.csv";

/// Columns filled by the node snapshot, in snapshot order.
pub const NODE_COPY_COLUMNS: &str = "id, label, name, file_path, start_line, end_line, content";

/// Columns filled by the relation snapshot, in snapshot order.
pub const RELATION_COPY_COLUMNS: &str = "from_id, to_id, type";

/// Columns selected when decoding a [`super::StoredNode`].
pub const NODE_SELECT_COLUMNS: &str = "id, label, name, file_path, start_line, end_line, content";

/// SQL type of the embedding column for a given dimension.
pub fn vector_type(dimension: usize) -> String {
    format!("FLOAT[{}]", dimension)
}

/// The three schema statements, in creation order.
pub fn schema_statements(dimension: usize) -> [(&'static str, String); 3] {
    [
        (
            "node table",
            format!(
                "CREATE TABLE {NODE_TABLE} (
                    id VARCHAR NOT NULL,
                    label VARCHAR NOT NULL,
                    name VARCHAR,
                    file_path VARCHAR,
                    start_line INTEGER,
                    end_line INTEGER,
                    content VARCHAR
                )"
            ),
        ),
        (
            "relation table",
            format!(
                "CREATE TABLE {RELATION_TABLE} (
                    from_id VARCHAR NOT NULL,
                    to_id VARCHAR NOT NULL,
                    type VARCHAR NOT NULL
                )"
            ),
        ),
        (
            "embedding column",
            format!(
                "ALTER TABLE {NODE_TABLE} ADD COLUMN embedding {}",
                vector_type(dimension)
            ),
        ),
    ]
}

fn sql_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

/// Import options shared by both snapshots.
///
/// Content fields carry embedded newlines, so the parallel reader is off.
/// Quoted empty fields stay empty strings instead of becoming NULL.
const COPY_OPTIONS: &str = "FORMAT csv, HEADER true, DELIMITER ',', QUOTE '\"', ESCAPE '\"', \
     ALLOW_QUOTED_NULLS false, PARALLEL false";

/// `COPY` for the node snapshot. The embedding column is deliberately absent.
pub fn copy_nodes_sql(path: &Path) -> String {
    format!(
        "COPY {NODE_TABLE} ({NODE_COPY_COLUMNS}) FROM '{}' ({COPY_OPTIONS})",
        sql_path(path)
    )
}

/// `COPY` for the relation snapshot.
pub fn copy_relations_sql(path: &Path) -> String {
    format!(
        "COPY {RELATION_TABLE} ({RELATION_COPY_COLUMNS}) FROM '{}' ({COPY_OPTIONS})",
        sql_path(path)
    )
}

/// Per-node vector patch, bound with `$id` and `$embedding`.
pub fn attach_embedding_sql(dimension: usize) -> String {
    format!(
        "UPDATE {NODE_TABLE} SET embedding = CAST($embedding AS {}) WHERE id = $id",
        vector_type(dimension)
    )
}
