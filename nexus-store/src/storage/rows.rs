//! Row decoding at the engine boundary.
//!
//! Engine rows never leave the adapter: they are turned into either a
//! [`QueryResult`] of JSON values (ad hoc queries) or typed records through
//! [`FromRow`].

use duckdb::types::Value;
use nexus_core::NodeLabel;
use serde::Serialize;
use std::collections::HashMap;

/// Result of an ad hoc or prepared query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    /// Drain a cursor into memory, keeping row order.
    pub(crate) fn collect(mut rows: duckdb::Rows<'_>) -> duckdb::Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut data = Vec::new();

        while let Some(row) = rows.next()? {
            // Column names are only available once the statement has run
            if columns.is_empty() {
                columns = row
                    .as_ref()
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
            }

            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(value_to_json(row.get::<_, Value>(i)?));
            }
            data.push(values);
        }

        Ok(Self {
            columns,
            rows: data,
        })
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// First column of the first row, for single-value queries.
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        self.rows.first()?.first()
    }

    /// Convert to a list of column-name keyed maps.
    pub fn as_dicts(&self) -> Vec<HashMap<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, val)| (col.clone(), val.clone()))
                    .collect()
            })
            .collect()
    }
}

fn value_to_json(value: Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(b),
        Value::TinyInt(i) => Json::from(i),
        Value::SmallInt(i) => Json::from(i),
        Value::Int(i) => Json::from(i),
        Value::BigInt(i) => Json::from(i),
        Value::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Json::from(small),
            Err(_) => Json::String(i.to_string()),
        },
        Value::UTinyInt(i) => Json::from(i),
        Value::USmallInt(i) => Json::from(i),
        Value::UInt(i) => Json::from(i),
        Value::UBigInt(i) => Json::from(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(f) => serde_json::json!(f),
        Value::Text(s) => Json::String(s),
        Value::List(items) => Json::Array(items.into_iter().map(value_to_json).collect()),
        other => Json::String(format!("{:?}", other)),
    }
}

/// Typed decoding of one engine row.
pub trait FromRow: Sized {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self>;
}

/// A node as persisted in the node table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNode {
    pub id: String,
    pub label: NodeLabel,
    pub name: String,
    pub file_path: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub content: String,
}

fn line(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl FromRow for StoredNode {
    /// Expects the columns of [`super::schema::NODE_SELECT_COLUMNS`], in order.
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        let label: String = row.get(1)?;
        Ok(Self {
            id: row.get(0)?,
            label: NodeLabel::parse(&label),
            name: row.get(2)?,
            file_path: row.get(3)?,
            start_line: line(row.get(4)?),
            end_line: line(row.get(5)?),
            content: row.get(6)?,
        })
    }
}

/// One row of the relation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelationRow {
    pub from_id: String,
    pub to_id: String,
    pub rel_type: String,
}

impl FromRow for RelationRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            from_id: row.get(0)?,
            to_id: row.get(1)?,
            rel_type: row.get(2)?,
        })
    }
}

/// Which way a relation points, seen from the node it was looked up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A node adjacent to a lookup node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub node_id: String,
    pub relation_type: String,
    pub direction: Direction,
}

impl Neighbor {
    /// Orient a relation row around `anchor`. Self-loops read as outgoing.
    pub(crate) fn from_relation(anchor: &str, rel: RelationRow) -> Self {
        if rel.from_id == anchor {
            Self {
                node_id: rel.to_id,
                relation_type: rel.rel_type,
                direction: Direction::Outgoing,
            }
        } else {
            Self {
                node_id: rel.from_id,
                relation_type: rel.rel_type,
                direction: Direction::Incoming,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_json() {
        assert_eq!(value_to_json(Value::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(Value::BigInt(3)), serde_json::json!(3));
        assert_eq!(value_to_json(Value::HugeInt(7)), serde_json::json!(7));
        assert_eq!(
            value_to_json(Value::Text("x".into())),
            serde_json::json!("x")
        );
        assert_eq!(
            value_to_json(Value::List(vec![Value::Int(1), Value::Int(2)])),
            serde_json::json!([1, 2])
        );
    }

    #[test]
    fn test_neighbor_orientation() {
        let rel = RelationRow {
            from_id: "a".into(),
            to_id: "b".into(),
            rel_type: "CONTAINS".into(),
        };
        let out = Neighbor::from_relation("a", rel.clone());
        assert_eq!(out.node_id, "b");
        assert_eq!(out.direction, Direction::Outgoing);

        let inc = Neighbor::from_relation("b", rel);
        assert_eq!(inc.node_id, "a");
        assert_eq!(inc.direction, Direction::Incoming);
    }

    #[test]
    fn test_query_result_accessors() {
        let result = QueryResult {
            columns: vec!["id".into(), "n".into()],
            rows: vec![vec![serde_json::json!("a"), serde_json::json!(1)]],
        };
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.value(0, "n"), Some(&serde_json::json!(1)));
        assert_eq!(result.value(0, "missing"), None);
        assert_eq!(result.scalar(), Some(&serde_json::json!("a")));
        assert_eq!(result.as_dicts()[0]["id"], serde_json::json!("a"));
    }
}
