//! Named statement parameters.
//!
//! Statements use `$name` placeholders. Before preparing, placeholders are
//! rewritten to positional `?` markers and the bound values are lined up in
//! placeholder order, so one name may appear several times.

use duckdb::types::{ToSqlOutput, Value};
use duckdb::ToSql;
use std::collections::HashMap;

use crate::error::{Result, StoreError};

/// A value bound to a `$name` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Fixed-length vector. Bound as a JSON array literal; the statement casts
    /// it, e.g. `CAST($embedding AS FLOAT[384])`.
    Vector(Vec<f32>),
}

impl ToSql for ParamValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Boolean(*b),
            ParamValue::Int(i) => Value::BigInt(*i),
            ParamValue::Float(f) => Value::Double(*f),
            ParamValue::Text(s) => Value::Text(s.clone()),
            ParamValue::Vector(v) => Value::Text(vector_literal(v)),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// Render a vector as the JSON array literal the engine casts to an array.
pub fn vector_literal(values: &[f32]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<Vec<f32>> for ParamValue {
    fn from(v: Vec<f32>) -> Self {
        ParamValue::Vector(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Parameter set for one execution, keyed by placeholder name (without `$`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(HashMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }
}

/// A statement with `$name` placeholders rewritten to positional markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    /// SQL handed to the engine.
    pub sql: String,
    /// Placeholder names in positional order.
    pub names: Vec<String>,
}

impl BoundStatement {
    /// Rewrite placeholders outside string literals and quoted identifiers.
    pub fn parse(sql: &str) -> Self {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len());
        let mut names = Vec::new();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match quote {
                Some(q) => {
                    out.push(c);
                    if c == q {
                        quote = None;
                    }
                    i += 1;
                }
                None if c == '\'' || c == '"' => {
                    quote = Some(c);
                    out.push(c);
                    i += 1;
                }
                None if c == '$'
                    && chars
                        .get(i + 1)
                        .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
                {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    names.push(chars[start..end].iter().collect());
                    out.push('?');
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Self { sql: out, names }
    }

    /// Line up values in placeholder order.
    pub fn bind<'p>(&self, params: &'p Params) -> Result<Vec<&'p ParamValue>> {
        self.names
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .ok_or_else(|| StoreError::MissingParameter(name.clone()))
            })
            .collect()
    }

    /// [`BoundStatement::bind`] in the shape the engine's `query`/`execute` accept.
    pub fn bind_sql<'p>(&self, params: &'p Params) -> Result<Vec<&'p dyn ToSql>> {
        Ok(self
            .bind(params)?
            .into_iter()
            .map(|v| v as &dyn ToSql)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_named_placeholders() {
        let bound = BoundStatement::parse(
            "UPDATE code_nodes SET embedding = CAST($embedding AS FLOAT[3]) WHERE id = $id",
        );
        assert_eq!(
            bound.sql,
            "UPDATE code_nodes SET embedding = CAST(? AS FLOAT[3]) WHERE id = ?"
        );
        assert_eq!(bound.names, vec!["embedding", "id"]);
    }

    #[test]
    fn test_ignores_dollars_in_literals() {
        let bound = BoundStatement::parse("SELECT '$not_a_param', \"$col\" FROM t WHERE a = $a AND b = $a");
        assert_eq!(bound.sql, "SELECT '$not_a_param', \"$col\" FROM t WHERE a = ? AND b = ?");
        assert_eq!(bound.names, vec!["a", "a"]);
    }

    #[test]
    fn test_leaves_positional_and_bare_dollars() {
        let bound = BoundStatement::parse("SELECT $1, 5$ FROM t");
        assert_eq!(bound.sql, "SELECT $1, 5$ FROM t");
        assert!(bound.names.is_empty());
    }

    #[test]
    fn test_bind_orders_values_and_reports_missing() {
        let bound = BoundStatement::parse("SELECT $b, $a, $b");
        let params = Params::new().with("a", 1i64).with("b", "x");
        let values = bound.bind(&params).unwrap();
        assert_eq!(
            values,
            vec![
                &ParamValue::Text("x".into()),
                &ParamValue::Int(1),
                &ParamValue::Text("x".into())
            ]
        );

        let err = bound.bind(&Params::new().with("a", 1i64)).unwrap_err();
        assert!(matches!(err, StoreError::MissingParameter(name) if name == "b"));
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.0, 1.5, -2.0]), "[0.0,1.5,-2.0]");
        assert_eq!(vector_literal(&[]), "[]");
        let v: Vec<f32> = serde_json::from_str(&vector_literal(&[0.25, 3.0])).unwrap();
        assert_eq!(v, vec![0.25, 3.0]);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(ParamValue::from(None::<i64>), ParamValue::Null);
        assert_eq!(ParamValue::from(Some("x")), ParamValue::Text("x".into()));
    }
}
