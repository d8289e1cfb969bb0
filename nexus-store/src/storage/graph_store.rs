//! GraphStore - lifecycle and query surface of the embedded graph engine.
//!
//! One in-memory DuckDB database and one connection cloned from it back each
//! store. Both are created on first use and released by [`GraphStore::close`];
//! a closed store re-initializes lazily on its next call.

use duckdb::{Config, Connection, OptionalExt, ToSql};
use nexus_core::{FileContents, KnowledgeGraph, NodeLabel, Snapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::batch::{Scheduler, TokioScheduler};
use super::params::{BoundStatement, ParamValue, Params};
use super::rows::{FromRow, Neighbor, QueryResult, RelationRow, StoredNode};
use super::schema::{
    attach_embedding_sql, copy_nodes_sql, copy_relations_sql, schema_statements, vector_type,
    NODES_STAGING_FILE, NODE_SELECT_COLUMNS, NODE_TABLE, RELATIONS_STAGING_FILE, RELATION_TABLE,
};
use crate::config::{BatchConfig, EngineConfig, NexusConfig};
use crate::error::{Result, StoreError};

/// Where the store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    /// Torn down by `close`; behaves like `Uninitialized` on the next call.
    Closed,
}

/// Result of the absorbing bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkLoadOutcome {
    pub success: bool,
    /// Node rows present after the load.
    pub count: usize,
}

/// Row counts of the two graph tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

/// Outcome of [`GraphStore::test_vector_roundtrip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub success: bool,
    pub error: Option<String>,
}

pub(super) struct EngineHandles {
    db: Connection,
    pub(super) conn: Connection,
    staging_dir: PathBuf,
}

/// Graph store backed by an embedded DuckDB instance.
///
/// Statements run one at a time, in issuance order, behind an async lock.
/// Share the store between components with `Arc<GraphStore>`.
pub struct GraphStore {
    engine: Mutex<Option<EngineHandles>>,
    closed: AtomicBool,
    pub(super) engine_config: EngineConfig,
    pub(super) batch_config: BatchConfig,
    pub(super) scheduler: Arc<dyn Scheduler>,
}

impl GraphStore {
    /// Create a store. Nothing is opened until the first operation.
    pub fn new(engine_config: EngineConfig, batch_config: BatchConfig) -> Self {
        let scheduler = Arc::new(TokioScheduler::new(batch_config.inter_batch_pause()));
        Self {
            engine: Mutex::new(None),
            closed: AtomicBool::new(false),
            engine_config,
            batch_config,
            scheduler,
        }
    }

    pub fn from_config(config: &NexusConfig) -> Self {
        Self::new(config.engine.clone(), config.batch.clone())
    }

    /// Replace the scheduler awaited between executor sub-batches.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Declared length of every stored embedding.
    pub fn embedding_dimension(&self) -> usize {
        self.engine_config.embedding_dimension
    }

    /// Lock the engine, opening it first if needed.
    pub(super) async fn engine(&self) -> Result<MappedMutexGuard<'_, EngineHandles>> {
        let mut slot = self.engine.lock().await;
        if slot.is_none() {
            *slot = Some(self.open_engine()?);
            self.closed.store(false, Ordering::SeqCst);
        }
        MutexGuard::try_map(slot, |handles| handles.as_mut())
            .map_err(|_| StoreError::Init("engine handles missing after initialization".into()))
    }

    fn open_engine(&self) -> Result<EngineHandles> {
        let cfg = &self.engine_config;
        let config = Config::default()
            .max_memory(&format!("{}MB", cfg.buffer_pool_mb))
            .and_then(|c| c.threads(i64::from(cfg.threads)))
            .map_err(|e| StoreError::Init(format!("invalid engine settings: {}", e)))?;

        let db = Connection::open_in_memory_with_flags(config)
            .map_err(|e| StoreError::Init(format!("failed to create database: {}", e)))?;
        let conn = db
            .try_clone()
            .map_err(|e| StoreError::Init(format!("failed to create connection: {}", e)))?;

        let staging_dir = cfg
            .staging_root()
            .join(format!("nexus-staging-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&staging_dir).map_err(|e| {
            StoreError::Init(format!(
                "failed to create staging directory {:?}: {}",
                staging_dir, e
            ))
        })?;

        for (what, sql) in schema_statements(cfg.embedding_dimension) {
            if let Err(e) = conn.execute_batch(&sql) {
                tracing::debug!("Schema: {} not created, assuming it exists: {}", what, e);
            }
        }

        tracing::info!(
            "Graph engine ready (memory {}MB, {} threads, embedding {})",
            cfg.buffer_pool_mb,
            cfg.threads,
            vector_type(cfg.embedding_dimension)
        );

        Ok(EngineHandles {
            db,
            conn,
            staging_dir,
        })
    }

    /// Open the engine now instead of on first use.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.engine().await.map(|_| ())
    }

    /// True while both the database and its connection are open.
    pub async fn is_ready(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    pub async fn state(&self) -> EngineState {
        if self.engine.lock().await.is_some() {
            EngineState::Ready
        } else if self.closed.load(Ordering::SeqCst) {
            EngineState::Closed
        } else {
            EngineState::Uninitialized
        }
    }

    /// Tear down the connection, then the database, then the staging directory.
    ///
    /// Every step runs even when an earlier one fails; the failures are
    /// reported together. The store is reset either way.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.engine.lock().await;
        let Some(EngineHandles {
            db,
            conn,
            staging_dir,
        }) = slot.take()
        else {
            return Ok(());
        };
        self.closed.store(true, Ordering::SeqCst);

        let mut failures = Vec::new();
        if let Err((_, e)) = conn.close() {
            failures.push(format!("connection: {}", e));
        }
        if let Err((_, e)) = db.close() {
            failures.push(format!("database: {}", e));
        }
        if let Err(e) = std::fs::remove_dir_all(&staging_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                failures.push(format!("staging directory: {}", e));
            }
        }

        if failures.is_empty() {
            tracing::info!("Graph engine closed");
            Ok(())
        } else {
            Err(StoreError::Teardown(failures.join("; ")))
        }
    }

    // ========================================================================
    // Bulk load
    // ========================================================================

    /// Replace the stored graph with `graph`.
    ///
    /// Returns the node row count after the import. The replacement is
    /// all-or-nothing: on any failure the previously loaded graph stays in
    /// place and queryable.
    pub async fn try_bulk_load(
        &self,
        graph: &KnowledgeGraph,
        file_contents: &FileContents,
    ) -> Result<usize> {
        graph.validate()?;
        let snapshot = Snapshot::build(graph, file_contents);
        tracing::debug!(
            "Snapshot: {} nodes, {} relations, {} bytes",
            snapshot.node_rows,
            snapshot.edge_rows,
            snapshot.byte_len()
        );

        let mut engine = self.engine().await?;
        let nodes_path = engine.staging_dir.join(NODES_STAGING_FILE);
        let relations_path = engine.staging_dir.join(RELATIONS_STAGING_FILE);

        let loaded = import_snapshot(&mut engine.conn, &snapshot, &nodes_path, &relations_path);
        remove_staging_file(&nodes_path);
        remove_staging_file(&relations_path);
        let count = loaded?;

        tracing::info!(
            "Bulk load complete: {} nodes, {} relations",
            count,
            snapshot.edge_rows
        );
        Ok(count)
    }

    /// [`GraphStore::try_bulk_load`] with failures logged and reported as
    /// `{ success: false, count: 0 }`.
    pub async fn bulk_load(
        &self,
        graph: &KnowledgeGraph,
        file_contents: &FileContents,
    ) -> BulkLoadOutcome {
        match self.try_bulk_load(graph, file_contents).await {
            Ok(count) => BulkLoadOutcome {
                success: true,
                count,
            },
            Err(e) => {
                tracing::warn!("Bulk load failed: {}", e);
                BulkLoadOutcome {
                    success: false,
                    count: 0,
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run an ad hoc statement and collect its rows.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let engine = self.engine().await?;
        let mut stmt = engine.conn.prepare(sql)?;
        let rows = stmt.query([])?;
        Ok(QueryResult::collect(rows)?)
    }

    /// Prepare `sql`, run it once with `params` and collect its rows.
    ///
    /// `$name` placeholders are bound from `params`.
    pub async fn prepare_and_execute(&self, sql: &str, params: &Params) -> Result<QueryResult> {
        let bound = BoundStatement::parse(sql);
        let values = bound.bind_sql(params)?;

        let engine = self.engine().await?;
        let mut stmt = engine.conn.prepare(&bound.sql).map_err(StoreError::prepare)?;
        let rows = stmt
            .query(values.as_slice())
            .map_err(|e| StoreError::execute(0, e))?;
        Ok(QueryResult::collect(rows)?)
    }

    /// Run a parameterized query and decode each row as `T`.
    pub async fn query_as<T: FromRow>(&self, sql: &str, params: &Params) -> Result<Vec<T>> {
        let bound = BoundStatement::parse(sql);
        let values = bound.bind_sql(params)?;

        let engine = self.engine().await?;
        query_rows(&engine.conn, &bound.sql, values.as_slice())
    }

    /// Node and relation counts.
    pub async fn try_stats(&self) -> Result<GraphStats> {
        let engine = self.engine().await?;
        Ok(GraphStats {
            node_count: count(&engine.conn, &format!("SELECT COUNT(*) FROM {NODE_TABLE}"))?,
            edge_count: count(
                &engine.conn,
                &format!("SELECT COUNT(*) FROM {RELATION_TABLE}"),
            )?,
        })
    }

    /// [`GraphStore::try_stats`], reporting zeros on failure.
    pub async fn stats(&self) -> GraphStats {
        self.try_stats().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read graph stats: {}", e);
            GraphStats::default()
        })
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<StoredNode>> {
        let engine = self.engine().await?;
        let sql = format!("SELECT {NODE_SELECT_COLUMNS} FROM {NODE_TABLE} WHERE id = ?");
        let mut nodes: Vec<StoredNode> = query_rows(&engine.conn, &sql, &[&id])?;
        Ok(nodes.pop())
    }

    /// Relations touching `id`, in both directions.
    pub async fn neighbors(&self, id: &str) -> Result<Vec<Neighbor>> {
        let engine = self.engine().await?;
        let sql = format!(
            "SELECT from_id, to_id, type FROM {RELATION_TABLE}
             WHERE from_id = ? OR to_id = ?
             ORDER BY from_id, to_id, type"
        );
        let rels: Vec<RelationRow> = query_rows(&engine.conn, &sql, &[&id, &id])?;
        Ok(rels
            .into_iter()
            .map(|rel| Neighbor::from_relation(id, rel))
            .collect())
    }

    /// Every stored embedding, ordered by node id.
    ///
    /// Rows whose vector cannot be decoded are skipped with a warning.
    pub async fn node_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let engine = self.engine().await?;
        let sql = format!(
            "SELECT id, CAST(embedding AS VARCHAR) FROM {NODE_TABLE}
             WHERE embedding IS NOT NULL
             ORDER BY id"
        );
        let mut stmt = engine.conn.prepare(&sql)?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(raw.len());
        for (id, text) in raw {
            match parse_vector(&text) {
                Ok(vector) => out.push((id, vector)),
                Err(e) => tracing::warn!("Skipping embedding for {}: {}", id, e),
            }
        }
        Ok(out)
    }

    /// Nodes with one of `labels` that have no embedding yet, ordered by id.
    pub async fn embeddable_nodes(&self, labels: &[NodeLabel]) -> Result<Vec<StoredNode>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT {NODE_SELECT_COLUMNS} FROM {NODE_TABLE}
             WHERE embedding IS NULL AND label IN ({placeholders})
             ORDER BY id"
        );
        let values: Vec<&dyn ToSql> = names.iter().map(|n| n as &dyn ToSql).collect();

        let engine = self.engine().await?;
        query_rows(&engine.conn, &sql, values.as_slice())
    }

    /// Number of nodes carrying an embedding.
    pub async fn embedding_count(&self) -> Result<usize> {
        let engine = self.engine().await?;
        count(
            &engine.conn,
            &format!("SELECT COUNT(*) FROM {NODE_TABLE} WHERE embedding IS NOT NULL"),
        )
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Write a probe vector to one stored node, read it back and compare.
    ///
    /// The node's previous embedding is restored afterwards. Never fails;
    /// problems are reported in the returned report.
    pub async fn test_vector_roundtrip(&self) -> DiagnosticReport {
        match self.try_vector_roundtrip().await {
            Ok(()) => DiagnosticReport {
                success: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Vector roundtrip failed: {}", e);
                DiagnosticReport {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_vector_roundtrip(&self) -> Result<()> {
        let dimension = self.engine_config.embedding_dimension;
        let engine = self.engine().await?;
        let conn = &engine.conn;

        let id: String = conn
            .query_row(
                &format!("SELECT id FROM {NODE_TABLE} ORDER BY id LIMIT 1"),
                [],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::Precondition("no stored node to probe".into()))?;

        let previous: Option<String> = conn.query_row(
            &format!("SELECT CAST(embedding AS VARCHAR) FROM {NODE_TABLE} WHERE id = ?"),
            [&id],
            |row| row.get(0),
        )?;

        let probe: Vec<f32> = (0..dimension).map(|i| (i % 7) as f32 * 0.25 - 0.5).collect();
        let checked = write_and_read(conn, &id, &probe, dimension);

        let restore = match &previous {
            Some(text) => conn.execute(
                &format!(
                    "UPDATE {NODE_TABLE} SET embedding = CAST(? AS {}) WHERE id = ?",
                    vector_type(dimension)
                ),
                [text, &id],
            ),
            None => conn.execute(
                &format!("UPDATE {NODE_TABLE} SET embedding = NULL WHERE id = ?"),
                [&id],
            ),
        };

        let read_back = checked?;
        restore?;

        if read_back.len() != probe.len() {
            return Err(StoreError::DimensionMismatch {
                expected: probe.len(),
                actual: read_back.len(),
            });
        }
        if let Some(i) = (0..probe.len()).find(|&i| (probe[i] - read_back[i]).abs() > 1e-6) {
            return Err(StoreError::Decode(format!(
                "element {} read back as {}, wrote {}",
                i, read_back[i], probe[i]
            )));
        }

        tracing::debug!("Vector roundtrip ok on {} ({} dims)", id, dimension);
        Ok(())
    }
}

impl Drop for GraphStore {
    fn drop(&mut self) {
        if let Some(handles) = self.engine.get_mut().take() {
            let _ = std::fs::remove_dir_all(&handles.staging_dir);
        }
    }
}

/// Clear both tables and import the snapshot files in one transaction.
fn import_snapshot(
    conn: &mut Connection,
    snapshot: &Snapshot,
    nodes_path: &Path,
    relations_path: &Path,
) -> Result<usize> {
    remove_staging_file(nodes_path);
    remove_staging_file(relations_path);
    std::fs::write(nodes_path, &snapshot.nodes_csv)?;
    std::fs::write(relations_path, &snapshot.edges_csv)?;

    let tx = conn.transaction()?;
    tx.execute_batch(&format!("DELETE FROM {RELATION_TABLE}; DELETE FROM {NODE_TABLE};"))?;
    tx.execute_batch(&copy_nodes_sql(nodes_path))?;
    tx.execute_batch(&copy_relations_sql(relations_path))?;
    tx.commit()?;

    count(conn, &format!("SELECT COUNT(*) FROM {NODE_TABLE}"))
}

fn remove_staging_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Could not remove staging file {:?}: {}", path, e);
        }
    }
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    usize::try_from(n).map_err(|_| StoreError::Decode(format!("negative count {}", n)))
}

fn query_rows<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    Ok(rows.collect::<duckdb::Result<Vec<T>>>()?)
}

fn write_and_read(conn: &Connection, id: &str, probe: &[f32], dimension: usize) -> Result<Vec<f32>> {
    let bound = BoundStatement::parse(&attach_embedding_sql(dimension));
    let params = Params::new()
        .with("id", id)
        .with("embedding", ParamValue::Vector(probe.to_vec()));
    let values = bound.bind_sql(&params)?;
    conn.execute(&bound.sql, values.as_slice())?;

    let text: Option<String> = conn.query_row(
        &format!("SELECT CAST(embedding AS VARCHAR) FROM {NODE_TABLE} WHERE id = ?"),
        [id],
        |row| row.get(0),
    )?;
    let text = text.ok_or_else(|| StoreError::Decode("probe vector read back as NULL".into()))?;
    parse_vector(&text)
}

/// Decode the engine's text form of a `FLOAT[n]` value.
pub(crate) fn parse_vector(text: &str) -> Result<Vec<f32>> {
    serde_json::from_str(text).map_err(|e| StoreError::Decode(format!("bad vector {:?}: {}", text, e)))
}
