//! Batched execution of parameterized mutations.
//!
//! Large parameter lists (one vector patch per node, typically) are split into
//! small sub-batches. Each sub-batch gets a freshly prepared statement that is
//! dropped before the next one starts, and the engine lock is released while
//! the [`Scheduler`] pauses between sub-batches.

use duckdb::Connection;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::graph_store::GraphStore;
use super::params::{BoundStatement, Params};
use super::schema::attach_embedding_sql;
use crate::error::{Result, StoreError};

/// Cooperative pause awaited between sub-batches.
pub trait Scheduler: Send + Sync {
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Tokio-backed scheduler: yields once for a zero pause, sleeps otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler {
    pause: Duration,
}

impl TokioScheduler {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl Scheduler for TokioScheduler {
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let pause = self.pause;
        Box::pin(async move {
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        })
    }
}

/// What a batched run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Sub-batches run, i.e. statements prepared.
    pub batches: usize,
    /// Parameter sets executed.
    pub executed: usize,
}

impl GraphStore {
    /// Execute `sql` once per parameter set, in order, in sub-batches of
    /// `batch.batch_size`.
    ///
    /// Fails fast: a prepare error is [`StoreError::Prepare`], an execution
    /// error is [`StoreError::Execute`] carrying the position of the failing
    /// set. Sets executed before the failure stay applied.
    pub async fn execute_batched(&self, sql: &str, params_list: &[Params]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if params_list.is_empty() {
            return Ok(report);
        }

        let bound = BoundStatement::parse(sql);
        let batch_size = self.batch_config.batch_size.max(1);
        let total = params_list.len().div_ceil(batch_size);

        for (batch_index, chunk) in params_list.chunks(batch_size).enumerate() {
            {
                let engine = self.engine().await?;
                run_sub_batch(&engine.conn, &bound, chunk, batch_index * batch_size)?;
            }
            report.batches += 1;
            report.executed += chunk.len();
            tracing::debug!(
                "Sub-batch {}/{} done ({} statements)",
                batch_index + 1,
                total,
                chunk.len()
            );

            if batch_index + 1 < total {
                self.scheduler.pause().await;
            }
        }

        Ok(report)
    }

    /// Store one embedding per `(node id, vector)` pair.
    ///
    /// Every vector must have the declared embedding dimension; nothing is
    /// written otherwise.
    pub async fn attach_embeddings(&self, items: &[(String, Vec<f32>)]) -> Result<BatchReport> {
        let dimension = self.engine_config.embedding_dimension;
        if let Some((_, bad)) = items.iter().find(|(_, v)| v.len() != dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let params_list: Vec<Params> = items
            .iter()
            .map(|(id, vector)| {
                Params::new()
                    .with("id", id.as_str())
                    .with("embedding", vector.clone())
            })
            .collect();

        let report = self
            .execute_batched(&attach_embedding_sql(dimension), &params_list)
            .await?;
        tracing::info!(
            "Attached {} embeddings in {} batches",
            report.executed,
            report.batches
        );
        Ok(report)
    }
}

/// Prepare once and run every set of `chunk`. The statement is dropped on return.
fn run_sub_batch(
    conn: &Connection,
    bound: &BoundStatement,
    chunk: &[Params],
    offset: usize,
) -> Result<()> {
    let mut stmt = conn.prepare(&bound.sql).map_err(StoreError::prepare)?;
    for (i, params) in chunk.iter().enumerate() {
        let values = bound.bind_sql(params)?;
        stmt.execute(values.as_slice())
            .map_err(|e| StoreError::execute(offset + i, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, EngineConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingScheduler {
        pauses: AtomicUsize,
    }

    impl Scheduler for CountingScheduler {
        fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    fn store(batch_size: usize, scheduler: Arc<CountingScheduler>) -> GraphStore {
        let batch = BatchConfig {
            batch_size,
            ..BatchConfig::default()
        };
        GraphStore::new(EngineConfig::default(), batch).with_scheduler(scheduler)
    }

    async fn sequence_table(store: &GraphStore) {
        store.query("CREATE SEQUENCE seq_order START 1").await.unwrap();
        store
            .query("CREATE TABLE applied (pos INTEGER, seq BIGINT DEFAULT nextval('seq_order'))")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let scheduler = Arc::new(CountingScheduler::default());
        let store = store(4, scheduler.clone());
        let report = store.execute_batched("SELEC nothing", &[]).await.unwrap();
        assert_eq!(report, BatchReport::default());
        assert_eq!(scheduler.pauses.load(Ordering::SeqCst), 0);
        // No statement ran, so the engine was never opened
        assert!(!store.is_ready().await);
    }

    #[tokio::test]
    async fn test_ten_sets_in_three_batches_keep_order() {
        let scheduler = Arc::new(CountingScheduler::default());
        let store = store(4, scheduler.clone());
        sequence_table(&store).await;

        let params: Vec<Params> = (0..10i64).map(|i| Params::new().with("pos", i)).collect();
        let report = store
            .execute_batched("INSERT INTO applied (pos) VALUES ($pos)", &params)
            .await
            .unwrap();

        assert_eq!(
            report,
            BatchReport {
                batches: 3,
                executed: 10
            }
        );
        assert_eq!(scheduler.pauses.load(Ordering::SeqCst), 2);

        let result = store
            .query("SELECT pos FROM applied ORDER BY seq")
            .await
            .unwrap();
        let order: Vec<i64> = result
            .rows
            .iter()
            .map(|row| row[0].as_i64().unwrap())
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_prepare_failure() {
        let store = store(4, Arc::new(CountingScheduler::default()));
        let params = vec![Params::new().with("x", 1i64)];
        let err = store
            .execute_batched("INSERT INTO no_such_table VALUES ($x)", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Prepare { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_execute_failure_reports_index() {
        let scheduler = Arc::new(CountingScheduler::default());
        let store = store(2, scheduler.clone());
        store
            .query("CREATE TABLE strict_values (v INTEGER NOT NULL)")
            .await
            .unwrap();

        let params = vec![
            Params::new().with("v", 1i64),
            Params::new().with("v", 2i64),
            Params::new().with("v", None::<i64>),
            Params::new().with("v", 4i64),
        ];
        let err = store
            .execute_batched("INSERT INTO strict_values VALUES ($v)", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Execute { index: 2, .. }), "{err}");

        // The first sub-batch stays applied
        let result = store.query("SELECT COUNT(*) AS n FROM strict_values").await.unwrap();
        assert_eq!(result.scalar(), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_attach_embeddings_checks_dimension() {
        let engine = EngineConfig {
            embedding_dimension: 3,
            ..EngineConfig::default()
        };
        let store = GraphStore::new(engine, BatchConfig::default());
        let err = store
            .attach_embeddings(&[("a".to_string(), vec![1.0, 2.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_pauses() {
        TokioScheduler::default().pause().await;
        let start = tokio::time::Instant::now();
        TokioScheduler::new(Duration::from_millis(5)).pause().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
