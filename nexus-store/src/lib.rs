//! Nexus store - embedded graph engine, vector attachment and semantic search.
//!
//! A [`KnowledgeGraph`](nexus_core::KnowledgeGraph) produced by a parser is
//! bulk-loaded into an in-memory DuckDB instance owned by a [`GraphStore`].
//! Node embeddings are then attached in small batches and indexed for
//! [`SemanticSearch`]. [`IngestionPipeline`] runs the whole sequence and
//! reports progress.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nexus_core::{FileContents, GraphNode, KnowledgeGraph};
//! use nexus_store::{GraphStore, IngestionPipeline, NexusConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = NexusConfig::load(std::path::Path::new("."));
//! let store = Arc::new(GraphStore::from_config(&config));
//!
//! let mut graph = KnowledgeGraph::new();
//! graph.add_node(GraphNode::file("src/main.rs"));
//!
//! let pipeline = IngestionPipeline::new(store.clone(), None, config);
//! let outcome = pipeline
//!     .run(&graph, &FileContents::new(), |event| println!("{:?}", event))
//!     .await?;
//! assert!(outcome.graph_ready);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod search;
pub mod storage;

pub use config::NexusConfig;
pub use embeddings::{EmbeddingError, EmbeddingModel};
pub use error::{Result, StoreError};
pub use pipeline::{IngestionPipeline, PipelineOutcome, PipelinePhase, ProgressEvent};
pub use search::{ContextResult, SearchResult, SemanticSearch};
pub use storage::{
    BatchReport, BulkLoadOutcome, DiagnosticReport, EngineState, GraphStats, GraphStore, Params,
    QueryResult, StoredNode,
};
