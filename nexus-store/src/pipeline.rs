//! Ingestion pipeline: bulk load, embeddings, vector index.

use anyhow::{Context, Result};
use nexus_core::{FileContents, KnowledgeGraph, NodeLabel};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::NexusConfig;
use crate::embeddings::{embed_all, EmbeddingModel};
use crate::search::SemanticSearch;
use crate::storage::{GraphStats, GraphStore, StoredNode};

/// Stage reported by a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelinePhase {
    StructuralLoad,
    Embedding,
    Indexing,
    Ready,
    /// A stage was skipped; the message says which and why.
    Degraded,
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: PipelinePhase,
    /// Completion of `phase`, 0 to 100.
    pub percent: u8,
    pub message: String,
    pub stats: Option<GraphStats>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    /// The graph was imported and can be queried.
    pub graph_ready: bool,
    /// Embeddings were stored and the vector index is built.
    pub semantic_ready: bool,
    pub stats: GraphStats,
    /// Nodes that carry an embedding after the run.
    pub embedded_count: usize,
    pub duration: Duration,
}

/// Runs one repository graph through load, embedding and indexing.
pub struct IngestionPipeline {
    store: Arc<GraphStore>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    search: Option<Arc<SemanticSearch>>,
    config: NexusConfig,
}

impl IngestionPipeline {
    /// Without an embedder the pipeline stops after the structural load.
    pub fn new(
        store: Arc<GraphStore>,
        embedder: Option<Arc<dyn EmbeddingModel>>,
        config: NexusConfig,
    ) -> Self {
        let search = embedder.as_ref().map(|model| {
            Arc::new(SemanticSearch::new(
                store.clone(),
                model.clone(),
                config.search.clone(),
            ))
        });
        Self {
            store,
            embedder,
            search,
            config,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Search handle over this pipeline's store, present when an embedder was given.
    pub fn search(&self) -> Option<Arc<SemanticSearch>> {
        self.search.clone()
    }

    /// Load `graph`, embed it and build the vector index.
    ///
    /// Only engine initialization failure is an error. A failed load or a
    /// failed embedding stage is reported through `on_progress` and the
    /// returned outcome.
    ///
    /// After a failed load the store still holds whatever graph was loaded
    /// before; `graph_ready: false` means `graph` itself is not queryable.
    /// The vector index is always cleared.
    pub async fn run<F>(
        &self,
        graph: &KnowledgeGraph,
        file_contents: &FileContents,
        mut on_progress: F,
    ) -> Result<PipelineOutcome>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let start = Instant::now();

        self.store
            .ensure_ready()
            .await
            .context("Failed to initialize graph engine")?;
        if let Some(search) = &self.search {
            search.clear_index().await;
        }

        info!(
            "Loading {} nodes and {} relations",
            graph.node_count(),
            graph.relationship_count()
        );
        on_progress(event(PipelinePhase::StructuralLoad, 0, "Loading graph", None));

        let loaded = self.store.bulk_load(graph, file_contents).await;
        if !loaded.success {
            on_progress(event(
                PipelinePhase::Degraded,
                100,
                "Graph load failed; the previous graph is kept and search is unavailable",
                None,
            ));
            return Ok(PipelineOutcome {
                graph_ready: false,
                semantic_ready: false,
                stats: GraphStats::default(),
                embedded_count: 0,
                duration: start.elapsed(),
            });
        }

        let stats = self.store.stats().await;
        on_progress(event(
            PipelinePhase::StructuralLoad,
            100,
            format!(
                "Loaded {} nodes and {} relations",
                stats.node_count, stats.edge_count
            ),
            Some(stats),
        ));

        let (semantic_ready, embedded_count) =
            match self.embed_and_index(graph, &mut on_progress).await {
                Ok(count) => (true, count),
                Err(e) => {
                    warn!("Semantic search disabled: {:#}", e);
                    on_progress(event(
                        PipelinePhase::Degraded,
                        100,
                        format!("Semantic search unavailable: {:#}", e),
                        Some(stats),
                    ));
                    let stored = self.store.embedding_count().await.unwrap_or_else(|e| {
                        debug!("Could not count embeddings: {}", e);
                        0
                    });
                    (false, stored)
                }
            };

        let duration = start.elapsed();
        info!(
            "Pipeline finished in {:?} (semantic search {})",
            duration,
            if semantic_ready { "ready" } else { "unavailable" }
        );
        on_progress(event(PipelinePhase::Ready, 100, "Ready", Some(stats)));

        Ok(PipelineOutcome {
            graph_ready: true,
            semantic_ready,
            stats,
            embedded_count,
            duration,
        })
    }

    async fn embed_and_index<F>(&self, graph: &KnowledgeGraph, on_progress: &mut F) -> Result<usize>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let (Some(embedder), Some(search)) = (&self.embedder, &self.search) else {
            anyhow::bail!("no embedding model configured");
        };
        if !embedder.is_ready() {
            anyhow::bail!("embedding model {} is not ready", embedder.model_name());
        }
        let dimension = self.store.embedding_dimension();
        if embedder.dimension() != dimension {
            anyhow::bail!(
                "embedding model {} produces {} dimensions, store expects {}",
                embedder.model_name(),
                embedder.dimension(),
                dimension
            );
        }

        let precomputed: Vec<(String, Vec<f32>)> = graph
            .nodes
            .iter()
            .filter_map(|n| n.properties.embedding.clone().map(|v| (n.id.clone(), v)))
            .collect();
        if !precomputed.is_empty() {
            self.store
                .attach_embeddings(&precomputed)
                .await
                .context("Failed to store precomputed embeddings")?;
        }

        let cfg = &self.config.embedding;
        let pending = self
            .store
            .embeddable_nodes(&cfg.labels)
            .await
            .context("Failed to read nodes to embed")?;

        let total = precomputed.len() + pending.len();
        let mut embedded = precomputed.len();
        on_progress(event(
            PipelinePhase::Embedding,
            percent(embedded, total),
            format!("Embedding {} nodes with {}", pending.len(), embedder.model_name()),
            None,
        ));

        for chunk in pending.chunks(cfg.embed_batch_size.max(1)) {
            let texts: Vec<String> = chunk
                .iter()
                .map(|node| embedding_text(node, cfg.max_text_chars))
                .collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = embed_all(embedder.as_ref(), &refs).context("Embedding model failed")?;

            let items: Vec<(String, Vec<f32>)> = chunk
                .iter()
                .map(|node| node.id.clone())
                .zip(vectors)
                .collect();
            self.store
                .attach_embeddings(&items)
                .await
                .context("Failed to store embeddings")?;

            embedded += chunk.len();
            on_progress(event(
                PipelinePhase::Embedding,
                percent(embedded, total),
                format!("Embedded {}/{} nodes", embedded, total),
                None,
            ));
        }

        on_progress(event(PipelinePhase::Indexing, 0, "Building vector index", None));
        let indexed = search
            .build_index()
            .await
            .context("Failed to build vector index")?;
        on_progress(event(
            PipelinePhase::Indexing,
            100,
            format!("Indexed {} embeddings", indexed),
            None,
        ));

        Ok(indexed)
    }
}

fn event(
    phase: PipelinePhase,
    percent: u8,
    message: impl Into<String>,
    stats: Option<GraphStats>,
) -> ProgressEvent {
    ProgressEvent {
        phase,
        percent,
        message: message.into(),
        stats,
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Text handed to the embedding model for a stored node.
pub fn embedding_text(node: &StoredNode, max_chars: usize) -> String {
    let header = match node.label {
        NodeLabel::File => format!("File: {}", node.file_path),
        label => format!("{} {} in {}", label, node.name, node.file_path),
    };
    let body: String = node.content.chars().take(max_chars).collect();
    if body.is_empty() {
        header
    } else {
        format!("{}\n{}", header, body)
    }
}
