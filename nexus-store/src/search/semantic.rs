//! Semantic search over a populated graph store.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::index::VectorIndex;
use crate::config::SearchConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{Result, StoreError};
use crate::storage::{Direction, GraphStore, StoredNode};

/// A node close to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub node: StoredNode,
    /// Cosine distance to the query embedding.
    pub distance: f32,
}

/// A node reached from a search hit by following relations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedNode {
    pub node: StoredNode,
    /// Relation through which the node was first reached.
    pub relation_type: String,
    pub direction: Direction,
    /// Hops from the hit, starting at 1.
    pub depth: usize,
}

/// A search hit with its graph neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextResult {
    pub node: StoredNode,
    pub distance: f32,
    pub connected: Vec<ConnectedNode>,
}

/// Nearest-neighbor and graph-expanded queries.
///
/// Reads the store only; nothing here writes to the engine.
pub struct SemanticSearch {
    store: Arc<GraphStore>,
    embedder: Arc<dyn EmbeddingModel>,
    config: SearchConfig,
    index: RwLock<Option<VectorIndex>>,
}

impl SemanticSearch {
    pub fn new(store: Arc<GraphStore>, embedder: Arc<dyn EmbeddingModel>, config: SearchConfig) -> Self {
        Self {
            store,
            embedder,
            config,
            index: RwLock::new(None),
        }
    }

    /// Load every stored embedding into a fresh index, replacing any
    /// previous one. Returns the number of indexed vectors.
    pub async fn build_index(&self) -> Result<usize> {
        self.require_engine().await?;
        let embeddings = self.store.node_embeddings().await?;
        let index = VectorIndex::from_embeddings(self.store.embedding_dimension(), embeddings);
        let indexed = index.len();
        *self.index.write().await = Some(index);
        tracing::info!("Vector index built with {} embeddings", indexed);
        Ok(indexed)
    }

    pub async fn is_index_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Drop the index, e.g. before the store is reloaded.
    pub async fn clear_index(&self) {
        *self.index.write().await = None;
    }

    /// Up to `k` stored nodes within `max_distance` of `query_text`, nearest
    /// first.
    pub async fn semantic_search(
        &self,
        query_text: &str,
        k: usize,
        max_distance: f32,
    ) -> Result<Vec<SearchResult>> {
        self.require_engine().await?;

        let hits = {
            let guard = self.index.read().await;
            let index = guard
                .as_ref()
                .ok_or_else(|| StoreError::Precondition("embeddings are not ready".into()))?;
            if k == 0 {
                return Ok(Vec::new());
            }
            let query = self.embedder.embed_async(query_text).await?;
            index.nearest(&query, k, max_distance)?
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get_node(&hit.node_id).await? {
                Some(node) => results.push(SearchResult {
                    node,
                    distance: hit.distance,
                }),
                None => tracing::warn!("Indexed node {} is no longer stored", hit.node_id),
            }
        }
        Ok(results)
    }

    /// [`SemanticSearch::semantic_search`] with the configured `k` and
    /// distance cutoff.
    pub async fn search(&self, query_text: &str) -> Result<Vec<SearchResult>> {
        self.semantic_search(query_text, self.config.default_k, self.config.max_distance)
            .await
    }

    /// [`SemanticSearch::semantic_search_with_context`] with the configured
    /// `k` and hop count.
    pub async fn search_with_context(&self, query_text: &str) -> Result<Vec<ContextResult>> {
        self.semantic_search_with_context(query_text, self.config.default_k, self.config.context_hops)
            .await
    }

    /// Search, then walk up to `hops` relations (either direction) out from
    /// every hit.
    ///
    /// Each connected node is listed once per hit, at the depth it was first
    /// reached; a hit never lists itself.
    pub async fn semantic_search_with_context(
        &self,
        query_text: &str,
        k: usize,
        hops: usize,
    ) -> Result<Vec<ContextResult>> {
        let seeds = self
            .semantic_search(query_text, k, self.config.max_distance)
            .await?;

        let mut results = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let connected = self.expand(&seed.node.id, hops).await?;
            results.push(ContextResult {
                node: seed.node,
                distance: seed.distance,
                connected,
            });
        }
        Ok(results)
    }

    async fn expand(&self, seed_id: &str, hops: usize) -> Result<Vec<ConnectedNode>> {
        let mut visited: HashSet<String> = HashSet::from([seed_id.to_string()]);
        let mut frontier = vec![seed_id.to_string()];
        let mut connected = Vec::new();

        for depth in 1..=hops {
            let mut next = Vec::new();
            for id in &frontier {
                for neighbor in self.store.neighbors(id).await? {
                    if !visited.insert(neighbor.node_id.clone()) {
                        continue;
                    }
                    let Some(node) = self.store.get_node(&neighbor.node_id).await? else {
                        continue;
                    };
                    next.push(neighbor.node_id);
                    connected.push(ConnectedNode {
                        node,
                        relation_type: neighbor.relation_type,
                        direction: neighbor.direction,
                        depth,
                    });
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(connected)
    }

    async fn require_engine(&self) -> Result<()> {
        if self.store.is_ready().await {
            Ok(())
        } else {
            Err(StoreError::Precondition("graph engine is not ready".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, EngineConfig};
    use crate::embeddings::EmbeddingResult;

    struct Fixed(Vec<f32>);

    impl EmbeddingModel for Fixed {
        fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn search(query: Vec<f32>) -> SemanticSearch {
        let engine = EngineConfig {
            embedding_dimension: 2,
            ..EngineConfig::default()
        };
        let store = Arc::new(GraphStore::new(engine, BatchConfig::default()));
        SemanticSearch::new(store, Arc::new(Fixed(query)), SearchConfig::default())
    }

    #[tokio::test]
    async fn test_requires_engine() {
        let search = search(vec![1.0, 0.0]);
        let err = search.semantic_search("q", 5, 1.0).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("graph engine is not ready"));
        assert!(search.build_index().await.unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_requires_index() {
        let search = search(vec![1.0, 0.0]);
        search.store.ensure_ready().await.unwrap();
        let err = search.semantic_search("q", 5, 1.0).await.unwrap_err();
        assert!(err.to_string().contains("embeddings are not ready"));

        assert_eq!(search.build_index().await.unwrap(), 0);
        assert!(search.is_index_ready().await);
        assert!(search.search("q").await.unwrap().is_empty());

        search.clear_index().await;
        assert!(!search.is_index_ready().await);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let search = search(vec![1.0, 0.0, 0.0]);
        search.store.ensure_ready().await.unwrap();
        search.build_index().await.unwrap();
        let err = search.semantic_search("q", 5, 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }
}
