//! Exact in-memory vector index over stored embeddings.

use serde::Serialize;

use crate::error::{Result, StoreError};

/// Cosine distance, `1 - cosine similarity`, in `[0, 2]`.
///
/// Two zero-magnitude vectors are identical (distance 0); a zero vector
/// against any other vector is orthogonal (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let a_magnitude = magnitude(a);
    distance_with_magnitude(a, a_magnitude, b, magnitude(b))
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn distance_with_magnitude(a: &[f32], a_mag: f32, b: &[f32], b_mag: f32) -> f32 {
    match (a_mag == 0.0, b_mag == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => {
            let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            (1.0 - dot / (a_mag * b_mag)).clamp(0.0, 2.0)
        }
    }
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHit {
    pub node_id: String,
    pub distance: f32,
}

struct Entry {
    node_id: String,
    vector: Vec<f32>,
    magnitude: f32,
}

/// Brute-force cosine index. Every query scans all entries.
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<Entry>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Build from `(node id, vector)` pairs. Vectors of the wrong length are
    /// skipped with a warning.
    pub fn from_embeddings(dimension: usize, embeddings: Vec<(String, Vec<f32>)>) -> Self {
        let mut index = Self::new(dimension);
        for (node_id, vector) in embeddings {
            if let Err(e) = index.insert(node_id.clone(), vector) {
                tracing::warn!("Not indexing {}: {}", node_id, e);
            }
        }
        index
    }

    pub fn insert(&mut self, node_id: String, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let magnitude = magnitude(&vector);
        self.entries.push(Entry {
            node_id,
            vector,
            magnitude,
        });
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `k` entries within `max_distance` of `query`, nearest first.
    /// Equal distances are ordered by node id.
    pub fn nearest(&self, query: &[f32], k: usize, max_distance: f32) -> Result<Vec<IndexHit>> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_magnitude = magnitude(query);
        let mut hits: Vec<IndexHit> = self
            .entries
            .iter()
            .map(|e| IndexHit {
                node_id: e.node_id.clone(),
                distance: distance_with_magnitude(query, query_magnitude, &e.vector, e.magnitude),
            })
            .filter(|hit| hit.distance <= max_distance)
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
