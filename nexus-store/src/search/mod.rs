//! Semantic search layer.

pub mod index;
pub mod semantic;

pub use index::{cosine_distance, IndexHit, VectorIndex};
pub use semantic::{ConnectedNode, ContextResult, SearchResult, SemanticSearch};
