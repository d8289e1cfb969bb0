//! Error types for the graph store.

use nexus_core::GraphError;
use thiserror::Error;

use crate::embeddings::EmbeddingError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the graph engine adapter and the layers above it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database or connection could not be created. Not retried.
    #[error("Failed to initialize graph engine: {0}")]
    Init(String),

    /// The engine rejected a statement at prepare time.
    #[error("Failed to prepare statement: {message}")]
    Prepare {
        /// Diagnostic reported by the engine.
        message: String,
    },

    /// A prepared statement failed while executing one parameter set.
    #[error("Statement failed for parameter set {index}: {message}")]
    Execute {
        /// Position of the failing parameter set in the submitted list.
        index: usize,
        /// Diagnostic reported by the engine.
        message: String,
    },

    /// Ad hoc query failure.
    #[error("Query failed: {0}")]
    Query(#[from] duckdb::Error),

    /// A `$name` placeholder had no bound value.
    #[error("Missing value for parameter ${0}")]
    MissingParameter(String),

    /// Vector length differs from the declared embedding dimension.
    #[error("Embedding has {actual} dimensions, schema declares {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Operation called before the store is in the required state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Graph rejected before loading.
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    /// Staging file I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more teardown steps failed. The store is reset regardless.
    #[error("Teardown incomplete: {0}")]
    Teardown(String),

    /// Embedding collaborator failure.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Engine returned a value that could not be decoded.
    #[error("Malformed row: {0}")]
    Decode(String),
}

impl StoreError {
    pub(crate) fn prepare(err: duckdb::Error) -> Self {
        StoreError::Prepare {
            message: err.to_string(),
        }
    }

    pub(crate) fn execute(index: usize, err: duckdb::Error) -> Self {
        StoreError::Execute {
            index,
            message: err.to_string(),
        }
    }

    /// True for errors caused by calling an operation too early.
    pub fn is_precondition(&self) -> bool {
        matches!(self, StoreError::Precondition(_))
    }
}
