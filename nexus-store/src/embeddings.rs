//! Boundary to the embedding collaborator.
//!
//! Inference lives outside this crate. Anything that turns text into a
//! fixed-length vector implements [`EmbeddingModel`]; the pipeline uses it to
//! embed stored node content and the search layer uses it to embed queries.

use std::future::Future;
use std::pin::Pin;

/// Failures reported by an embedding model.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Model not loaded or initialized
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Inference failed
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Model returned a different number of vectors than texts submitted
    #[error("model returned {returned} vectors for {submitted} texts")]
    CountMismatch { submitted: usize, returned: usize },

    #[error("{0}")]
    Other(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A text-to-vector model.
///
/// # Example
///
/// ```ignore
/// use nexus_store::embeddings::{EmbeddingModel, EmbeddingResult};
///
/// struct Onnx { /* session, tokenizer */ }
///
/// impl EmbeddingModel for Onnx {
///     fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
///         self.run(text)
///     }
///
///     fn dimension(&self) -> usize {
///         384
///     }
///
///     fn model_name(&self) -> &str {
///         "all-MiniLM-L6-v2"
///     }
/// }
/// ```
pub trait EmbeddingModel: Send + Sync {
    /// Embed one text.
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed several texts; one vector per text, same order.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Async wrapper over [`EmbeddingModel::embed`] for models that run off-thread.
    fn embed_async<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = EmbeddingResult<Vec<f32>>> + Send + 'a>> {
        Box::pin(async move { self.embed(text) })
    }

    /// Length of every produced vector.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Whether the model can serve requests right now.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Run `embed_batch` and verify one vector came back per text.
pub fn embed_all(model: &dyn EmbeddingModel, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
    let vectors = model.embed_batch(texts)?;
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            submitted: texts.len(),
            returned: vectors.len(),
        });
    }
    Ok(vectors)
}
