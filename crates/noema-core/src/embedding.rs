//! The embedding service as an external capability.
//!
//! The embedding model itself is deliberately out of scope: the engine
//! only depends on this trait, so any concrete model (or none at all)
//! can back it.

use thiserror::Error;

/// Errors an `EmbeddingProvider` can surface. Both variants are recovered
/// locally by callers: the engine falls back to lexical-only scoring
/// and logs a warning rather than propagating these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmbeddingError {
    #[error("embedding service is unavailable")]
    Unavailable,
    #[error("embedding generation failed: {0}")]
    GenerationFailed(String),
}

/// Capability interface for turning text into dense vectors.
///
/// Implementations are expected to be stateless and safe to call
/// concurrently from multiple tasks.
pub trait EmbeddingProvider: Send + Sync {
    /// Whether this provider currently has a usable model. The engine
    /// branches on this single predicate wherever it decides whether to
    /// attempt semantic scoring.
    fn is_available(&self) -> bool;

    /// The dimensionality of vectors this provider returns.
    fn dim(&self) -> usize;

    /// Embed `text`. Vectors returned are not required to be unit-norm;
    /// the engine normalizes before storage and comparison.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// No-op provider: always unavailable. The default when no embedding
/// model is wired up, so the engine degrades to lexical-only scoring
/// without special-casing the absence of a provider anywhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbeddingProvider {
    dim: usize,
}

impl NoopEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingProvider for NoopEmbeddingProvider {
    fn is_available(&self) -> bool {
        false
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable)
    }
}
