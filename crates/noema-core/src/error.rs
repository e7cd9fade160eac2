//! Per-subsystem error taxonomy.
//!
//! Each subsystem gets its own `thiserror`-derived enum, chained upward
//! into `EngineError` via `#[from]` so callers of the public façade see a
//! single error type while lower layers stay independently testable.

use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Errors from the Memory Store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp stored for record {id}: {source}")]
    InvalidTimestamp {
        id: uuid::Uuid,
        source: chrono::ParseError,
    },

    #[error("store initialization failed: {0}")]
    Init(String),
}

/// Errors from the Search Engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SearchError {
    #[error("store failure during search: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("embedding generation failed during search, falling back to lexical scoring: {0}")]
    EmbeddingFailure(#[from] EmbeddingError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("search cancelled")]
    Cancelled,
}

/// Errors from the Conflict Resolver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConflictError {
    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("search failure during classification: {0}")]
    SearchFailure(#[from] SearchError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors from the Maintenance Engine. Maintenance operations never
/// throw across the public boundary; this type backs the `success`/
/// `error_message` fields on the structured run results instead of being
/// returned directly, except for `MaintenanceBusy` which is returned
/// immediately when the shared mutex is already held.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MaintenanceError {
    #[error("maintenance operation already in progress: {0}")]
    Busy(&'static str),

    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("maintenance cancelled")]
    Cancelled,
}

/// Configuration validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(
        "conflict thresholds must satisfy 0 < coexist < supersede < duplicate <= 1 (got coexist={coexist}, supersede={supersede}, duplicate={duplicate})"
    )]
    InvalidThresholdOrdering {
        coexist: f32,
        supersede: f32,
        duplicate: f32,
    },

    #[error("embedding dimension must be greater than 0")]
    InvalidEmbeddingDim,

    #[error("storage length limits must be greater than 0")]
    InvalidStorageLimit,
}

/// Errors surfaced across the public Engine Façade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("record not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("operation cancelled")]
    Cancelled,
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SearchResult<T> = Result<T, SearchError>;
pub type ConflictResult<T> = Result<T, ConflictError>;
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;
pub type EngineResult<T> = Result<T, EngineError>;
