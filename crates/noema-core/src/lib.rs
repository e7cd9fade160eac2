//! # Noema Core
//!
//! A local, single-process semantic memory store for AI agents. Agents
//! write short pieces of knowledge ("memories") and later retrieve them
//! by natural-language query. Memories strengthen with use, decay with
//! disuse, are deduplicated and superseded when new information
//! conflicts with old, and are periodically consolidated.
//!
//! ## Core pieces
//!
//! - **Trigram Index** ([`trigram`]): overlapping 3-character shingles
//!   and Jaccard similarity for fuzzy lexical matching.
//! - **Vector Math** ([`vector`]): L2 normalization, cosine similarity,
//!   little-endian `f32` byte packing for on-disk embeddings.
//! - **Memory Store** ([`storage`]): a SQLite-backed document store for
//!   [`record::MemoryRecord`]s — save/get/delete/enumerate/prune/stats.
//! - **Search Engine** ([`search`]): hybrid ranker combining semantic,
//!   fuzzy, strength, and recency signals, with tag filtering and
//!   deduplicating merge.
//! - **Conflict Resolver** ([`conflict`]): classifies inbound memories
//!   as duplicate / superseding / coexisting / new against the current
//!   record set.
//! - **Maintenance Engine** ([`maintenance`]): decay+prune and
//!   cluster-based consolidation runs, serialized behind one mutex.
//! - **Scheduler** ([`scheduler`]): periodic background runners for the
//!   two maintenance operations.
//! - **Engine Façade** ([`engine`]): the public surface tying everything
//!   together — create, get, update, delete, search, stats, tag history,
//!   and the link graph.
//!
//! The engine depends on exactly two external capabilities: a
//! persistent key-value document store (provided here via `rusqlite`)
//! and an embedding function that may be unavailable at runtime,
//! modeled as the [`embedding::EmbeddingProvider`] trait. Wire
//! protocols, configuration-file loading, CLI argument parsing, and the
//! embedding model itself are deliberately out of scope: this crate is
//! the engine, not the service built on top of it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use noema_core::{CreateMemoryRequest, Engine, EngineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = EngineConfig::default();
//! config.db_path = Some(std::path::PathBuf::from("/tmp/noema-example.db"));
//! let engine = Engine::new(config, None)?;
//!
//! let outcome = engine.create(CreateMemoryRequest {
//!     title: "Prefers terse commit messages".to_string(),
//!     summary: "Style preference observed in review feedback".to_string(),
//!     content: String::new(),
//!     tags: vec!["preferences".to_string()],
//!     importance: None,
//!     decay_rate: None,
//!     is_pinned: None,
//!     expires_at: None,
//! })?;
//! println!("{outcome:?}");
//!
//! let results = engine.search("commit message style", 5, None)?;
//! for hit in results {
//!     println!("{} ({:.2})", hit.record.title, hit.composite_score);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod conflict;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod record;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod trigram;
pub mod vector;

pub use config::{ConflictConfig, EmbeddingsConfig, EngineConfig, MaintenanceConfig, StorageConfig};
pub use conflict::ConflictOutcome;
pub use embedding::{EmbeddingError, EmbeddingProvider, NoopEmbeddingProvider};
pub use engine::Engine;
pub use error::{
    ConfigError, ConflictError, EngineError, EngineResult, MaintenanceError, SearchError,
    StoreError,
};
pub use maintenance::{Cancellation, ConsolidationResult, DecayResult, Operation};
pub use record::{CreateMemoryRequest, MemoryRecord, StorageLimits, UpdateMemoryRequest};
pub use scheduler::Scheduler;
pub use search::{ScoredRecord, SearchOptions};
pub use storage::{Storage, StoreStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding vector dimensionality, matching whichever
/// model a caller wires up behind [`EmbeddingProvider`].
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Cancellation, ConflictOutcome, CreateMemoryRequest, Engine, EngineConfig, EngineError,
        EngineResult, MemoryRecord, ScoredRecord, SearchOptions, Storage, StoreStats,
        UpdateMemoryRequest,
    };
}
