//! # Loupe Core
//!
//! Local code-intelligence engine: makes a source tree queryable by
//! natural-language and structural questions.
//!
//! - **Extraction**: language adapters (TypeScript/JS, Python) produce
//!   symbols with deterministic, rename-stable identity; a chunker
//!   produces line-bounded windows; a text backstop infers import and
//!   call edges when no language server is available
//! - **Storage**: a single SQLite database (WAL, versioned schema with
//!   migrations) holding symbols, edges, files, chunks, file snapshots,
//!   the repo map, an FTS5 keyword index, and dense vectors
//! - **Embeddings**: an `Embedder` capability with local neural
//!   (fastembed), remote API, and deterministic hash implementations,
//!   plus a content-addressed LRU cache and a rate-limited batch
//!   processor
//! - **Retrieval**: concurrent keyword + vector search fused with RRF,
//!   optional reranking, bounded graph expansion, token-budgeted
//!   context assembly, and multi-signal confidence scoring
//! - **Impact analysis**: reverse-graph traversal with risk
//!   classification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loupe_core::Loupe;
//!
//! let loupe = Loupe::open(workspace_root)?;
//! loupe.refresh().await?;
//!
//! let result = loupe
//!     .smart_query(loupe.default_query("function that validates email addresses"))
//!     .await?;
//! println!("{}", result.context);
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local neural embeddings + cross-encoder
//!   reranking with fastembed
//! - `vector-search` (default): HNSW vector index with USearch
//! - `remote-embeddings`: OpenAI-style remote embedding API client
//! - `bundled-sqlite` (default): bundle SQLite with FTS5

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod extract;
pub mod ident;
pub mod impact;
pub mod index;
pub mod model;
pub mod repomap;
pub mod retrieval;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Facade
pub use engine::{
    CallGraph, CallGraphNode, CallGraphOutcome, Loupe, LoupeError, SymbolSearchHit,
};

// Configuration
pub use config::{ConfigError, IndexConfig, QueryDefaults};

// Data model
pub use model::{
    Chunk, ChunkKind, ConfidenceDiagnostics, ConfidenceReport, ConfidenceTier, ContentKind,
    Edge, EdgeOrigin, EdgeType, FileContent, FileRecord, FileStatus, Granularity,
    QueryMetadata, QueryOptions, QueryResult, RawSymbol, RepoMapEntry, RerankMode,
    ScopeFilter, Symbol, SymbolType,
};

// Storage layer
pub use storage::{Store, StoreError, SCHEMA_VERSION};

// Indexing
pub use index::{
    FileFingerprint, IndexError, IndexManager, IndexStatus, Lifecycle, MerkleCache,
    RefreshOutcome,
};

// Retrieval
pub use retrieval::{
    adaptive_limit, build_context, compute_confidence, estimate_tokens, reciprocal_rank_fusion,
    sanitize_match_query, ContextPack, Direction, FusedHit, GraphExpander, GraphExpansion,
    QueryEngine, QueryError, VectorSearcher, MIN_SIMILARITY, RRF_K,
};

// Embeddings
pub use embeddings::{
    cosine_similarity, BatchConfig, BatchItem, BatchProcessor, EmbedError, Embedder,
    EmbeddingCache, HashEmbedder, InputType,
};

// Impact analysis
pub use impact::{ImpactAnalyzer, ImpactOutcome, ImpactReport, RiskLevel};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ConfidenceTier, IndexConfig, Loupe, LoupeError, QueryOptions, QueryResult, RerankMode,
        Symbol, SymbolType,
    };
}
