//! Retrieval Module
//!
//! The hybrid retrieval core:
//! - Keyword search (FTS with query sanitization and path scoping)
//! - Vector search (HNSW or cosine fallback with a similarity gate)
//! - Reciprocal rank fusion of the two channels
//! - Optional reranking (heuristic / BM25 / cross-encoder)
//! - Bounded graph expansion around the top hits
//! - Token-budgeted context assembly
//! - Multi-signal confidence scoring

mod confidence;
mod context;
mod fusion;
mod graph;
mod keyword;
mod query;
mod rerank;
mod vector;

pub use confidence::compute_confidence;
pub use context::{build_context, estimate_tokens, ContextPack};
pub use fusion::{overlap_count, reciprocal_rank_fusion, FusedHit, RRF_K};
pub use graph::{Direction, GraphExpander, GraphExpansion, DEFAULT_FAN_OUT, MAX_GRAPH_DEPTH};
pub use keyword::sanitize_match_query;
pub use query::{adaptive_limit, QueryEngine, QueryError};
pub use rerank::{rerank, RerankCandidate};
pub use vector::{VectorHit, VectorSearcher, MIN_SIMILARITY};
