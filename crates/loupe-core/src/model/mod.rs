//! Core Data Model
//!
//! The persisted entities of the index:
//! - Symbols (named, located code entities)
//! - Edges (call/import/inherit relations between symbols)
//! - Files and file snapshots
//! - Chunks (line-bounded code windows)
//! - Query options, results, and confidence diagnostics

mod chunk;
mod edge;
mod file;
mod query;
mod symbol;

pub use chunk::{Chunk, ChunkKind, ContentKind};
pub use edge::{Edge, EdgeOrigin, EdgeType};
pub use file::{FileContent, FileRecord, FileStatus, RepoMapEntry};
pub use query::{
    ConfidenceDiagnostics, ConfidenceReport, ConfidenceTier, Granularity, QueryMetadata,
    QueryOptions, QueryResult, RerankMode, ScopeFilter, DEFAULT_MAX_TOKENS,
};
pub use symbol::{RawSymbol, Symbol, SymbolType};
