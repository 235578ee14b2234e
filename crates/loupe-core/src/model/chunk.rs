//! Chunk - a bounded line-range of code
//!
//! Chunks are either aligned to a symbol, a fixed-window block over
//! residual content, or a whole-file chunk. They are regenerated on
//! every re-index of their file; orphaned chunks (no parent symbol)
//! are allowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The scale at which content is indexed and returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Aligned to a top-level symbol
    #[default]
    Symbol,
    /// Fixed-window block over residual content
    Block,
    /// Whole-file chunk
    File,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Symbol => "symbol",
            ChunkKind::Block => "block",
            ChunkKind::File => "file",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "symbol" => ChunkKind::Symbol,
            "block" => ChunkKind::Block,
            "file" => ChunkKind::File,
            _ => ChunkKind::Block,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Granularity tag for content that flows into the keyword and vector
/// indexes. Distinct from [`ChunkKind`]: a `block` chunk still indexes
/// at `chunk` granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Symbol,
    Chunk,
    File,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Symbol => "symbol",
            ContentKind::Chunk => "chunk",
            ContentKind::File => "file",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "symbol" => ContentKind::Symbol,
            "chunk" => ContentKind::Chunk,
            "file" => ContentKind::File,
            _ => ContentKind::Chunk,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted chunk row
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Deterministic id derived from path, line range, and content hash
    pub id: String,
    pub file_path: String,
    /// 1-based first line
    pub start_line: u32,
    /// 1-based last line (inclusive)
    pub end_line: u32,
    pub content: String,
    pub chunk_type: ChunkKind,
    /// Set for symbol-aligned chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_symbol_id: Option<String>,
    pub language: String,
    /// Full hex sha256 of `content`
    pub content_hash: String,
    pub branch: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_kind_round_trip() {
        for kind in [ChunkKind::Symbol, ChunkKind::Block, ChunkKind::File] {
            assert_eq!(ChunkKind::parse_name(kind.as_str()), kind);
        }
    }
}
