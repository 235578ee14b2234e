//! File rows, file snapshots, and repo-map entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// FILE STATUS
// ============================================================================

/// Per-file indexing state machine
///
/// `pending → indexing → indexed` on success,
/// `pending → indexing → error` on failure,
/// `indexed → stale` when a content change is observed.
/// Removal purges the row and cascades to derived rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pending,
    Indexing,
    Indexed,
    Error,
    Stale,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexing => "indexing",
            FileStatus::Indexed => "indexed",
            FileStatus::Error => "error",
            FileStatus::Stale => "stale",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "pending" => FileStatus::Pending,
            "indexing" => FileStatus::Indexing,
            "indexed" => FileStatus::Indexed,
            "error" => FileStatus::Error,
            "stale" => FileStatus::Stale,
            _ => FileStatus::Pending,
        }
    }
}

// ============================================================================
// FILE RECORD
// ============================================================================

/// One row per path per branch
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Workspace-relative path
    pub file_path: String,
    /// Full hex sha256 of the file bytes
    pub file_hash: String,
    /// Modification time as reported by the filesystem (unix seconds)
    pub mtime: i64,
    /// Size in bytes
    pub size: u64,
    /// When indexing last completed for this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
    /// Language id
    pub language: String,
    /// Branch this row belongs to
    pub branch: String,
    /// State machine position
    pub status: FileStatus,
    /// Symbols extracted at last index
    pub symbol_count: u32,
    /// Repo-map rank when computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance_rank: Option<f64>,
    /// Failure detail when status is `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Full file snapshot used for file-granularity retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub file_path: String,
    pub branch: String,
    pub content: String,
    pub content_hash: String,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// REPO MAP
// ============================================================================

/// Derived per-file importance, recomputed on rebuild or explicit refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMapEntry {
    pub file_path: String,
    pub branch: String,
    /// PageRank score over the confidence-weighted edge graph
    pub importance_score: f64,
    pub in_degree: u32,
    pub out_degree: u32,
    /// Short listing of the file's top symbols
    pub symbol_summary: String,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
