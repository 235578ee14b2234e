//! Storage Module
//!
//! A single embedded SQLite database holds all index state: symbols,
//! edges, files, chunks, file snapshots, the repo map, dense vectors,
//! and the full-text keyword index. Single-writer / many-reader
//! discipline with WAL journaling.

pub mod filters;
mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, ensure_fts, get_current_version, SCHEMA_VERSION};
pub use sqlite::{KeywordHit, Store, VectorRow};

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A migration failed; the store is left unmodified
    #[error("Migration to v{version} failed: {message}")]
    Migration { version: u32, message: String },
    /// The database was written by a newer build
    #[error("Schema version {found} is newer than supported {supported}")]
    SchemaDowngrade { found: u32, supported: u32 },
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;
