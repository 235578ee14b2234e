//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Each migration
//! runs inside a transaction and records its version in
//! `schema_metadata`; opening a database with a newer version than this
//! build understands is rejected.

use rusqlite::Connection;

use super::StoreError;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 3;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: symbols, edges, files, chunks, file_contents, vectors",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Repo map and per-file importance rank",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Query-path indexes for edges and chunks",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- Schema metadata: version number and the embedding model the vector
-- table was built with
CREATE TABLE IF NOT EXISTS schema_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS symbols (
    id TEXT NOT NULL,
    branch TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    symbol_type TEXT NOT NULL,
    language TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    signature TEXT,
    docstring TEXT,
    content_hash TEXT NOT NULL,
    is_external INTEGER NOT NULL DEFAULT 0,
    embedding_model_id TEXT,
    updated_at TEXT NOT NULL,
    revision_id INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (id, branch)
);

CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path, branch);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_qualified ON symbols(qualified_name);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT NOT NULL,
    branch TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    origin TEXT NOT NULL,
    source_start INTEGER,
    source_end INTEGER,
    target_start INTEGER,
    target_end INTEGER,
    updated_at TEXT NOT NULL,
    metadata TEXT,
    PRIMARY KEY (id, branch),
    FOREIGN KEY (source_id, branch) REFERENCES symbols(id, branch) ON DELETE CASCADE,
    FOREIGN KEY (target_id, branch) REFERENCES symbols(id, branch) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id, branch);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id, branch);

CREATE TABLE IF NOT EXISTS files (
    file_path TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    last_indexed TEXT,
    language TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    symbol_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    PRIMARY KEY (file_path, branch)
);

CREATE INDEX IF NOT EXISTS idx_files_status ON files(status, branch);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    parent_symbol_id TEXT,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, branch)
);

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path, branch);

CREATE TABLE IF NOT EXISTS file_contents (
    file_path TEXT NOT NULL,
    branch TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    language TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (file_path, branch)
);

-- Dense vectors, keyed by content id and granularity.
-- Embeddings are little-endian f32 blobs; dimension is uniform per
-- model and enforced at the storage boundary.
CREATE TABLE IF NOT EXISTS vectors (
    content_id TEXT NOT NULL,
    granularity TEXT NOT NULL,
    embedding BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (content_id, granularity)
);

INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('schema_version', '1');
"#;

/// V2: Derived repo map
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS repo_map (
    file_path TEXT NOT NULL,
    branch TEXT NOT NULL,
    importance_score REAL NOT NULL,
    in_degree INTEGER NOT NULL DEFAULT 0,
    out_degree INTEGER NOT NULL DEFAULT 0,
    symbol_summary TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (file_path, branch)
);

CREATE INDEX IF NOT EXISTS idx_repo_map_score ON repo_map(importance_score);

ALTER TABLE files ADD COLUMN importance_rank REAL;

INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('schema_version', '2');
"#;

/// V3: Indexes for the hot query paths (graph expansion, chunk projection)
const MIGRATION_V3_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type, branch);
CREATE INDEX IF NOT EXISTS idx_chunks_parent ON chunks(parent_symbol_id, branch);
CREATE INDEX IF NOT EXISTS idx_symbols_hash ON symbols(content_hash);

INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('schema_version', '3');
"#;

/// Get current schema version from database (0 when uninitialized)
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_metadata'",
            [],
            |row| row.get::<_, i64>(0).map(|n| n > 0),
        )
        .unwrap_or(false);
    if !exists {
        return Ok(0);
    }
    conn.query_row(
        "SELECT value FROM schema_metadata WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .map(|v| v.parse().unwrap_or(0))
    .or(Ok(0))
}

/// Apply pending migrations; rejects databases from a newer build
pub fn apply_migrations(conn: &Connection) -> Result<u32, StoreError> {
    let current_version = get_current_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StoreError::SchemaDowngrade {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // Transactional: a failed migration leaves the store unmodified
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(migration.up)
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: e.to_string(),
                })?;
            tx.commit()?;

            applied += 1;
        }
    }

    Ok(applied)
}

/// Create the full-text table, preferring the trigram tokenizer and
/// falling back to porter where the bundled FTS5 lacks trigram support.
/// Returns the tokenizer in use.
pub fn ensure_fts(conn: &Connection) -> Result<&'static str, StoreError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'fts_content'",
            [],
            |row| row.get::<_, i64>(0).map(|n| n > 0),
        )
        .unwrap_or(false);
    if exists {
        return Ok(get_fts_tokenizer(conn));
    }

    let trigram = "CREATE VIRTUAL TABLE fts_content USING fts5(
        content_id UNINDEXED,
        content_type UNINDEXED,
        branch UNINDEXED,
        file_path,
        name,
        content,
        tokenize='trigram'
    )";

    if conn.execute_batch(trigram).is_ok() {
        set_fts_tokenizer(conn, "trigram")?;
        return Ok("trigram");
    }

    tracing::warn!("FTS5 trigram tokenizer unavailable, falling back to porter");
    conn.execute_batch(
        "CREATE VIRTUAL TABLE fts_content USING fts5(
            content_id UNINDEXED,
            content_type UNINDEXED,
            branch UNINDEXED,
            file_path,
            name,
            content,
            tokenize='porter ascii'
        )",
    )
    .map_err(|e| StoreError::Migration {
        version: SCHEMA_VERSION,
        message: format!("FTS table creation failed: {}", e),
    })?;
    set_fts_tokenizer(conn, "porter")?;
    Ok("porter")
}

fn get_fts_tokenizer(conn: &Connection) -> &'static str {
    let recorded: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_metadata WHERE key = 'fts_tokenizer'",
            [],
            |row| row.get(0),
        )
        .ok();
    match recorded.as_deref() {
        Some("porter") => "porter",
        _ => "trigram",
    }
}

fn set_fts_tokenizer(conn: &Connection, tokenizer: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('fts_tokenizer', ?1)",
        [tokenizer],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_apply_in_order() {
        let conn = memory_conn();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(get_current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = memory_conn();
        apply_migrations(&conn).unwrap();
        let second = apply_migrations(&conn).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_downgrade_rejected() {
        let conn = memory_conn();
        apply_migrations(&conn).unwrap();
        conn.execute(
            "UPDATE schema_metadata SET value = ?1 WHERE key = 'schema_version'",
            [(SCHEMA_VERSION + 10).to_string()],
        )
        .unwrap();

        let err = apply_migrations(&conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaDowngrade { .. }));
    }

    #[test]
    fn test_fts_table_created() {
        let conn = memory_conn();
        apply_migrations(&conn).unwrap();
        let tokenizer = ensure_fts(&conn).unwrap();
        assert!(tokenizer == "trigram" || tokenizer == "porter");

        // Second call is a no-op reporting the same tokenizer
        assert_eq!(ensure_fts(&conn).unwrap(), tokenizer);
    }
}
