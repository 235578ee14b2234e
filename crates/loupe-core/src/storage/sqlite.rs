//! SQLite Store
//!
//! Core storage layer: typed stores for every entity over a single
//! file-backed database. Separate reader/writer connections behind
//! `Mutex` give interior mutability, so all methods take `&self` and
//! the store is `Send + Sync` behind an `Arc`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::filters::scope_clause;
use super::{migrations, Result, StoreError};
use crate::embeddings::{vec_from_bytes, vec_to_bytes};
use crate::model::{
    Chunk, ChunkKind, ContentKind, Edge, EdgeOrigin, EdgeType, FileContent, FileRecord,
    FileStatus, RepoMapEntry, ScopeFilter, Symbol, SymbolType,
};

// ============================================================================
// RESULT ROWS
// ============================================================================

/// A keyword-channel hit from the full-text index
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub content_id: String,
    pub content_type: ContentKind,
    pub file_path: String,
    pub name: String,
    /// Positive relevance (negated bm25, boosted for exact name matches)
    pub score: f64,
}

/// A raw vector row joined with enough context for filtering and
/// chunk-to-symbol projection
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub content_id: String,
    pub granularity: ContentKind,
    pub embedding: Vec<f32>,
    /// Path of the owning file, when the content row still exists
    pub file_path: Option<String>,
    /// Parent symbol for chunk-granularity rows
    pub parent_symbol_id: Option<String>,
}

// ============================================================================
// STORE
// ============================================================================

/// The embedded relational store owning all persisted state
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    fts_tokenizer: &'static str,
    embedding_model_id: String,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open or create the store, run migrations, and reconcile the
    /// embedding model id. A model change truncates all vectors: mixing
    /// vectors from different models is never meaningful.
    pub fn open(path: &Path, embedding_model_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(path)?;
        Self::configure_connection(&writer_conn)?;

        migrations::apply_migrations(&writer_conn)?;
        let fts_tokenizer = migrations::ensure_fts(&writer_conn)?;

        // Reconcile embedding model: mismatch wipes the vector table
        let recorded: Option<String> = writer_conn
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = 'embedding_model_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match recorded.as_deref() {
            Some(existing) if existing == embedding_model_id => {}
            Some(existing) => {
                tracing::warn!(
                    "Embedding model changed ({} -> {}), truncating vectors",
                    existing,
                    embedding_model_id
                );
                writer_conn.execute("DELETE FROM vectors", [])?;
                writer_conn.execute(
                    "INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('embedding_model_id', ?1)",
                    [embedding_model_id],
                )?;
            }
            None => {
                writer_conn.execute(
                    "INSERT OR REPLACE INTO schema_metadata (key, value) VALUES ('embedding_model_id', ?1)",
                    [embedding_model_id],
                )?;
            }
        }

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            fts_tokenizer,
            embedding_model_id: embedding_model_id.to_string(),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))
    }

    /// Tokenizer the FTS table was created with
    pub fn fts_tokenizer(&self) -> &'static str {
        self.fts_tokenizer
    }

    /// The embedding model the vector table is bound to
    pub fn embedding_model_id(&self) -> &str {
        &self.embedding_model_id
    }

    /// Read a schema metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT value FROM schema_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ========================================================================
    // SYMBOLS
    // ========================================================================

    /// Parse RFC3339 timestamp
    fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                    )),
                )
            })
    }

    fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
        let updated_at: String = row.get("updated_at")?;
        let symbol_type: String = row.get("symbol_type")?;
        Ok(Symbol {
            id: row.get("id")?,
            name: row.get("name")?,
            qualified_name: row.get("qualified_name")?,
            symbol_type: SymbolType::parse_name(&symbol_type),
            language: row.get("language")?,
            file_path: row.get("file_path")?,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            content: row.get("content")?,
            signature: row.get("signature")?,
            docstring: row.get("docstring")?,
            content_hash: row.get("content_hash")?,
            is_external: row.get::<_, i64>("is_external")? != 0,
            branch: row.get("branch")?,
            embedding_model_id: row.get("embedding_model_id")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
            revision_id: row.get("revision_id")?,
        })
    }

    /// Upsert a single symbol. Idempotent by (id, branch): re-upserting
    /// identical content leaves the revision counter unchanged.
    pub fn upsert_symbol(&self, symbol: &Symbol) -> Result<()> {
        let writer = self.writer()?;
        Self::upsert_symbol_on(&writer, symbol)
    }

    fn upsert_symbol_on(conn: &Connection, symbol: &Symbol) -> Result<()> {
        conn.execute(
            "INSERT INTO symbols (
                id, branch, name, qualified_name, symbol_type, language, file_path,
                start_line, end_line, content, signature, docstring, content_hash,
                is_external, embedding_model_id, updated_at, revision_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 1)
            ON CONFLICT(id, branch) DO UPDATE SET
                name = excluded.name,
                qualified_name = excluded.qualified_name,
                symbol_type = excluded.symbol_type,
                language = excluded.language,
                file_path = excluded.file_path,
                start_line = excluded.start_line,
                end_line = excluded.end_line,
                content = excluded.content,
                signature = excluded.signature,
                docstring = excluded.docstring,
                is_external = excluded.is_external,
                embedding_model_id = excluded.embedding_model_id,
                updated_at = excluded.updated_at,
                revision_id = symbols.revision_id
                    + (symbols.content_hash != excluded.content_hash),
                content_hash = excluded.content_hash",
            params![
                symbol.id,
                symbol.branch,
                symbol.name,
                symbol.qualified_name,
                symbol.symbol_type.as_str(),
                symbol.language,
                symbol.file_path,
                symbol.start_line,
                symbol.end_line,
                symbol.content,
                symbol.signature,
                symbol.docstring,
                symbol.content_hash,
                symbol.is_external as i64,
                symbol.embedding_model_id,
                symbol.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Upsert a batch of symbols inside one write transaction
    pub fn upsert_symbols(&self, symbols: &[Symbol]) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        for symbol in symbols {
            Self::upsert_symbol_on(&tx, symbol)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a symbol by id
    pub fn get_symbol(&self, id: &str, branch: &str) -> Result<Option<Symbol>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT * FROM symbols WHERE id = ?1 AND branch = ?2",
                params![id, branch],
                Self::row_to_symbol,
            )
            .optional()?)
    }

    /// Get symbols by id, returned as a map (callers preserve order)
    pub fn get_symbols(&self, ids: &[String], branch: &str) -> Result<HashMap<String, Symbol>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM symbols WHERE branch = ? AND id IN ({})",
            placeholders
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let mut bind: Vec<&str> = vec![branch];
        bind.extend(ids.iter().map(|s| s.as_str()));
        let rows = stmt.query_map(params_from_iter(bind), Self::row_to_symbol)?;

        let mut map = HashMap::with_capacity(ids.len());
        for row in rows {
            let symbol = row?;
            map.insert(symbol.id.clone(), symbol);
        }
        Ok(map)
    }

    /// Symbols defined in one file
    pub fn get_symbols_by_file(&self, file_path: &str, branch: &str) -> Result<Vec<Symbol>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM symbols WHERE file_path = ?1 AND branch = ?2 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![file_path, branch], Self::row_to_symbol)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Resolve a symbol by exact name or qualified-name suffix
    pub fn find_symbols_by_name(
        &self,
        name: &str,
        branch: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM symbols
             WHERE branch = ?1 AND (name = ?2 OR qualified_name = ?2 OR id = ?2)
             ORDER BY is_external, qualified_name
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![branch, name, limit as i64], Self::row_to_symbol)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete symbols by id, cascading edges (FK) and cleaning their
    /// keyword and vector rows
    pub fn delete_symbols_by_ids(&self, ids: &[String], branch: &str) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        let placeholders = vec!["?"; ids.len()].join(", ");

        let mut bind: Vec<&str> = vec![branch];
        bind.extend(ids.iter().map(|s| s.as_str()));
        let deleted = tx.execute(
            &format!(
                "DELETE FROM symbols WHERE branch = ? AND id IN ({})",
                placeholders
            ),
            params_from_iter(bind.clone()),
        )?;

        tx.execute(
            &format!(
                "DELETE FROM fts_content WHERE branch = ? AND content_id IN ({})",
                placeholders
            ),
            params_from_iter(bind),
        )?;
        tx.execute(
            &format!("DELETE FROM vectors WHERE content_id IN ({})", placeholders),
            params_from_iter(ids.iter().map(|s| s.as_str())),
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Count symbols in a branch
    pub fn count_symbols(&self, branch: &str) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM symbols WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?)
    }

    // ========================================================================
    // EDGES
    // ========================================================================

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        let updated_at: String = row.get("updated_at")?;
        let edge_type: String = row.get("edge_type")?;
        let origin: String = row.get("origin")?;
        let metadata: Option<String> = row.get("metadata")?;
        let source_start: Option<u32> = row.get("source_start")?;
        let source_end: Option<u32> = row.get("source_end")?;
        let target_start: Option<u32> = row.get("target_start")?;
        let target_end: Option<u32> = row.get("target_end")?;

        Ok(Edge {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            edge_type: EdgeType::parse_name(&edge_type),
            confidence: row.get("confidence")?,
            origin: EdgeOrigin::parse_name(&origin),
            branch: row.get("branch")?,
            source_range: source_start.zip(source_end),
            target_range: target_start.zip(target_end),
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        })
    }

    fn upsert_edge_on(conn: &Connection, edge: &Edge) -> Result<()> {
        let metadata = edge
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());
        conn.execute(
            "INSERT INTO edges (
                id, branch, source_id, target_id, edge_type, confidence, origin,
                source_start, source_end, target_start, target_end, updated_at, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id, branch) DO UPDATE SET
                confidence = excluded.confidence,
                origin = excluded.origin,
                source_start = excluded.source_start,
                source_end = excluded.source_end,
                target_start = excluded.target_start,
                target_end = excluded.target_end,
                updated_at = excluded.updated_at,
                metadata = excluded.metadata",
            params![
                edge.id,
                edge.branch,
                edge.source_id,
                edge.target_id,
                edge.edge_type.as_str(),
                edge.confidence,
                edge.origin.as_str(),
                edge.source_range.map(|r| r.0),
                edge.source_range.map(|r| r.1),
                edge.target_range.map(|r| r.0),
                edge.target_range.map(|r| r.1),
                edge.updated_at.to_rfc3339(),
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Upsert a single edge; the newer assertion wins on conflict
    pub fn upsert_edge(&self, edge: &Edge) -> Result<()> {
        let writer = self.writer()?;
        Self::upsert_edge_on(&writer, edge)
    }

    /// Upsert a batch of edges inside one write transaction
    pub fn upsert_edges(&self, edges: &[Edge]) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        for edge in edges {
            Self::upsert_edge_on(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn edges_by_column(&self, column: &str, ids: &[String], branch: &str) -> Result<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM edges WHERE branch = ? AND {} IN ({})",
            column, placeholders
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let mut bind: Vec<&str> = vec![branch];
        bind.extend(ids.iter().map(|s| s.as_str()));
        let rows = stmt.query_map(params_from_iter(bind), Self::row_to_edge)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Outgoing edges (callees, imports) for a set of source symbols
    pub fn edges_from(&self, source_ids: &[String], branch: &str) -> Result<Vec<Edge>> {
        self.edges_by_column("source_id", source_ids, branch)
    }

    /// Incoming edges (callers, dependents) for a set of target symbols
    pub fn edges_to(&self, target_ids: &[String], branch: &str) -> Result<Vec<Edge>> {
        self.edges_by_column("target_id", target_ids, branch)
    }

    /// All edges in a branch (repo-map computation)
    pub fn all_edges(&self, branch: &str) -> Result<Vec<Edge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT * FROM edges WHERE branch = ?1")?;
        let rows = stmt.query_map([branch], Self::row_to_edge)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Count edges in a branch
    pub fn count_edges(&self, branch: &str) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM edges WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?)
    }

    // ========================================================================
    // FILES
    // ========================================================================

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        let last_indexed: Option<String> = row.get("last_indexed")?;
        let status: String = row.get("status")?;
        Ok(FileRecord {
            file_path: row.get("file_path")?,
            file_hash: row.get("file_hash")?,
            mtime: row.get("mtime")?,
            size: row.get::<_, i64>("size")? as u64,
            last_indexed: last_indexed
                .map(|s| Self::parse_timestamp(&s, "last_indexed"))
                .transpose()?,
            language: row.get("language")?,
            branch: row.get("branch")?,
            status: FileStatus::parse_name(&status),
            symbol_count: row.get("symbol_count")?,
            importance_rank: row.get("importance_rank")?,
            error_message: row.get("error_message")?,
        })
    }

    /// Upsert a file row
    pub fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO files (
                file_path, branch, file_hash, mtime, size, last_indexed, language,
                status, symbol_count, importance_rank, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(file_path, branch) DO UPDATE SET
                file_hash = excluded.file_hash,
                mtime = excluded.mtime,
                size = excluded.size,
                last_indexed = excluded.last_indexed,
                language = excluded.language,
                status = excluded.status,
                symbol_count = excluded.symbol_count,
                importance_rank = excluded.importance_rank,
                error_message = excluded.error_message",
            params![
                file.file_path,
                file.branch,
                file.file_hash,
                file.mtime,
                file.size as i64,
                file.last_indexed.map(|dt| dt.to_rfc3339()),
                file.language,
                file.status.as_str(),
                file.symbol_count,
                file.importance_rank,
                file.error_message,
            ],
        )?;
        Ok(())
    }

    /// Get a file row
    pub fn get_file(&self, file_path: &str, branch: &str) -> Result<Option<FileRecord>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT * FROM files WHERE file_path = ?1 AND branch = ?2",
                params![file_path, branch],
                Self::row_to_file,
            )
            .optional()?)
    }

    /// Transition a file's status
    pub fn set_file_status(
        &self,
        file_path: &str,
        branch: &str,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "UPDATE files SET status = ?1, error_message = ?2,
                last_indexed = CASE WHEN ?1 = 'indexed' THEN ?3 ELSE last_indexed END
             WHERE file_path = ?4 AND branch = ?5",
            params![
                status.as_str(),
                error_message,
                Utc::now().to_rfc3339(),
                file_path,
                branch
            ],
        )?;
        Ok(())
    }

    /// All file rows in a branch
    pub fn list_files(&self, branch: &str) -> Result<Vec<FileRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT * FROM files WHERE branch = ?1 ORDER BY file_path")?;
        let rows = stmt.query_map([branch], Self::row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Purge a file and everything derived from it
    pub fn delete_file_rows(&self, file_path: &str, branch: &str) -> Result<()> {
        // Symbols first so edge cascades and vector cleanup see the ids
        let symbol_ids: Vec<String> = self
            .get_symbols_by_file(file_path, branch)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.delete_symbols_by_ids(&symbol_ids, branch)?;
        self.delete_chunks_by_file(file_path, branch)?;

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM file_contents WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        tx.execute(
            "DELETE FROM fts_content WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        // file-granularity vectors are keyed by path
        tx.execute(
            "DELETE FROM vectors WHERE content_id = ?1 AND granularity = 'file'",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM repo_map WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        tx.execute(
            "DELETE FROM files WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Count files in a branch
    pub fn count_files(&self, branch: &str) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM files WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?)
    }

    /// File counts grouped by status
    pub fn file_status_counts(&self, branch: &str) -> Result<HashMap<String, i64>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT status, COUNT(*) FROM files WHERE branch = ?1 GROUP BY status")?;
        let rows = stmt.query_map([branch], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            map.insert(status, count);
        }
        Ok(map)
    }

    // ========================================================================
    // CHUNKS
    // ========================================================================

    fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
        let updated_at: String = row.get("updated_at")?;
        let chunk_type: String = row.get("chunk_type")?;
        Ok(Chunk {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            content: row.get("content")?,
            chunk_type: ChunkKind::parse_name(&chunk_type),
            parent_symbol_id: row.get("parent_symbol_id")?,
            language: row.get("language")?,
            content_hash: row.get("content_hash")?,
            branch: row.get("branch")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Upsert a batch of chunks inside one write transaction
    pub fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (
                    id, branch, file_path, start_line, end_line, content, chunk_type,
                    parent_symbol_id, language, content_hash, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id, branch) DO UPDATE SET
                    content = excluded.content,
                    parent_symbol_id = excluded.parent_symbol_id,
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at",
                params![
                    chunk.id,
                    chunk.branch,
                    chunk.file_path,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.content,
                    chunk.chunk_type.as_str(),
                    chunk.parent_symbol_id,
                    chunk.language,
                    chunk.content_hash,
                    chunk.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Chunks belonging to one file
    pub fn get_chunks_by_file(&self, file_path: &str, branch: &str) -> Result<Vec<Chunk>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM chunks WHERE file_path = ?1 AND branch = ?2 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![file_path, branch], Self::row_to_chunk)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Parent symbol ids for a set of chunk ids
    pub fn chunk_parents(
        &self,
        ids: &[String],
        branch: &str,
    ) -> Result<HashMap<String, Option<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, parent_symbol_id FROM chunks WHERE branch = ? AND id IN ({})",
            placeholders
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let mut bind: Vec<&str> = vec![branch];
        bind.extend(ids.iter().map(|s| s.as_str()));
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (id, parent) = row?;
            map.insert(id, parent);
        }
        Ok(map)
    }

    /// Delete a file's chunks plus their keyword and vector rows
    pub fn delete_chunks_by_file(&self, file_path: &str, branch: &str) -> Result<usize> {
        let ids: Vec<String> = {
            let reader = self.reader()?;
            let mut stmt = reader
                .prepare("SELECT id FROM chunks WHERE file_path = ?1 AND branch = ?2")?;
            let rows = stmt.query_map(params![file_path, branch], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let deleted = tx.execute(
            &format!(
                "DELETE FROM chunks WHERE branch = ? AND id IN ({})",
                placeholders
            ),
            params_from_iter(std::iter::once(branch).chain(ids.iter().map(|s| s.as_str()))),
        )?;
        tx.execute(
            &format!(
                "DELETE FROM fts_content WHERE branch = ? AND content_id IN ({})",
                placeholders
            ),
            params_from_iter(std::iter::once(branch).chain(ids.iter().map(|s| s.as_str()))),
        )?;
        tx.execute(
            &format!("DELETE FROM vectors WHERE content_id IN ({})", placeholders),
            params_from_iter(ids.iter().map(|s| s.as_str())),
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Count chunks in a branch
    pub fn count_chunks(&self, branch: &str) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM chunks WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?)
    }

    // ========================================================================
    // FILE CONTENTS
    // ========================================================================

    /// Upsert the full-file snapshot used for file-granularity retrieval
    pub fn upsert_file_content(&self, fc: &FileContent) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO file_contents (file_path, branch, content, content_hash, language, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_path, branch) DO UPDATE SET
                content = excluded.content,
                content_hash = excluded.content_hash,
                language = excluded.language,
                updated_at = excluded.updated_at",
            params![
                fc.file_path,
                fc.branch,
                fc.content,
                fc.content_hash,
                fc.language,
                fc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the full-file snapshot
    pub fn get_file_content(&self, file_path: &str, branch: &str) -> Result<Option<FileContent>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT * FROM file_contents WHERE file_path = ?1 AND branch = ?2",
                params![file_path, branch],
                |row| {
                    let updated_at: String = row.get("updated_at")?;
                    Ok(FileContent {
                        file_path: row.get("file_path")?,
                        branch: row.get("branch")?,
                        content: row.get("content")?,
                        content_hash: row.get("content_hash")?,
                        language: row.get("language")?,
                        updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
                    })
                },
            )
            .optional()?)
    }

    // ========================================================================
    // REPO MAP
    // ========================================================================

    /// Replace the repo map for a branch in one transaction
    pub fn replace_repo_map(&self, entries: &[RepoMapEntry], branch: &str) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        tx.execute("DELETE FROM repo_map WHERE branch = ?1", [branch])?;
        for entry in entries {
            tx.execute(
                "INSERT INTO repo_map (
                    file_path, branch, importance_score, in_degree, out_degree,
                    symbol_summary, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.file_path,
                    entry.branch,
                    entry.importance_score,
                    entry.in_degree,
                    entry.out_degree,
                    entry.symbol_summary,
                    entry.updated_at.to_rfc3339(),
                ],
            )?;
            tx.execute(
                "UPDATE files SET importance_rank = ?1 WHERE file_path = ?2 AND branch = ?3",
                params![entry.importance_score, entry.file_path, entry.branch],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Ranked repo-map entries, optionally restricted to a directory
    pub fn get_repo_map(
        &self,
        branch: &str,
        limit: usize,
        directory: Option<&str>,
    ) -> Result<Vec<RepoMapEntry>> {
        let reader = self.reader()?;
        let row_to_entry = |row: &rusqlite::Row| -> rusqlite::Result<RepoMapEntry> {
            let updated_at: String = row.get("updated_at")?;
            Ok(RepoMapEntry {
                file_path: row.get("file_path")?,
                branch: row.get("branch")?,
                importance_score: row.get("importance_score")?,
                in_degree: row.get("in_degree")?,
                out_degree: row.get("out_degree")?,
                symbol_summary: row.get("symbol_summary")?,
                updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
            })
        };

        let mut out = Vec::new();
        match directory {
            Some(dir) => {
                let prefix = format!("{}%", super::filters::escape_like_literal(dir));
                let mut stmt = reader.prepare(
                    "SELECT * FROM repo_map
                     WHERE branch = ?1 AND file_path LIKE ?2 ESCAPE '\\'
                     ORDER BY importance_score DESC LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![branch, prefix, limit as i64], row_to_entry)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM repo_map WHERE branch = ?1
                     ORDER BY importance_score DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![branch, limit as i64], row_to_entry)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    // ========================================================================
    // VECTORS
    // ========================================================================

    /// Upsert a batch of vectors inside one write transaction
    pub fn upsert_vectors(&self, rows: &[(String, ContentKind, Vec<f32>)]) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();
        for (content_id, granularity, vector) in rows {
            tx.execute(
                "INSERT OR REPLACE INTO vectors (content_id, granularity, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![content_id, granularity.as_str(), vec_to_bytes(vector), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All vector rows joined with their owning content, for the
    /// retrieval layer. Rows whose content no longer exists in the
    /// branch come back with `file_path = None` and are skipped there.
    pub fn vector_candidates(
        &self,
        branch: &str,
        granularity: Option<ContentKind>,
    ) -> Result<Vec<VectorRow>> {
        let reader = self.reader()?;
        let base = "SELECT v.content_id, v.granularity, v.embedding,
                COALESCE(s.file_path, c.file_path, fc.file_path) AS file_path,
                c.parent_symbol_id AS parent_symbol_id
             FROM vectors v
             LEFT JOIN symbols s
                ON v.granularity = 'symbol' AND s.id = v.content_id AND s.branch = ?1
             LEFT JOIN chunks c
                ON v.granularity = 'chunk' AND c.id = v.content_id AND c.branch = ?1
             LEFT JOIN file_contents fc
                ON v.granularity = 'file' AND fc.file_path = v.content_id AND fc.branch = ?1";

        let mut out = Vec::new();
        let mut push_row = |row: &rusqlite::Row| -> rusqlite::Result<()> {
            let granularity: String = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            out.push(VectorRow {
                content_id: row.get(0)?,
                granularity: ContentKind::parse_name(&granularity),
                embedding: vec_from_bytes(&blob),
                file_path: row.get(3)?,
                parent_symbol_id: row.get(4)?,
            });
            Ok(())
        };

        match granularity {
            Some(kind) => {
                let sql = format!("{} WHERE v.granularity = ?2", base);
                let mut stmt = reader.prepare(&sql)?;
                let mut rows = stmt.query(params![branch, kind.as_str()])?;
                while let Some(row) = rows.next()? {
                    push_row(row)?;
                }
            }
            None => {
                let mut stmt = reader.prepare(base)?;
                let mut rows = stmt.query([branch])?;
                while let Some(row) = rows.next()? {
                    push_row(row)?;
                }
            }
        }
        Ok(out)
    }

    /// Remove all vectors (embedding model change, rebuild)
    pub fn clear_vectors(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("DELETE FROM vectors", [])?;
        Ok(())
    }

    /// Count stored vectors
    pub fn count_vectors(&self) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?)
    }

    // ========================================================================
    // KEYWORD INDEX
    // ========================================================================

    /// Replace a file's keyword rows in one transaction
    pub fn fts_replace_file(
        &self,
        file_path: &str,
        branch: &str,
        rows: &[(String, ContentKind, String, String)],
    ) -> Result<()> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM fts_content WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        for (content_id, content_type, name, content) in rows {
            tx.execute(
                "INSERT INTO fts_content (content_id, content_type, branch, file_path, name, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![content_id, content_type.as_str(), branch, file_path, name, content],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Full-text search with bm25 scoring, exact-name boost, and path
    /// scoping. `match_query` must already be sanitized for the FTS
    /// dialect; an empty query returns no results.
    pub fn keyword_search(
        &self,
        match_query: &str,
        raw_query: &str,
        branch: &str,
        scope: &ScopeFilter,
        kinds: &[ContentKind],
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        if match_query.is_empty() {
            return Ok(Vec::new());
        }

        let (scope_sql, scope_params) = scope_clause(scope, "file_path");
        let kind_sql = if kinds.is_empty() {
            String::new()
        } else {
            format!(
                " AND content_type IN ({})",
                kinds
                    .iter()
                    .map(|k| format!("'{}'", k.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };

        let sql = format!(
            "SELECT content_id, content_type, file_path, name, bm25(fts_content) AS score
             FROM fts_content
             WHERE fts_content MATCH ? AND branch = ?{}{}
             ORDER BY score
             LIMIT ?",
            kind_sql, scope_sql
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;

        // Placeholders bind in textual order: match, branch, scope, limit
        let mut ordered: Vec<rusqlite::types::Value> = vec![
            match_query.to_string().into(),
            branch.to_string().into(),
        ];
        ordered.extend(scope_params.into_iter().map(rusqlite::types::Value::from));
        ordered.push((limit as i64).into());

        let needle = raw_query.trim().to_lowercase();
        let rows = stmt.query_map(params_from_iter(ordered), |row| {
            let content_type: String = row.get(1)?;
            let bm25: f64 = row.get(4)?;
            let name: String = row.get(3)?;
            // bm25() is <= 0 with better matches more negative
            let mut score = -bm25;
            if !needle.is_empty() && name.to_lowercase() == needle {
                score *= 2.0;
            }
            Ok(KeywordHit {
                content_id: row.get(0)?,
                content_type: ContentKind::parse_name(&content_type),
                file_path: row.get(2)?,
                name,
                score,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        // Exact-name boost can reorder; re-sort on the boosted score
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }
}

// ============================================================================
// TESTS
// ============================================================================
