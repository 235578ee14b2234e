//! Indexing Module
//!
//! The `IndexManager` owns the store, the embedder, the merkle/mtime
//! cache, and the extractor registry, and drives content-addressed
//! incremental indexing: per-file extraction, chunking, edge
//! inference, keyword rows, and batch embeddings. One refresh or
//! rebuild runs at a time; concurrent calls get a busy error.

mod cache;

pub use cache::{FileFingerprint, MerkleCache};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;

use crate::config::{ConfigError, IndexConfig};
use crate::embeddings::{
    BatchConfig, BatchItem, BatchProcessor, Embedder, EmbeddingCache,
};
use crate::extract::{AdapterRegistry, Chunker, EdgeInferencer, InferenceContext};
use crate::ident::{content_hash, qualified_path, symbol_id};
use crate::model::{
    ContentKind, FileContent, FileRecord, FileStatus, RawSymbol, Symbol, SymbolType,
};
use crate::repomap;
use crate::storage::{Store, StoreError};

/// Minimum confidence for inferred edges to be persisted
const EDGE_CONFIDENCE_FLOOR: f32 = 0.25;

// ============================================================================
// ERRORS & OUTCOMES
// ============================================================================

/// Indexing error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// A refresh or rebuild is already running
    #[error("Index busy: a refresh or rebuild is already in progress")]
    Busy,
}

/// Index lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Indexing,
    Ready,
    /// Indexed with per-file failures
    Partial,
    Error,
}

/// Result of a refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Index statistics for the status operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub lifecycle: Lifecycle,
    pub branch: String,
    pub total_files: i64,
    pub indexed_files: i64,
    pub error_files: i64,
    pub total_symbols: i64,
    pub total_edges: i64,
    pub total_chunks: i64,
    pub total_vectors: i64,
    pub embedding_model: String,
    pub fts_tokenizer: String,
}

// ============================================================================
// MANAGER
// ============================================================================

struct ScannedFile {
    rel: String,
    abs: PathBuf,
    mtime: i64,
    size: u64,
}

/// Owns the indexing pipeline for one workspace
pub struct IndexManager {
    root: PathBuf,
    config: IndexConfig,
    store: Arc<Store>,
    cache: MerkleCache,
    registry: AdapterRegistry,
    chunker: Chunker,
    batch: BatchProcessor,
    branch: String,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes refresh/rebuild
    scan_guard: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl IndexManager {
    pub fn new(
        root: &Path,
        config: IndexConfig,
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let branch = detect_branch(root);
        let cache = MerkleCache::load(&config.cache_path);
        let registry = AdapterRegistry::with_languages(&config.languages);
        let batch = BatchProcessor::new(
            Arc::clone(&embedder),
            Arc::new(EmbeddingCache::default()),
            BatchConfig::default(),
        );

        Self {
            root: root.to_path_buf(),
            config,
            store,
            cache,
            registry,
            chunker: Chunker::default(),
            batch,
            branch,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            scan_guard: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Branch all rows are written under
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Mark the manager ready if the store already holds an index
    pub fn initialize(&self) -> Result<(), IndexError> {
        if self.store.count_files(&self.branch)? > 0 {
            self.set_lifecycle(Lifecycle::Ready);
        }
        Ok(())
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        if let Ok(mut guard) = self.lifecycle.lock() {
            *guard = lifecycle;
        }
    }

    /// Index the whole workspace (same scan as refresh; the first run
    /// sees every file as added)
    pub async fn index_all(&self) -> Result<RefreshOutcome, IndexError> {
        self.refresh().await
    }

    /// Incremental refresh: diff the workspace against the merkle
    /// cache and re-index only what changed
    pub async fn refresh(&self) -> Result<RefreshOutcome, IndexError> {
        if self
            .scan_guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexError::Busy);
        }
        let result = self.refresh_inner().await;
        self.scan_guard.store(false, Ordering::SeqCst);
        result
    }

    async fn refresh_inner(&self) -> Result<RefreshOutcome, IndexError> {
        self.set_lifecycle(Lifecycle::Indexing);
        let scanned = self.scan_workspace()?;

        let mut outcome = RefreshOutcome::default();
        let mut changed_paths: Vec<String> = Vec::new();

        let scanned_set: HashSet<&str> = scanned.iter().map(|f| f.rel.as_str()).collect();

        for file in &scanned {
            let known = self.cache.get(&file.rel);
            let unchanged = known
                .as_ref()
                .is_some_and(|fp| fp.mtime == file.mtime && fp.size == file.size);
            if unchanged {
                continue;
            }
            let is_new = known.is_none();

            match self.index_scanned(file).await {
                Ok(true) => {
                    if is_new {
                        outcome.added += 1;
                    } else {
                        outcome.modified += 1;
                    }
                    changed_paths.push(file.rel.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    // Per-file failures never abort the batch
                    tracing::warn!("Indexing {} failed: {}", file.rel, e);
                    outcome.failed += 1;
                }
            }
        }

        // Deleted: cached paths the scan no longer sees
        for rel in self.cache.paths() {
            if !scanned_set.contains(rel.as_str()) {
                if let Err(e) = self.store.delete_file_rows(&rel, &self.branch) {
                    tracing::warn!("Purging {} failed: {}", rel, e);
                } else {
                    outcome.removed += 1;
                }
                self.cache.remove(&rel);
            }
        }

        // Second inference pass: imports between files indexed in this
        // same batch only resolve once both module symbols exist
        for rel in &changed_paths {
            if let Err(e) = self.reinfer(rel) {
                tracing::debug!("Inference pass for {} failed: {}", rel, e);
            }
        }

        if let Err(e) = self.cache.save() {
            tracing::warn!("Failed to persist merkle cache: {}", e);
        }

        self.set_lifecycle(if outcome.failed > 0 {
            Lifecycle::Partial
        } else {
            Lifecycle::Ready
        });
        tracing::info!(
            "Refresh complete: {} added, {} modified, {} removed, {} failed",
            outcome.added,
            outcome.modified,
            outcome.removed,
            outcome.failed
        );
        Ok(outcome)
    }

    /// Full rebuild: purge all rows, re-index from a fresh cache, and
    /// recompute the repo map
    pub async fn rebuild(&self) -> Result<RefreshOutcome, IndexError> {
        if self
            .scan_guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexError::Busy);
        }
        let result = self.rebuild_inner().await;
        self.scan_guard.store(false, Ordering::SeqCst);
        result
    }

    async fn rebuild_inner(&self) -> Result<RefreshOutcome, IndexError> {
        self.set_lifecycle(Lifecycle::Indexing);
        for file in self.store.list_files(&self.branch)? {
            self.store.delete_file_rows(&file.file_path, &self.branch)?;
        }
        self.store.clear_vectors()?;
        self.cache.clear();

        let outcome = self.refresh_inner().await?;
        self.compute_repo_map()?;
        Ok(outcome)
    }

    /// Recompute the PageRank-based repo map
    pub fn compute_repo_map(&self) -> Result<usize, IndexError> {
        let entries = repomap::compute_repo_map(&self.store, &self.branch)?;
        let count = entries.len();
        self.store.replace_repo_map(&entries, &self.branch)?;
        Ok(count)
    }

    /// Index a single file by path (absolute or workspace-relative).
    /// Returns whether anything changed.
    pub async fn index_file(&self, path: &Path) -> Result<bool, IndexError> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let rel = rel_path(&self.root, &abs);
        let meta = std::fs::metadata(&abs)?;
        let scanned = ScannedFile {
            rel,
            abs,
            mtime: system_mtime(&meta),
            size: meta.len(),
        };
        let changed = self.index_scanned(&scanned).await?;
        if changed {
            self.reinfer(&scanned.rel)?;
            if let Err(e) = self.cache.save() {
                tracing::warn!("Failed to persist merkle cache: {}", e);
            }
        }
        Ok(changed)
    }

    /// Current index statistics
    pub fn status(&self) -> Result<IndexStatus, IndexError> {
        let status_counts = self.store.file_status_counts(&self.branch)?;
        let lifecycle = self
            .lifecycle
            .lock()
            .map(|l| *l)
            .unwrap_or(Lifecycle::Error);
        Ok(IndexStatus {
            lifecycle,
            branch: self.branch.clone(),
            total_files: self.store.count_files(&self.branch)?,
            indexed_files: *status_counts.get("indexed").unwrap_or(&0),
            error_files: *status_counts.get("error").unwrap_or(&0),
            total_symbols: self.store.count_symbols(&self.branch)?,
            total_edges: self.store.count_edges(&self.branch)?,
            total_chunks: self.store.count_chunks(&self.branch)?,
            total_vectors: self.store.count_vectors()?,
            embedding_model: self.store.embedding_model_id().to_string(),
            fts_tokenizer: self.store.fts_tokenizer().to_string(),
        })
    }

    /// Approximate workspace size, for auto-refresh safeguards
    pub fn workspace_file_count(&self) -> Result<usize, IndexError> {
        Ok(self.scan_workspace()?.len())
    }

    // ========================================================================
    // PER-FILE PIPELINE
    // ========================================================================

    async fn index_scanned(&self, file: &ScannedFile) -> Result<bool, IndexError> {
        match self.index_scanned_inner(file).await {
            Ok(changed) => Ok(changed),
            Err(e) => {
                let _ = self.store.set_file_status(
                    &file.rel,
                    &self.branch,
                    FileStatus::Error,
                    Some(&e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn index_scanned_inner(&self, file: &ScannedFile) -> Result<bool, IndexError> {
        let Some(language) = self.registry.language_for_path(&file.rel) else {
            tracing::debug!("No adapter for {}, skipping", file.rel);
            return Ok(false);
        };
        let Some(adapter) = self.registry.for_path(&file.rel) else {
            return Ok(false);
        };

        let content = tokio::fs::read_to_string(&file.abs).await?;
        let file_hash = content_hash(&content);
        let external = self.config.index_external_deps && is_vendor_path(&file.rel);

        // Content-addressed short-circuit
        if let Some(existing) = self.store.get_file(&file.rel, &self.branch)? {
            if existing.file_hash == file_hash {
                self.cache.insert(
                    &file.rel,
                    FileFingerprint {
                        hash: file_hash,
                        mtime: file.mtime,
                        size: file.size,
                    },
                );
                return Ok(false);
            }
        }

        self.store.upsert_file(&FileRecord {
            file_path: file.rel.clone(),
            file_hash: file_hash.clone(),
            mtime: file.mtime,
            size: file.size,
            last_indexed: None,
            language: language.to_string(),
            branch: self.branch.clone(),
            status: FileStatus::Indexing,
            symbol_count: 0,
            importance_rank: None,
            error_message: None,
        })?;

        // Extract and assign canonical identity
        let raws = adapter.extract(&file.rel, &content);
        let extracted_count = raws.len() as u32;
        let symbols = self.to_symbols(&file.rel, language, &content, raws, external);

        // Rows from a previous revision that no longer exist
        let new_ids: HashSet<&str> = symbols.iter().map(|s| s.id.as_str()).collect();
        let stale: Vec<String> = self
            .store
            .get_symbols_by_file(&file.rel, &self.branch)?
            .into_iter()
            .filter(|s| !new_ids.contains(s.id.as_str()))
            .map(|s| s.id)
            .collect();
        self.store.delete_symbols_by_ids(&stale, &self.branch)?;

        self.store.upsert_symbols(&symbols)?;

        // Chunks are regenerated wholesale on re-index
        self.store.delete_chunks_by_file(&file.rel, &self.branch)?;
        let chunks = self
            .chunker
            .chunk_file(&file.rel, language, &self.branch, &content, &symbols);
        self.store.upsert_chunks(&chunks)?;

        self.store.upsert_file_content(&FileContent {
            file_path: file.rel.clone(),
            branch: self.branch.clone(),
            content: content.clone(),
            content_hash: file_hash.clone(),
            language: language.to_string(),
            updated_at: Utc::now(),
        })?;

        // Inference (LSP integration would slot in here; the text
        // backstop is what we ship)
        self.infer_edges(&file.rel, &content, language, &symbols)?;

        // Keyword rows for symbols, chunks, and the file itself
        let mut fts_rows: Vec<(String, ContentKind, String, String)> = Vec::new();
        for symbol in &symbols {
            fts_rows.push((
                symbol.id.clone(),
                ContentKind::Symbol,
                symbol.name.clone(),
                symbol.content.clone(),
            ));
        }
        for chunk in &chunks {
            fts_rows.push((
                chunk.id.clone(),
                ContentKind::Chunk,
                String::new(),
                chunk.content.clone(),
            ));
        }
        let file_name = file.rel.rsplit('/').next().unwrap_or(&file.rel).to_string();
        fts_rows.push((
            file.rel.clone(),
            ContentKind::File,
            file_name,
            content.clone(),
        ));
        self.store.fts_replace_file(&file.rel, &self.branch, &fts_rows)?;

        // Schedule embeddings through the batch processor
        let mut items: Vec<BatchItem> = symbols
            .iter()
            .filter(|s| !s.content.is_empty())
            .map(|s| BatchItem {
                id: s.id.clone(),
                text: s.content.clone(),
                granularity: ContentKind::Symbol,
            })
            .collect();
        items.extend(chunks.iter().map(|c| BatchItem {
            id: c.id.clone(),
            text: c.content.clone(),
            granularity: ContentKind::Chunk,
        }));
        items.push(BatchItem {
            id: file.rel.clone(),
            text: content.clone(),
            granularity: ContentKind::File,
        });

        let embedded = self
            .batch
            .process(items, Arc::clone(&self.cancel), None)
            .await;
        if embedded.failed > 0 {
            tracing::warn!(
                "{} embeddings failed for {}; retrieval stays keyword-complete",
                embedded.failed,
                file.rel
            );
        }
        self.store.upsert_vectors(&embedded.vectors)?;

        self.store.upsert_file(&FileRecord {
            file_path: file.rel.clone(),
            file_hash: file_hash.clone(),
            mtime: file.mtime,
            size: file.size,
            last_indexed: Some(Utc::now()),
            language: language.to_string(),
            branch: self.branch.clone(),
            status: FileStatus::Indexed,
            symbol_count: extracted_count,
            importance_rank: None,
            error_message: None,
        })?;

        self.cache.insert(
            &file.rel,
            FileFingerprint {
                hash: file_hash,
                mtime: file.mtime,
                size: file.size,
            },
        );
        Ok(true)
    }

    /// Raw symbols to persisted rows, plus a module symbol anchoring
    /// file-level edges. Vendor symbols keep their shape but carry no
    /// content.
    fn to_symbols(
        &self,
        rel: &str,
        language: &str,
        content: &str,
        raws: Vec<RawSymbol>,
        external: bool,
    ) -> Vec<Symbol> {
        let now = Utc::now();
        let line_count = content.lines().count().max(1) as u32;
        let stem = rel
            .rsplit('/')
            .next()
            .and_then(|f| f.split('.').next())
            .unwrap_or(rel);

        let mut symbols: Vec<Symbol> = Vec::with_capacity(raws.len() + 1);
        symbols.push(Symbol {
            id: symbol_id(&qualified_path(rel), None, language),
            name: stem.to_string(),
            qualified_name: qualified_path(rel),
            symbol_type: SymbolType::Module,
            language: language.to_string(),
            file_path: rel.to_string(),
            start_line: 1,
            end_line: line_count,
            content: String::new(),
            signature: None,
            docstring: None,
            // Modules carry no content; an empty hash exempts them
            // from context dedup
            content_hash: String::new(),
            is_external: false,
            branch: self.branch.clone(),
            embedding_model_id: None,
            updated_at: now,
            revision_id: 1,
        });

        for raw in raws {
            let body = if external { String::new() } else { raw.content };
            let hash = if body.is_empty() {
                String::new()
            } else {
                content_hash(&body)
            };
            symbols.push(Symbol {
                id: symbol_id(&raw.qualified_name, raw.signature.as_deref(), language),
                name: raw.name,
                qualified_name: raw.qualified_name,
                symbol_type: raw.symbol_type,
                language: language.to_string(),
                file_path: rel.to_string(),
                start_line: raw.start_line,
                end_line: raw.end_line,
                content: body,
                signature: raw.signature,
                docstring: raw.docstring,
                content_hash: hash,
                is_external: external,
                branch: self.branch.clone(),
                embedding_model_id: None,
                updated_at: now,
                revision_id: 1,
            });
        }
        symbols
    }

    fn infer_edges(
        &self,
        rel: &str,
        content: &str,
        language: &str,
        symbols: &[Symbol],
    ) -> Result<(), IndexError> {
        let ctx = StoreContext {
            store: &self.store,
            branch: &self.branch,
        };
        let inferencer = EdgeInferencer::new(EDGE_CONFIDENCE_FLOOR, &self.branch);
        let report = inferencer.infer_file(rel, content, language, symbols, &ctx);
        if report.dropped > 0 {
            tracing::debug!(
                "{}: {} inferred edges below confidence floor",
                rel,
                report.dropped
            );
        }
        self.store.upsert_edges(&report.edges)?;
        Ok(())
    }

    /// Re-run inference from stored content (used after batch indexing
    /// so cross-file imports resolve)
    fn reinfer(&self, rel: &str) -> Result<(), IndexError> {
        let Some(snapshot) = self.store.get_file_content(rel, &self.branch)? else {
            return Ok(());
        };
        let symbols = self.store.get_symbols_by_file(rel, &self.branch)?;
        self.infer_edges(rel, &snapshot.content, &snapshot.language, &symbols)
    }

    // ========================================================================
    // SCANNING
    // ========================================================================

    fn scan_workspace(&self) -> Result<Vec<ScannedFile>, IndexError> {
        let include = build_globset(&self.config.include_patterns)?;
        // Opting into external deps lifts only the vendor excludes
        let excludes: Vec<String> = if self.config.index_external_deps {
            self.config
                .exclude_patterns
                .iter()
                .filter(|p| !p.contains("node_modules") && !p.contains("vendor"))
                .cloned()
                .collect()
        } else {
            self.config.exclude_patterns.clone()
        };
        let exclude = build_globset(&excludes)?;

        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.root).standard_filters(true).build();
        for entry in walker {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let abs = entry.into_path();
            let rel = rel_path(&self.root, &abs);

            if !include.is_match(&rel) || exclude.is_match(&rel) {
                continue;
            }
            let Ok(meta) = std::fs::metadata(&abs) else {
                continue;
            };
            files.push(ScannedFile {
                rel,
                mtime: system_mtime(&meta),
                size: meta.len(),
                abs,
            });
        }
        files.sort_by(|a, b| a.rel.cmp(&b.rel));
        Ok(files)
    }
}

/// Inference lookups over the live store
struct StoreContext<'a> {
    store: &'a Store,
    branch: &'a str,
}

impl InferenceContext for StoreContext<'_> {
    fn symbols_named(&self, name: &str) -> Vec<Symbol> {
        self.store
            .find_symbols_by_name(name, self.branch, 8)
            .unwrap_or_default()
    }

    fn module_symbol(&self, file_path: &str) -> Option<Symbol> {
        self.store
            .get_symbols_by_file(file_path, self.branch)
            .ok()?
            .into_iter()
            .find(|s| s.symbol_type == SymbolType::Module)
    }

    fn indexed_paths(&self) -> Vec<String> {
        self.store
            .list_files(self.branch)
            .map(|files| files.into_iter().map(|f| f.file_path).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn build_globset(patterns: &[String]) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            IndexError::Config(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        IndexError::Config(ConfigError::InvalidPattern {
            pattern: String::new(),
            message: e.to_string(),
        })
    })
}

fn is_vendor_path(rel: &str) -> bool {
    rel.split('/').any(|c| c == "node_modules" || c == "vendor")
}

fn rel_path(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root)
        .unwrap_or(abs)
        .to_string_lossy()
        .replace('\\', "/")
}

fn system_mtime(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Active branch of the workspace's repository, `main` outside git
fn detect_branch(root: &Path) -> String {
    match git2::Repository::discover(root) {
        Ok(repo) => repo
            .head()
            .ok()
            .and_then(|head| head.shorthand().map(|s| s.to_string()))
            .unwrap_or_else(|| "main".to_string()),
        Err(_) => "main".to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    fn workspace() -> (tempfile::TempDir, IndexManager) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/validators.ts"),
            "export function validateEmail(email: string): boolean {\n  return email.includes('@');\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("src/users.ts"),
            "import { validateEmail } from './validators';\n\nexport function createUser(email: string, name: string) {\n  if (!validateEmail(email)) { throw new Error('bad email'); }\n  return { email, name };\n}\n",
        )
        .unwrap();

        let config = IndexConfig::default().rooted_at(dir.path());
        let store = Arc::new(Store::open(&config.db_path, "hash-v1").unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
        let manager = IndexManager::new(dir.path(), config, store, embedder);
        (dir, manager)
    }

    #[tokio::test]
    async fn test_initial_refresh_indexes_everything() {
        let (_dir, manager) = workspace();
        let outcome = manager.refresh().await.unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.modified, 0);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.failed, 0);

        let status = manager.status().unwrap();
        assert_eq!(status.lifecycle, Lifecycle::Ready);
        assert_eq!(status.total_files, 2);
        // Two functions plus two module symbols
        assert!(status.total_symbols >= 4);
        assert!(status.total_vectors > 0);
        assert_eq!(status.indexed_files, 2);
    }

    #[tokio::test]
    async fn test_second_refresh_is_noop() {
        let (_dir, manager) = workspace();
        manager.refresh().await.unwrap();
        let second = manager.refresh().await.unwrap();
        assert_eq!(second, RefreshOutcome::default());
    }

    #[tokio::test]
    async fn test_modified_file_reindexed() {
        let (dir, manager) = workspace();
        manager.refresh().await.unwrap();

        // Different length, so the stat-level fingerprint misses even
        // on filesystems with coarse mtime resolution
        std::fs::write(
            dir.path().join("src/validators.ts"),
            "export function validateEmail(email: string): boolean {\n  return /@/.test(email);\n}\nexport function validatePhone(p: string) {\n  return p.length > 6;\n}\n",
        )
        .unwrap();

        let outcome = manager.refresh().await.unwrap();
        assert_eq!(outcome.modified, 1);
        assert_eq!(outcome.added, 0);

        let symbols = manager
            .store
            .get_symbols_by_file("src/validators.ts", manager.branch())
            .unwrap();
        assert!(symbols.iter().any(|s| s.name == "validatePhone"));
    }

    #[tokio::test]
    async fn test_deleted_file_purged() {
        let (dir, manager) = workspace();
        manager.refresh().await.unwrap();

        std::fs::remove_file(dir.path().join("src/users.ts")).unwrap();
        let outcome = manager.refresh().await.unwrap();
        assert_eq!(outcome.removed, 1);

        assert!(manager
            .store
            .get_file("src/users.ts", manager.branch())
            .unwrap()
            .is_none());
        assert!(manager
            .store
            .get_symbols_by_file("src/users.ts", manager.branch())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cross_file_import_edge_resolves() {
        let (_dir, manager) = workspace();
        manager.refresh().await.unwrap();

        let users_module = manager
            .store
            .get_symbols_by_file("src/users.ts", manager.branch())
            .unwrap()
            .into_iter()
            .find(|s| s.symbol_type == SymbolType::Module)
            .unwrap();
        let edges = manager
            .store
            .edges_from(&[users_module.id], manager.branch())
            .unwrap();
        assert!(
            edges
                .iter()
                .any(|e| e.edge_type == crate::model::EdgeType::Imports),
            "expected an import edge from users.ts"
        );
    }

    #[tokio::test]
    async fn test_index_file_short_circuits_unchanged() {
        let (dir, manager) = workspace();
        manager.refresh().await.unwrap();

        let changed = manager
            .index_file(&dir.path().join("src/validators.ts"))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_busy_guard() {
        let (_dir, manager) = workspace();
        manager.scan_guard.store(true, Ordering::SeqCst);
        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, IndexError::Busy));
    }

    #[tokio::test]
    async fn test_external_deps_indexed_with_elided_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/leftpad")).unwrap();
        std::fs::write(
            dir.path().join("node_modules/leftpad/index.js"),
            "function leftPad(s, n) {\n  return s.padStart(n);\n}\n",
        )
        .unwrap();

        let config = IndexConfig {
            index_external_deps: true,
            ..IndexConfig::default()
        }
        .rooted_at(dir.path());
        let store = Arc::new(Store::open(&config.db_path, "hash-v1").unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
        let manager = IndexManager::new(dir.path(), config, store, embedder);

        manager.refresh().await.unwrap();
        let symbols = manager
            .store
            .get_symbols_by_file("node_modules/leftpad/index.js", manager.branch())
            .unwrap();
        let lp = symbols.iter().find(|s| s.name == "leftPad").unwrap();
        assert!(lp.is_external);
        assert!(lp.content.is_empty());
        assert!(lp.content_hash.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_recomputes_repo_map() {
        let (_dir, manager) = workspace();
        manager.rebuild().await.unwrap();
        let map = manager
            .store
            .get_repo_map(manager.branch(), 10, None)
            .unwrap();
        assert_eq!(map.len(), 2);
    }
}
