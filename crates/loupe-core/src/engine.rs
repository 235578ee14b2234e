//! Engine Facade
//!
//! Wires configuration, store, embedder, index manager, and query
//! engine into the stable command surface: smart query, symbol impact,
//! call graph, symbol search, repo map, status, refresh, rebuild.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::config::{ConfigError, IndexConfig};
use crate::embeddings::{Embedder, HashEmbedder};
use crate::impact::{ImpactAnalyzer, ImpactOutcome, DEFAULT_IMPACT_DEPTH};
use crate::index::{IndexError, IndexManager, IndexStatus, RefreshOutcome};
use crate::model::{
    Edge, QueryOptions, QueryResult, RepoMapEntry, RerankMode, Symbol, SymbolType,
};
use crate::retrieval::{Direction, GraphExpander, QueryEngine, QueryError, sanitize_match_query};
use crate::storage::{Store, StoreError};

/// Top-level error for the command surface
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LoupeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl LoupeError {
    /// CLI exit code: 2 config/usage, 3 store/migration, 4 index busy
    pub fn exit_code(&self) -> i32 {
        match self {
            LoupeError::Config(_) => 2,
            LoupeError::Index(IndexError::Busy) => 4,
            LoupeError::Index(IndexError::Config(_)) => 2,
            _ => 3,
        }
    }
}

/// One node of a call graph, grouped by hop distance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphNode {
    pub symbol_id: String,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub depth: usize,
}

/// Call-graph result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraph {
    pub root_id: String,
    pub root_qualified_name: String,
    pub nodes: Vec<CallGraphNode>,
    pub edges: Vec<Edge>,
}

/// Typed call-graph outcome
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CallGraphOutcome {
    Found(CallGraph),
    NotFound { query: String },
}

/// A ranked symbol-search hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSearchHit {
    pub symbol: Symbol,
    pub score: f64,
}

/// The engine facade owning all components for one workspace
pub struct Loupe {
    root: PathBuf,
    config: IndexConfig,
    store: Arc<Store>,
    manager: IndexManager,
    engine: QueryEngine,
    last_auto_refresh: Mutex<Option<Instant>>,
}

impl Loupe {
    /// Open a workspace, loading `loupe.toml` when present
    pub fn open(root: &Path) -> Result<Self, LoupeError> {
        let config = IndexConfig::load(&root.join("loupe.toml"))?.rooted_at(root);
        Self::with_config(root, config)
    }

    /// Open with an explicit configuration
    pub fn with_config(root: &Path, config: IndexConfig) -> Result<Self, LoupeError> {
        config.validate()?;
        let embedder = select_embedder(&config)?;
        let store = Arc::new(Store::open(&config.db_path, embedder.model_id())?);
        let manager = IndexManager::new(root, config.clone(), Arc::clone(&store), Arc::clone(&embedder));
        manager.initialize()?;
        let engine = QueryEngine::new(Arc::clone(&store), embedder);

        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            manager,
            engine,
            last_auto_refresh: Mutex::new(None),
        })
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Branch the index is bound to
    pub fn branch(&self) -> &str {
        self.manager.branch()
    }

    /// Direct store access for advanced callers
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Query options pre-filled with the configured defaults and the
    /// active branch
    pub fn default_query(&self, query_text: impl Into<String>) -> QueryOptions {
        let defaults = &self.config.default_query_options;
        QueryOptions {
            query_text: Some(query_text.into()),
            branch: self.manager.branch().to_string(),
            max_tokens: defaults.max_tokens,
            graph_depth: defaults.graph_depth,
            max_fan_out: defaults.max_fan_out,
            confidence_threshold: defaults.confidence_threshold,
            rerank: RerankMode::parse_name(&defaults.rerank),
            ..Default::default()
        }
    }

    /// Hybrid-retrieval smart query with an optional opportunistic
    /// refresh beforehand
    pub async fn smart_query(&self, options: QueryOptions) -> Result<QueryResult, LoupeError> {
        self.maybe_auto_refresh().await;
        Ok(self.engine.query(options).await?)
    }

    async fn maybe_auto_refresh(&self) {
        if !self.config.auto_refresh {
            return;
        }
        let due = {
            let guard = self.last_auto_refresh.lock();
            match guard {
                Ok(last) => last
                    .map(|t| t.elapsed().as_millis() as u64 >= self.config.auto_refresh_cooldown_ms)
                    .unwrap_or(true),
                Err(_) => false,
            }
        };
        if !due {
            return;
        }

        match self.manager.workspace_file_count() {
            Ok(count) if count > self.config.auto_refresh_max_files => {
                tracing::debug!(
                    "Auto-refresh skipped: {} files exceeds the {}-file safeguard",
                    count,
                    self.config.auto_refresh_max_files
                );
            }
            Ok(_) => match self.manager.refresh().await {
                Ok(_) | Err(IndexError::Busy) => {}
                Err(e) => tracing::warn!("Auto-refresh failed: {}", e),
            },
            Err(e) => tracing::warn!("Auto-refresh scan failed: {}", e),
        }
        if let Ok(mut guard) = self.last_auto_refresh.lock() {
            *guard = Some(Instant::now());
        }
    }

    /// Incremental refresh
    pub async fn refresh(&self) -> Result<RefreshOutcome, LoupeError> {
        Ok(self.manager.refresh().await?)
    }

    /// Full rebuild including the repo map
    pub async fn rebuild(&self) -> Result<RefreshOutcome, LoupeError> {
        Ok(self.manager.rebuild().await?)
    }

    /// Index statistics
    pub fn status(&self) -> Result<IndexStatus, LoupeError> {
        Ok(self.manager.status()?)
    }

    /// Reverse-dependency impact analysis
    pub fn symbol_impact(
        &self,
        symbol_ref: &str,
        max_depth: Option<usize>,
    ) -> Result<ImpactOutcome, LoupeError> {
        Ok(ImpactAnalyzer::new(&self.store).analyze(
            symbol_ref,
            self.manager.branch(),
            max_depth.unwrap_or(DEFAULT_IMPACT_DEPTH),
        )?)
    }

    /// Call graph around a symbol, grouped by hop depth
    pub fn call_graph(
        &self,
        symbol_ref: &str,
        direction: Direction,
        depth: usize,
        max_fan_out: usize,
    ) -> Result<CallGraphOutcome, LoupeError> {
        let branch = self.manager.branch();
        let Some(root) = self
            .store
            .find_symbols_by_name(symbol_ref, branch, 1)?
            .into_iter()
            .next()
        else {
            return Ok(CallGraphOutcome::NotFound {
                query: symbol_ref.to_string(),
            });
        };

        let expansion = GraphExpander::new(&self.store).expand_directed(
            &[root.id.clone()],
            branch,
            depth,
            max_fan_out,
            self.config.default_query_options.confidence_threshold,
            direction,
        )?;

        let mut nodes = vec![CallGraphNode {
            symbol_id: root.id.clone(),
            name: root.name.clone(),
            qualified_name: root.qualified_name.clone(),
            file_path: root.file_path.clone(),
            depth: 0,
        }];
        for symbol in &expansion.symbols {
            nodes.push(CallGraphNode {
                symbol_id: symbol.id.clone(),
                name: symbol.name.clone(),
                qualified_name: symbol.qualified_name.clone(),
                file_path: symbol.file_path.clone(),
                depth: expansion.depths.get(&symbol.id).copied().unwrap_or(0),
            });
        }
        nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));

        Ok(CallGraphOutcome::Found(CallGraph {
            root_id: root.id,
            root_qualified_name: root.qualified_name,
            nodes,
            edges: expansion.edges,
        }))
    }

    /// Ranked keyword search over symbols only
    pub fn symbol_search(
        &self,
        query: &str,
        limit: usize,
        symbol_type: Option<SymbolType>,
    ) -> Result<Vec<SymbolSearchHit>, LoupeError> {
        let branch = self.manager.branch();
        let match_query = sanitize_match_query(query);
        let hits = if match_query.is_empty() {
            Vec::new()
        } else {
            self.store.keyword_search(
                &match_query,
                query,
                branch,
                &Default::default(),
                &[crate::model::ContentKind::Symbol],
                limit.max(1) * 2,
            )?
        };

        let ids: Vec<String> = hits.iter().map(|h| h.content_id.clone()).collect();
        let hydrated = self.store.get_symbols(&ids, branch)?;

        let mut results: Vec<SymbolSearchHit> = hits
            .iter()
            .filter_map(|h| hydrated.get(&h.content_id).cloned().map(|s| (s, h.score)))
            .filter(|(s, _)| symbol_type.is_none_or(|t| s.symbol_type == t))
            .map(|(symbol, score)| SymbolSearchHit { symbol, score })
            .collect();

        // Exact name lookup backstops an unproductive keyword pass
        if results.is_empty() {
            results = self
                .store
                .find_symbols_by_name(query, branch, limit)?
                .into_iter()
                .filter(|s| symbol_type.is_none_or(|t| s.symbol_type == t))
                .map(|symbol| SymbolSearchHit { symbol, score: 0.0 })
                .collect();
        }

        results.truncate(limit.max(1));
        Ok(results)
    }

    /// Ranked repo map, computed on demand when absent
    pub fn repo_map(
        &self,
        limit: usize,
        directory: Option<&str>,
    ) -> Result<Vec<RepoMapEntry>, LoupeError> {
        let branch = self.manager.branch();
        let mut entries = self.store.get_repo_map(branch, limit, directory)?;
        if entries.is_empty() && self.store.count_files(branch)? > 0 {
            self.manager.compute_repo_map()?;
            entries = self.store.get_repo_map(branch, limit, directory)?;
        }
        Ok(entries)
    }
}

/// Choose the embedder from configuration. Unknown models are a config
/// error; the hash embedder is the explicit offline default.
fn select_embedder(config: &IndexConfig) -> Result<Arc<dyn Embedder>, ConfigError> {
    let model = config.embedding_model.as_str();

    if model == crate::embeddings::HASH_MODEL_ID {
        return Ok(Arc::new(HashEmbedder::new(config.embedding_dimensions)));
    }

    #[cfg(feature = "embeddings")]
    if model == "all-MiniLM-L6-v2" {
        return Ok(Arc::new(crate::embeddings::LocalEmbedder::new(
            config.embedding_dimensions,
        )));
    }

    #[cfg(feature = "remote-embeddings")]
    if let Some(remote_model) = model.strip_prefix("remote:") {
        return Ok(Arc::new(crate::embeddings::RemoteEmbedder::new(
            remote_model,
            config.embedding_dimensions,
            None,
        )?));
    }

    Err(ConfigError::UnknownEmbeddingModel(model.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, Loupe) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("auth-controller.ts"),
            "export function login(user: string) {\n  return session(user);\n}\nexport function signup(user: string) {\n  return createAccount(user);\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("user-service.ts"),
            "export function profile(user: string) {\n  return { user };\n}\n",
        )
        .unwrap();
        let loupe = Loupe::open(dir.path()).unwrap();
        (dir, loupe)
    }

    #[tokio::test]
    async fn test_open_refresh_and_query() {
        let (_dir, loupe) = workspace();
        let outcome = loupe.refresh().await.unwrap();
        assert_eq!(outcome.added, 2);

        let result = loupe.smart_query(loupe.default_query("login")).await.unwrap();
        assert!(result.context.contains("login"));
    }

    #[tokio::test]
    async fn test_file_pattern_scope() {
        let (_dir, loupe) = workspace();
        loupe.refresh().await.unwrap();

        let options = loupe
            .default_query("login signup")
            .with_file_patterns(vec!["auth-*".to_string()]);
        let result = loupe.smart_query(options).await.unwrap();
        assert!(!result.symbols.is_empty());
        assert!(result.symbols.iter().all(|s| s.file_path.starts_with("auth-")));
    }

    #[tokio::test]
    async fn test_symbol_search_and_status() {
        let (_dir, loupe) = workspace();
        loupe.refresh().await.unwrap();

        let hits = loupe.symbol_search("login", 5, None).unwrap();
        assert!(hits.iter().any(|h| h.symbol.name == "login"));

        let status = loupe.status().unwrap();
        assert_eq!(status.total_files, 2);
    }

    #[tokio::test]
    async fn test_call_graph_not_found_is_typed() {
        let (_dir, loupe) = workspace();
        loupe.refresh().await.unwrap();
        let outcome = loupe
            .call_graph("doesNotExist", Direction::Both, 2, 10)
            .unwrap();
        assert!(matches!(outcome, CallGraphOutcome::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_repo_map_computed_on_demand() {
        let (_dir, loupe) = workspace();
        loupe.refresh().await.unwrap();
        let map = loupe.repo_map(10, None).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_unknown_embedding_model_rejected() {
        let config = IndexConfig {
            embedding_model: "made-up-model".to_string(),
            ..Default::default()
        };
        assert!(select_embedder(&config).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LoupeError::Index(IndexError::Busy).exit_code(), 4);
        assert_eq!(
            LoupeError::Config(ConfigError::UnknownLanguage("x".into())).exit_code(),
            2
        );
    }
}
