//! Query Orchestrator
//!
//! The smart-query pipeline: parse options, size the candidate pool
//! adaptively, run the vector and keyword channels concurrently with
//! path scoping at the store level, fuse with RRF, hydrate, optionally
//! rerank, graph-expand the top hits, assemble a token-budgeted
//! context, and score confidence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::embeddings::{Embedder, InputType};
use crate::model::{
    ContentKind, Granularity, QueryMetadata, QueryOptions, QueryResult, RerankMode, ScopeFilter,
    Symbol,
};
use crate::storage::{KeywordHit, Store, StoreError};

use super::confidence::compute_confidence;
use super::context::build_context;
use super::fusion::{overlap_count, reciprocal_rank_fusion, RRF_K};
use super::graph::GraphExpander;
use super::keyword::sanitize_match_query;
use super::rerank::{rerank, RerankCandidate};
use super::vector::VectorSearcher;

/// Base candidate limit before adaptation
const BASE_LIMIT: f32 = 20.0;
/// Bounds of the adaptive limit
const MIN_LIMIT: usize = 10;
const MAX_LIMIT: usize = 75;
/// Seeds handed to graph expansion
const EXPANSION_SEEDS: usize = 5;

/// Query pipeline error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Query task failed: {0}")]
    Task(String),
}

/// Compute the adaptive per-query candidate limit
pub fn adaptive_limit(query_text: Option<&str>, scope: &ScopeFilter, max_tokens: usize) -> usize {
    let mut limit = BASE_LIMIT;

    let words = query_text
        .map(|t| t.split_whitespace().count())
        .unwrap_or(0);
    if words > 0 && words <= 2 {
        limit *= 0.75;
    } else if words >= 6 {
        limit *= 1.5;
    }

    if scope.is_active() {
        limit *= 1.25;
    }

    if max_tokens > crate::model::DEFAULT_MAX_TOKENS {
        let ratio = (max_tokens as f32 / crate::model::DEFAULT_MAX_TOKENS as f32).min(2.0);
        limit *= ratio.sqrt();
    }

    (limit.round() as usize).clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Stateless query engine over a store and an embedder
pub struct QueryEngine {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
}

impl QueryEngine {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Run the full smart-query pipeline
    pub async fn query(&self, options: QueryOptions) -> Result<QueryResult, QueryError> {
        let started = Instant::now();

        // Query embedding: compute from text unless supplied. Embedding
        // failure degrades to keyword-only rather than failing the query.
        let mut embedding = options.embedding.clone();
        if embedding.is_none() {
            if let Some(text) = options.query_text.as_deref().filter(|t| !t.trim().is_empty()) {
                match self.embedder.embed(text, InputType::Query).await {
                    Ok(vector) => embedding = Some(vector),
                    Err(e) => {
                        tracing::warn!("Query embedding failed, keyword-only retrieval: {}", e);
                    }
                }
            }
        }

        let has_text = options
            .query_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if embedding.is_none() && !has_text {
            return Ok(QueryResult::empty("no query signal provided"));
        }

        let candidate_limit = adaptive_limit(
            options.query_text.as_deref(),
            &options.scope,
            options.max_tokens,
        );

        // Vector and keyword channels issue concurrently and join
        let retrieval_started = Instant::now();
        let (vector_hits, keyword_hits) = {
            let store_v = Arc::clone(&self.store);
            let store_k = Arc::clone(&self.store);
            let branch_v = options.branch.clone();
            let branch_k = options.branch.clone();
            let scope_v = options.scope.clone();
            let scope_k = options.scope.clone();
            let granularity = options.granularity;
            let query_vec = embedding.clone();
            let query_text = options.query_text.clone().unwrap_or_default();

            let vector_task = tokio::task::spawn_blocking(move || {
                let Some(query) = query_vec else {
                    return Ok(Vec::new());
                };
                let searcher = VectorSearcher::load(&store_v, &branch_v, granularity)?;
                searcher.search(&query, candidate_limit, &scope_v)
            });
            let keyword_task = tokio::task::spawn_blocking(move || {
                let match_query = sanitize_match_query(&query_text);
                if match_query.is_empty() {
                    return Ok(Vec::new());
                }
                store_k.keyword_search(
                    &match_query,
                    &query_text,
                    &branch_k,
                    &scope_k,
                    granularity_kinds(granularity),
                    candidate_limit,
                )
            });

            let joined = async {
                let (vector_joined, keyword_joined) = tokio::join!(vector_task, keyword_task);
                let vector = vector_joined.map_err(|e| QueryError::Task(e.to_string()))??;
                let keyword = keyword_joined.map_err(|e| QueryError::Task(e.to_string()))??;
                Ok::<_, QueryError>((vector, keyword))
            };

            // An expired deadline shortens retrieval; assembly still
            // runs over whatever the channels produced (here: nothing)
            match options.retrieval_timeout_ms {
                Some(ms) => {
                    match tokio::time::timeout(std::time::Duration::from_millis(ms), joined).await
                    {
                        Ok(result) => result?,
                        Err(_) => {
                            tracing::warn!("Retrieval deadline of {}ms expired", ms);
                            (Vec::new(), Vec::new())
                        }
                    }
                }
                None => joined.await?,
            }
        };
        let retrieval_ms = retrieval_started.elapsed().as_millis() as u64;

        // Project both channels onto symbol ids, then fuse by rank
        let mut vector_ids: Vec<String> = Vec::with_capacity(vector_hits.len());
        let mut seen_vector = HashSet::new();
        for hit in &vector_hits {
            let id = if hit.granularity == ContentKind::File {
                self.module_for_file(&hit.content_id, &options.branch)
            } else {
                Some(hit.content_id.clone())
            };
            if let Some(id) = id {
                if seen_vector.insert(id.clone()) {
                    vector_ids.push(id);
                }
            }
        }
        let keyword_ids = self.project_keyword_hits(&keyword_hits, &options.branch)?;
        let fused = reciprocal_rank_fusion(&vector_ids, &keyword_ids, RRF_K, 1.0, 1.0);

        // Hydrate in ranked order, dropping ids that no longer resolve
        let fused_ids: Vec<String> = fused.iter().map(|h| h.content_id.clone()).collect();
        let hydrated = self.store.get_symbols(&fused_ids, &options.branch)?;
        let mut symbols: Vec<Symbol> = fused
            .iter()
            .filter_map(|h| hydrated.get(&h.content_id).cloned())
            .filter(|s| {
                options.symbol_types.is_empty() || options.symbol_types.contains(&s.symbol_type)
            })
            .collect();

        // Optional rerank over the hydrated list
        let rerank_started = Instant::now();
        if options.rerank != RerankMode::None && has_text && !symbols.is_empty() {
            symbols = self.apply_rerank(&options, &fused, symbols);
        }
        let rerank_ms = rerank_started.elapsed().as_millis() as u64;

        // Graph expansion around the top hits
        let expansion_started = Instant::now();
        let seed_ids: Vec<String> = symbols
            .iter()
            .take(EXPANSION_SEEDS)
            .map(|s| s.id.clone())
            .collect();
        let expansion = GraphExpander::new(&self.store).expand(
            &seed_ids,
            &options.branch,
            options.graph_depth,
            options.max_fan_out,
            options.confidence_threshold,
        )?;
        let expansion_ms = expansion_started.elapsed().as_millis() as u64;

        let pack = build_context(&symbols, expansion.edges, options.max_tokens);
        let confidence = compute_confidence(
            vector_hits.len(),
            keyword_hits.len(),
            &fused,
            &pack.symbols_included,
        );

        Ok(QueryResult {
            context: pack.context,
            symbols: pack.symbols_included,
            edges: pack.edges,
            token_count: pack.token_count,
            confidence,
            metadata: QueryMetadata {
                candidate_limit,
                vector_hits: vector_hits.len(),
                keyword_hits: keyword_hits.len(),
                fused_overlap: overlap_count(&fused),
                retrieval_ms,
                rerank_ms,
                expansion_ms,
                total_ms: started.elapsed().as_millis() as u64,
                scope: options.scope.clone(),
            },
        })
    }

    /// Keyword hits carry chunk and file ids; project chunks onto
    /// their parent symbols, files onto their module symbols, and
    /// keep first-seen rank order.
    fn project_keyword_hits(
        &self,
        hits: &[KeywordHit],
        branch: &str,
    ) -> Result<Vec<String>, QueryError> {
        let chunk_ids: Vec<String> = hits
            .iter()
            .filter(|h| h.content_type == ContentKind::Chunk)
            .map(|h| h.content_id.clone())
            .collect();
        let parents = self.store.chunk_parents(&chunk_ids, branch)?;

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for hit in hits {
            let id = match hit.content_type {
                ContentKind::Symbol => Some(hit.content_id.clone()),
                ContentKind::Chunk => parents.get(&hit.content_id).cloned().flatten(),
                ContentKind::File => self.module_for_file(&hit.content_id, branch),
            };
            if let Some(id) = id {
                if seen.insert(id.clone()) {
                    ordered.push(id);
                }
            }
        }
        Ok(ordered)
    }

    /// The module symbol standing in for a whole-file hit
    fn module_for_file(&self, file_path: &str, branch: &str) -> Option<String> {
        self.store
            .get_symbols_by_file(file_path, branch)
            .ok()?
            .into_iter()
            .find(|s| s.symbol_type == crate::model::SymbolType::Module)
            .map(|s| s.id)
    }

    fn apply_rerank(
        &self,
        options: &QueryOptions,
        fused: &[super::fusion::FusedHit],
        symbols: Vec<Symbol>,
    ) -> Vec<Symbol> {
        let query = options.query_text.as_deref().unwrap_or_default();
        let candidates: Vec<RerankCandidate> = symbols
            .iter()
            .map(|s| RerankCandidate {
                id: s.id.clone(),
                initial_score: fused
                    .iter()
                    .find(|h| h.content_id == s.id)
                    .map(|h| h.score)
                    .unwrap_or(0.0),
                name: s.name.clone(),
                file_path: s.file_path.clone(),
                content: s.content.clone(),
                granularity: ContentKind::Symbol,
            })
            .collect();

        let reordered = rerank(options.rerank, query, &candidates);
        let by_id: std::collections::HashMap<String, Symbol> =
            symbols.into_iter().map(|s| (s.id.clone(), s)).collect();
        reordered
            .into_iter()
            .filter_map(|(id, _)| by_id.get(&id).cloned())
            .collect()
    }
}

fn granularity_kinds(granularity: Granularity) -> &'static [ContentKind] {
    match granularity {
        Granularity::Auto => &[],
        Granularity::Symbol => &[ContentKind::Symbol],
        Granularity::Chunk => &[ContentKind::Chunk],
        Granularity::File => &[ContentKind::File],
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::ident;
    use crate::model::{ConfidenceTier, SymbolType};
    use chrono::Utc;

    #[test]
    fn test_adaptive_limit_bounds() {
        let scope = ScopeFilter::default();
        // Short query shrinks the pool
        assert_eq!(adaptive_limit(Some("tax"), &scope, 8000), 15);
        // Long query grows it
        assert_eq!(
            adaptive_limit(Some("function that validates email addresses for users"), &scope, 8000),
            30
        );
        // Defaults
        assert_eq!(adaptive_limit(Some("three word query"), &scope, 8000), 20);
    }

    #[test]
    fn test_adaptive_limit_scope_and_tokens() {
        let scoped = ScopeFilter {
            path_prefix: Some("src/".to_string()),
            file_patterns: vec![],
        };
        assert_eq!(adaptive_limit(Some("three word query"), &scoped, 8000), 25);

        // Doubled budget multiplies by sqrt(2)
        let wide = adaptive_limit(Some("three word query"), &ScopeFilter::default(), 16_000);
        assert_eq!(wide, 28);
    }

    #[test]
    fn test_adaptive_limit_always_in_range() {
        for words in 0..12 {
            let text = vec!["word"; words].join(" ");
            for tokens in [100, 8000, 64_000] {
                let limit = adaptive_limit(
                    if words == 0 { None } else { Some(&text) },
                    &ScopeFilter::default(),
                    tokens,
                );
                assert!((MIN_LIMIT..=MAX_LIMIT).contains(&limit));
            }
        }
    }

    async fn seeded_engine() -> (tempfile::TempDir, QueryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("index.db"), "hash-v1").unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));

        for (name, file, content) in [
            (
                "validateEmail",
                "src/validators.ts",
                "function validateEmail(email) { return email.includes('@'); }",
            ),
            (
                "createUser",
                "src/users.ts",
                "function createUser(email, name) { return { email, name }; }",
            ),
        ] {
            let qualified = format!("{}.{}", ident::qualified_path(file), name);
            let symbol = Symbol {
                id: ident::symbol_id(&qualified, None, "typescript"),
                name: name.to_string(),
                qualified_name: qualified,
                symbol_type: SymbolType::Function,
                language: "typescript".to_string(),
                file_path: file.to_string(),
                start_line: 1,
                end_line: 1,
                content_hash: ident::content_hash(content),
                content: content.to_string(),
                signature: None,
                docstring: None,
                is_external: false,
                branch: "main".to_string(),
                embedding_model_id: None,
                updated_at: Utc::now(),
                revision_id: 1,
            };
            store.upsert_symbol(&symbol).unwrap();
            store
                .fts_replace_file(
                    file,
                    "main",
                    &[(
                        symbol.id.clone(),
                        ContentKind::Symbol,
                        name.to_string(),
                        content.to_string(),
                    )],
                )
                .unwrap();
            let vector = embedder.embed(content, InputType::Document).await.unwrap();
            store
                .upsert_vectors(&[(symbol.id.clone(), ContentKind::Symbol, vector)])
                .unwrap();
        }

        (dir, QueryEngine::new(store, embedder))
    }

    #[tokio::test]
    async fn test_query_finds_relevant_symbol() {
        let (_dir, engine) = seeded_engine().await;
        let result = engine
            .query(QueryOptions::text("function that validates email addresses"))
            .await
            .unwrap();

        assert!(result.context.contains("validateEmail"));
        assert!(result.token_count > 0);
        assert!(result.token_count <= 8000);
        assert_ne!(result.confidence.tier, ConfidenceTier::Degraded);
        assert!(result.metadata.vector_hits > 0);
        assert!(result.metadata.candidate_limit >= 10);
    }

    #[tokio::test]
    async fn test_query_without_signal_is_degraded() {
        let (_dir, engine) = seeded_engine().await;
        let result = engine.query(QueryOptions::default()).await.unwrap();
        assert_eq!(result.confidence.tier, ConfidenceTier::Degraded);
        assert!(result.symbols.is_empty());
    }

    #[tokio::test]
    async fn test_query_honors_path_scope() {
        let (_dir, engine) = seeded_engine().await;
        let options = QueryOptions::text("email").with_path_prefix("src/users");
        let result = engine.query(options).await.unwrap();
        assert!(result
            .symbols
            .iter()
            .all(|s| s.file_path.starts_with("src/users")));
    }

    #[tokio::test]
    async fn test_fts_operator_injection_is_harmless() {
        let (_dir, engine) = seeded_engine().await;
        let result = engine
            .query(QueryOptions::text("createUser AND validateEmail"))
            .await
            .unwrap();
        // AND is dropped by sanitization; both terms still match
        assert!(!result.symbols.is_empty());
    }

    #[tokio::test]
    async fn test_symbol_type_filter() {
        let (_dir, engine) = seeded_engine().await;
        let options = QueryOptions::text("email")
            .with_symbol_types(vec![SymbolType::Class]);
        let result = engine.query(options).await.unwrap();
        assert!(result.symbols.is_empty());
    }
}
