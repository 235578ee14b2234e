//! Vector Search
//!
//! Dense retrieval over the persisted vector table. Preferred backend
//! is a USearch HNSW index built from the stored rows; without the
//! `vector-search` feature an in-process cosine scan serves the same
//! contract. Both paths apply the minimum-similarity gate, path
//! scoping after the top-K match (with over-fetch), and chunk-to-symbol
//! projection with best-similarity dedup.

use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::embeddings::cosine_similarity;
use crate::model::{ContentKind, Granularity, ScopeFilter};
use crate::storage::{Result, Store, StoreError, VectorRow};

/// Minimum similarity kept in retrieval output. Tuned for code
/// embeddings; natural-language corpora would gate higher.
pub const MIN_SIMILARITY: f32 = 0.25;

/// Over-fetch factor applied when path filters are active, so that
/// filtering after the top-K match does not starve the result set
const FILTER_OVERFETCH: usize = 3;

/// A dense-retrieval hit, projected onto its parent symbol when the
/// underlying row was a chunk
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub content_id: String,
    pub similarity: f32,
    pub granularity: ContentKind,
    pub file_path: String,
}

/// Path predicate compiled from a scope filter
struct ScopeMatcher {
    prefix: Option<String>,
    patterns: Option<GlobSet>,
}

impl ScopeMatcher {
    fn compile(scope: &ScopeFilter) -> Result<Self> {
        let patterns = if scope.file_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &scope.file_patterns {
                let glob = Glob::new(pattern)
                    .map_err(|e| StoreError::Init(format!("Invalid pattern '{}': {}", pattern, e)))?;
                builder.add(glob);
            }
            Some(
                builder
                    .build()
                    .map_err(|e| StoreError::Init(format!("Pattern set failed: {}", e)))?,
            )
        };
        Ok(Self {
            prefix: scope.path_prefix.clone(),
            patterns,
        })
    }

    fn matches(&self, file_path: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !file_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(set) = &self.patterns {
            if !set.is_match(file_path) {
                return false;
            }
        }
        true
    }
}

/// Vector searcher over one branch's stored vectors
pub struct VectorSearcher {
    rows: Vec<VectorRow>,
    #[cfg(feature = "vector-search")]
    index: Option<usearch::Index>,
}

impl VectorSearcher {
    /// Load vectors for a branch; `granularity` restricts which rows
    /// participate (Auto searches all granularities).
    pub fn load(store: &Store, branch: &str, granularity: Granularity) -> Result<Self> {
        let kind = match granularity {
            Granularity::Auto => None,
            Granularity::Symbol => Some(ContentKind::Symbol),
            Granularity::Chunk => Some(ContentKind::Chunk),
            Granularity::File => Some(ContentKind::File),
        };
        // Orphaned vectors (content gone from the branch) drop out here
        let rows: Vec<VectorRow> = store
            .vector_candidates(branch, kind)?
            .into_iter()
            .filter(|r| r.file_path.is_some())
            .collect();

        #[cfg(feature = "vector-search")]
        let index = Self::build_index(&rows);

        Ok(Self {
            rows,
            #[cfg(feature = "vector-search")]
            index,
        })
    }

    #[cfg(feature = "vector-search")]
    fn build_index(rows: &[VectorRow]) -> Option<usearch::Index> {
        let dimensions = rows.first()?.embedding.len();
        if dimensions == 0 {
            return None;
        }
        let options = usearch::IndexOptions {
            dimensions,
            metric: usearch::MetricKind::Cos,
            quantization: usearch::ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        let index = match usearch::Index::new(&options) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("HNSW index unavailable, using cosine scan: {}", e);
                return None;
            }
        };
        if index.reserve(rows.len()).is_err() {
            return None;
        }
        for (key, row) in rows.iter().enumerate() {
            if row.embedding.len() != dimensions {
                continue;
            }
            if let Err(e) = index.add(key as u64, &row.embedding) {
                tracing::warn!("Failed to index vector for {}: {}", row.content_id, e);
            }
        }
        Some(index)
    }

    /// Loaded row count
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Top-K by cosine similarity with the minimum-similarity gate and
    /// path scoping applied after the match
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<VectorHit>> {
        if self.rows.is_empty() || query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let matcher = ScopeMatcher::compile(scope)?;
        // Path filters apply after the top-K match; over-fetch so the
        // LIMIT does not prune rows the WHERE would have kept
        let fetch = if scope.is_active() {
            limit * FILTER_OVERFETCH
        } else {
            limit
        };

        let scored = self.top_k(query, fetch);

        let mut best: HashMap<String, VectorHit> = HashMap::new();
        for (row_idx, similarity) in scored {
            if similarity < MIN_SIMILARITY {
                continue;
            }
            let row = &self.rows[row_idx];
            let Some(file_path) = row.file_path.as_deref() else {
                continue;
            };
            if !matcher.matches(file_path) {
                continue;
            }

            // Chunk hits project onto their parent symbol when known
            let (content_id, granularity) = match (&row.granularity, &row.parent_symbol_id) {
                (ContentKind::Chunk, Some(parent)) => (parent.clone(), ContentKind::Symbol),
                _ => (row.content_id.clone(), row.granularity),
            };

            let keep_existing = best
                .get(&content_id)
                .is_some_and(|existing| existing.similarity >= similarity);
            if !keep_existing {
                best.insert(
                    content_id.clone(),
                    VectorHit {
                        content_id,
                        similarity,
                        granularity,
                        file_path: file_path.to_string(),
                    },
                );
            }
        }

        let mut hits: Vec<VectorHit> = best.into_values().collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Raw top-K `(row index, similarity)` pairs
    fn top_k(&self, query: &[f32], fetch: usize) -> Vec<(usize, f32)> {
        #[cfg(feature = "vector-search")]
        if let Some(index) = &self.index {
            if let Ok(results) = index.search(query, fetch) {
                return results
                    .keys
                    .iter()
                    .zip(results.distances.iter())
                    .map(|(key, distance)| {
                        // Cosine distance back to similarity, clamped
                        // into the contract range
                        (*key as usize, (1.0 - distance).clamp(0.0, 1.0))
                    })
                    .collect();
            }
            tracing::warn!("HNSW search failed, falling back to cosine scan");
        }

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                (
                    idx,
                    cosine_similarity(query, &row.embedding).clamp(0.0, 1.0),
                )
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(fetch);
        scored
    }
}

// ============================================================================
// TESTS
// ============================================================================
