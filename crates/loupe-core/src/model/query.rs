//! Query options, results, and confidence diagnostics

use serde::{Deserialize, Serialize};

use super::{Edge, Symbol, SymbolType};

// ============================================================================
// OPTIONS
// ============================================================================

/// Reranking strategy applied to the fused candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RerankMode {
    /// Identity - keep the fused order
    #[default]
    None,
    /// Cheap lexical boosts over normalized initial scores
    Heuristic,
    /// BM25 against the query text, blended with the initial score
    Bm25,
    /// External cross-encoder; falls back to identity on failure
    CrossEncoder,
}

impl RerankMode {
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "heuristic" => RerankMode::Heuristic,
            "bm25" => RerankMode::Bm25,
            "cross-encoder" | "cross_encoder" => RerankMode::CrossEncoder,
            _ => RerankMode::None,
        }
    }
}

/// Retrieval granularity selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Search all granularities, project chunk/file hits onto symbols
    #[default]
    Auto,
    Symbol,
    Chunk,
    File,
}

/// Path restriction applied at the store level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeFilter {
    /// Literal path prefix; results must start with it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    /// Glob patterns; results must match at least one
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub file_patterns: Vec<String>,
}

impl ScopeFilter {
    /// Whether any restriction is active
    pub fn is_active(&self) -> bool {
        self.path_prefix.is_some() || !self.file_patterns.is_empty()
    }
}

/// Options for a smart query
///
/// Built with defaults and adjusted through the builder methods; an
/// immutable record once handed to the query engine.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Natural-language or keyword query text
    pub query_text: Option<String>,
    /// Pre-computed query embedding; computed from `query_text` when absent
    pub embedding: Option<Vec<f32>>,
    /// Branch to search
    pub branch: String,
    /// Token budget for the context pack
    pub max_tokens: usize,
    /// Graph expansion depth (hard cap 3)
    pub graph_depth: usize,
    /// Maximum edges followed per node during expansion
    pub max_fan_out: usize,
    /// Minimum edge confidence followed during expansion
    pub confidence_threshold: f32,
    /// Reranking strategy
    pub rerank: RerankMode,
    /// Retrieval granularity
    pub granularity: Granularity,
    /// Path scoping
    pub scope: ScopeFilter,
    /// Restrict hydrated results to these symbol kinds (empty = all)
    pub symbol_types: Vec<SymbolType>,
    /// Optional retrieval deadline in milliseconds. On expiry the
    /// channels return what they have; assembly still completes.
    pub retrieval_timeout_ms: Option<u64>,
}

/// Default token budget; the adaptive limit scales against this
pub const DEFAULT_MAX_TOKENS: usize = 8000;

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            query_text: None,
            embedding: None,
            branch: "main".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            graph_depth: 2,
            max_fan_out: 10,
            confidence_threshold: 0.5,
            rerank: RerankMode::None,
            granularity: Granularity::Auto,
            scope: ScopeFilter::default(),
            symbol_types: Vec::new(),
            retrieval_timeout_ms: None,
        }
    }
}

impl QueryOptions {
    /// Start from a query string with all other options defaulted
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query_text: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_graph_depth(mut self, depth: usize) -> Self {
        self.graph_depth = depth;
        self
    }

    pub fn with_rerank(mut self, rerank: RerankMode) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scope.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_file_patterns(mut self, patterns: Vec<String>) -> Self {
        self.scope.file_patterns = patterns;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_symbol_types(mut self, types: Vec<SymbolType>) -> Self {
        self.symbol_types = types;
        self
    }
}

// ============================================================================
// CONFIDENCE
// ============================================================================

/// Qualitative confidence label for a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    #[default]
    Degraded,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::Degraded => "degraded",
        }
    }
}

/// Raw multi-signal diagnostics attached to every query result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceDiagnostics {
    /// Agreement between the vector and keyword channels, [0, 1]
    pub retrieval_agreement: f64,
    /// (top - second) / (top - last) over RRF scores, [0, 1]
    pub score_spread: f64,
    /// Largest directory share of the included files, [0, 1]
    pub scope_concentration: f64,
    /// Distinct files among included symbols
    pub unique_files: usize,
    /// Fused candidates before hydration
    pub total_candidates: usize,
    /// Human-readable summary of the three signals
    pub tier_reason: String,
}

/// Composite confidence score plus its diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceReport {
    /// 0.45·agreement + 0.25·spread + 0.30·concentration
    pub score: f64,
    pub tier: ConfidenceTier,
    pub diagnostics: ConfidenceDiagnostics,
}

// ============================================================================
// RESULT
// ============================================================================

/// Per-query timing and sizing metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Adaptive candidate limit used for both channels
    pub candidate_limit: usize,
    pub vector_hits: usize,
    pub keyword_hits: usize,
    /// Candidates present in both channels after fusion
    pub fused_overlap: usize,
    pub retrieval_ms: u64,
    pub rerank_ms: u64,
    pub expansion_ms: u64,
    pub total_ms: u64,
    /// Echo of the path scoping the query ran under
    pub scope: ScopeFilter,
}

/// A smart-query result: the token-budgeted context pack plus evidence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Formatted, token-budgeted context
    pub context: String,
    /// Symbols included in the context, in final rank order
    pub symbols: Vec<Symbol>,
    /// Edges collected during graph expansion
    pub edges: Vec<Edge>,
    /// Estimated tokens in `context`
    pub token_count: usize,
    pub confidence: ConfidenceReport,
    pub metadata: QueryMetadata,
}

impl QueryResult {
    /// The degraded empty result returned when no retrieval signal exists
    pub fn empty(reason: &str) -> Self {
        Self {
            confidence: ConfidenceReport {
                score: 0.0,
                tier: ConfidenceTier::Degraded,
                diagnostics: ConfidenceDiagnostics {
                    tier_reason: reason.to_string(),
                    ..Default::default()
                },
            },
            ..Default::default()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerank_mode_parsing() {
        assert_eq!(RerankMode::parse_name("bm25"), RerankMode::Bm25);
        assert_eq!(RerankMode::parse_name("cross-encoder"), RerankMode::CrossEncoder);
        assert_eq!(RerankMode::parse_name("whatever"), RerankMode::None);
    }

    #[test]
    fn test_scope_filter_activity() {
        assert!(!ScopeFilter::default().is_active());
        let scoped = ScopeFilter {
            path_prefix: Some("src/".to_string()),
            file_patterns: vec![],
        };
        assert!(scoped.is_active());
    }

    #[test]
    fn test_empty_result_is_degraded() {
        let result = QueryResult::empty("no retrieval signal");
        assert_eq!(result.confidence.tier, ConfidenceTier::Degraded);
        assert_eq!(result.token_count, 0);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn test_options_builder() {
        let opts = QueryOptions::text("tax calculation")
            .with_branch("dev")
            .with_max_tokens(4000)
            .with_path_prefix("src/");
        assert_eq!(opts.branch, "dev");
        assert_eq!(opts.max_tokens, 4000);
        assert!(opts.scope.is_active());
    }
}
