//! Reranking
//!
//! Post-fusion score adjustment over the hydrated candidates:
//! - `heuristic`: cheap lexical boosts over normalized initial scores
//! - `bm25`: BM25(k1=1.2, b=0.75) against the query, blended 0.4/0.6
//!   with the initial score
//! - `cross-encoder`: neural pairwise scoring via fastembed; any
//!   failure falls back to the identity ordering
//!
//! All sorts are stable so equal scores keep their fused order.

use std::collections::HashMap;

#[cfg(feature = "embeddings")]
use std::sync::{Mutex, OnceLock};

use crate::model::{ContentKind, RerankMode};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Boost for an exact word-boundary match of the query in the content
const EXACT_MATCH_BOOST: f32 = 1.5;
/// Boost when query tokens appear in the file path
const PATH_MATCH_BOOST: f32 = 1.2;
/// Maximum boost from per-token density
const DENSITY_MAX_BOOST: f32 = 1.5;
/// Floor of the long-content penalty
const LONG_CONTENT_FLOOR: f32 = 0.7;
/// Content length where the long-content penalty starts
const LONG_CONTENT_CHARS: usize = 2000;
/// Granularity bias
const SYMBOL_BIAS: f32 = 1.1;
const FILE_BIAS: f32 = 0.9;

/// BM25 parameters
const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
/// Blend of initial score vs BM25 in `bm25` mode
const BM25_INITIAL_WEIGHT: f32 = 0.4;
const BM25_SCORE_WEIGHT: f32 = 0.6;

// ============================================================================
// CANDIDATES
// ============================================================================

/// One rerankable candidate
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: String,
    pub initial_score: f32,
    pub name: String,
    pub file_path: String,
    pub content: String,
    pub granularity: ContentKind,
}

/// Rerank candidates; returns `(id, score)` in the new order.
/// `RerankMode::None` is the identity.
pub fn rerank(mode: RerankMode, query: &str, candidates: &[RerankCandidate]) -> Vec<(String, f32)> {
    match mode {
        RerankMode::None => candidates
            .iter()
            .map(|c| (c.id.clone(), c.initial_score))
            .collect(),
        RerankMode::Heuristic => heuristic_rerank(query, candidates),
        RerankMode::Bm25 => bm25_rerank(query, candidates),
        RerankMode::CrossEncoder => cross_encoder_rerank(query, candidates),
    }
}

// ============================================================================
// HEURISTIC
// ============================================================================

fn heuristic_rerank(query: &str, candidates: &[RerankCandidate]) -> Vec<(String, f32)> {
    let max_initial = candidates
        .iter()
        .map(|c| c.initial_score)
        .fold(0.0_f32, f32::max)
        .max(f32::EPSILON);
    let query_lower = query.to_lowercase();
    let query_tokens = tokenize(query);

    let mut scored: Vec<(String, f32)> = candidates
        .iter()
        .map(|c| {
            let mut score = c.initial_score / max_initial;

            if contains_word(&c.content, &query_lower) {
                score *= EXACT_MATCH_BOOST;
            }

            let path_lower = c.file_path.to_lowercase();
            if !query_tokens.is_empty()
                && query_tokens.iter().any(|t| path_lower.contains(t.as_str()))
            {
                score *= PATH_MATCH_BOOST;
            }

            if !query_tokens.is_empty() {
                let content_lower = c.content.to_lowercase();
                let present = query_tokens
                    .iter()
                    .filter(|t| content_lower.contains(t.as_str()))
                    .count();
                let density = present as f32 / query_tokens.len() as f32;
                score *= 1.0 + density * (DENSITY_MAX_BOOST - 1.0);
            }

            if c.content.len() > LONG_CONTENT_CHARS {
                let penalty =
                    (LONG_CONTENT_CHARS as f32 / c.content.len() as f32).max(LONG_CONTENT_FLOOR);
                score *= penalty;
            }

            score *= match c.granularity {
                ContentKind::Symbol => SYMBOL_BIAS,
                ContentKind::File => FILE_BIAS,
                ContentKind::Chunk => 1.0,
            };

            (c.id.clone(), score)
        })
        .collect();

    stable_sort_desc(&mut scored);
    scored
}

/// Case-insensitive match of `needle` at word boundaries: `COP` matches
/// `= COP;` but not `SmallCopyInput`.
fn contains_word(haystack: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return false;
    }
    let hay_lower = haystack.to_lowercase();
    let mut search_from = 0;
    while let Some(pos) = hay_lower[search_from..].find(needle_lower) {
        let start = search_from + pos;
        let end = start + needle_lower.len();
        let before_ok = start == 0
            || !hay_lower[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after_ok = end >= hay_lower.len()
            || !hay_lower[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if before_ok && after_ok {
            return true;
        }
        // Resume past the match; end is always a char boundary
        search_from = end.min(hay_lower.len());
        if search_from == start {
            break;
        }
    }
    false
}

// ============================================================================
// BM25
// ============================================================================

/// Tokenize for BM25: lowercase, split on non-word chars, and split
/// camelCase humps so identifier queries meet prose and vice versa.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        for word in raw.split('_') {
            if word.is_empty() {
                continue;
            }
            let mut current = String::new();
            let mut prev_lower = false;
            for c in word.chars() {
                if c.is_uppercase() && prev_lower && !current.is_empty() {
                    tokens.push(current.to_lowercase());
                    current = String::new();
                }
                prev_lower = c.is_lowercase() || c.is_numeric();
                current.push(c);
            }
            if !current.is_empty() {
                tokens.push(current.to_lowercase());
            }
        }
    }
    tokens
}

fn bm25_rerank(query: &str, candidates: &[RerankCandidate]) -> Vec<(String, f32)> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() || candidates.is_empty() {
        return candidates
            .iter()
            .map(|c| (c.id.clone(), c.initial_score))
            .collect();
    }

    let docs: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(&c.content)).collect();
    let avg_len = docs.iter().map(|d| d.len()).sum::<usize>() as f32 / docs.len() as f32;
    let avg_len = avg_len.max(1.0);

    // Document frequency per query term over the candidate set
    let mut df: HashMap<&str, usize> = HashMap::new();
    for term in &query_tokens {
        let count = docs.iter().filter(|d| d.iter().any(|t| t == term)).count();
        df.insert(term.as_str(), count);
    }
    let n = candidates.len() as f32;

    let bm25_scores: Vec<f32> = docs
        .iter()
        .map(|doc| {
            let doc_len = doc.len() as f32;
            let mut score = 0.0;
            for term in &query_tokens {
                let tf = doc.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let dfi = df[term.as_str()] as f32;
                let idf = ((n - dfi + 0.5) / (dfi + 0.5) + 1.0).ln();
                let numerator = tf * (BM25_K1 + 1.0);
                let denominator = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (doc_len / avg_len));
                score += idf * numerator / denominator;
            }
            score
        })
        .collect();

    let max_initial = candidates
        .iter()
        .map(|c| c.initial_score)
        .fold(0.0_f32, f32::max)
        .max(f32::EPSILON);
    let max_bm25 = bm25_scores.iter().copied().fold(0.0_f32, f32::max).max(f32::EPSILON);

    let mut scored: Vec<(String, f32)> = candidates
        .iter()
        .zip(&bm25_scores)
        .map(|(c, bm25)| {
            let score = BM25_INITIAL_WEIGHT * (c.initial_score / max_initial)
                + BM25_SCORE_WEIGHT * (bm25 / max_bm25);
            (c.id.clone(), score)
        })
        .collect();

    stable_sort_desc(&mut scored);
    scored
}

// ============================================================================
// CROSS-ENCODER
// ============================================================================

#[cfg(feature = "embeddings")]
static CROSS_ENCODER: OnceLock<Option<Mutex<fastembed::TextRerank>>> = OnceLock::new();

#[cfg(feature = "embeddings")]
fn get_cross_encoder() -> Option<&'static Mutex<fastembed::TextRerank>> {
    CROSS_ENCODER
        .get_or_init(|| {
            let options = fastembed::RerankInitOptions::new(
                fastembed::RerankerModel::JINARerankerV1TurboEn,
            )
            .with_show_download_progress(false);
            match fastembed::TextRerank::try_new(options) {
                Ok(model) => Some(Mutex::new(model)),
                Err(e) => {
                    tracing::warn!("Cross-encoder unavailable: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Cross-encoder scoring; any failure keeps the fused order
fn cross_encoder_rerank(query: &str, candidates: &[RerankCandidate]) -> Vec<(String, f32)> {
    let identity: Vec<(String, f32)> = candidates
        .iter()
        .map(|c| (c.id.clone(), c.initial_score))
        .collect();

    #[cfg(feature = "embeddings")]
    {
        let Some(model) = get_cross_encoder() else {
            return identity;
        };
        let Ok(mut model) = model.lock() else {
            return identity;
        };
        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        match model.rerank(query, &documents, false, None) {
            Ok(results) => {
                let mut scored: Vec<(String, f32)> = results
                    .into_iter()
                    .filter_map(|r| {
                        candidates.get(r.index).map(|c| (c.id.clone(), r.score))
                    })
                    .collect();
                stable_sort_desc(&mut scored);
                scored
            }
            Err(e) => {
                tracing::warn!("Cross-encoder rerank failed, keeping fused order: {}", e);
                identity
            }
        }
    }

    #[cfg(not(feature = "embeddings"))]
    identity
}

fn stable_sort_desc(scored: &mut [(String, f32)]) {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f32, content: &str) -> RerankCandidate {
        RerankCandidate {
            id: id.to_string(),
            initial_score: score,
            name: id.to_string(),
            file_path: format!("src/{}.ts", id),
            content: content.to_string(),
            granularity: ContentKind::Symbol,
        }
    }

    #[test]
    fn test_none_is_identity() {
        let candidates = vec![candidate("a", 0.9, "x"), candidate("b", 0.5, "y")];
        let out = rerank(RerankMode::None, "query", &candidates);
        assert_eq!(out[0].0, "a");
        assert_eq!(out[1].0, "b");
    }

    #[test]
    fn test_word_boundary_boost_beats_substring() {
        // "COP" as a standalone word outranks "Cop" buried inside an
        // identifier, despite the lower initial score
        let candidates = vec![
            candidate("status", 0.4, "const status = COP;"),
            candidate("input", 0.5, "class SmallCopyInput"),
        ];
        let out = rerank(RerankMode::Heuristic, "COP", &candidates);
        assert_eq!(out[0].0, "status");
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("const status = COP;", "cop"));
        assert!(!contains_word("class SmallCopyInput", "cop"));
        assert!(contains_word("call(foo)", "foo"));
        assert!(!contains_word("food", "foo"));
    }

    #[test]
    fn test_heuristic_long_content_penalty() {
        let long_body = "filler ".repeat(1000);
        let candidates = vec![
            candidate("short", 0.5, "short body"),
            candidate("long", 0.5, &long_body),
        ];
        let out = rerank(RerankMode::Heuristic, "unrelated", &candidates);
        let short_score = out.iter().find(|(id, _)| id == "short").unwrap().1;
        let long_score = out.iter().find(|(id, _)| id == "long").unwrap().1;
        assert!(short_score > long_score);
    }

    #[test]
    fn test_bm25_prefers_term_matches() {
        let candidates = vec![
            candidate("relevant", 0.1, "tax calculation helpers for tax brackets"),
            candidate("noise", 0.9, "formats currency strings"),
        ];
        let out = rerank(RerankMode::Bm25, "tax calculation", &candidates);
        assert_eq!(out[0].0, "relevant");
    }

    #[test]
    fn test_bm25_tokenizer_splits_camel_case() {
        assert_eq!(tokenize("validateEmail"), vec!["validate", "email"]);
        assert_eq!(tokenize("snake_case"), vec!["snake", "case"]);
    }

    #[test]
    fn test_bm25_empty_query_is_identity_order() {
        let candidates = vec![candidate("a", 0.9, "x"), candidate("b", 0.5, "y")];
        let out = rerank(RerankMode::Bm25, "!!", &candidates);
        assert_eq!(out[0].0, "a");
    }

    #[test]
    fn test_granularity_bias() {
        let mut file_candidate = candidate("file", 0.5, "same content");
        file_candidate.granularity = ContentKind::File;
        let symbol_candidate = candidate("symbol", 0.5, "same content");

        let out = rerank(
            RerankMode::Heuristic,
            "zzz",
            &[file_candidate, symbol_candidate.clone()],
        );
        assert_eq!(out[0].0, "symbol");
    }
}
