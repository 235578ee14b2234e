//! Reciprocal Rank Fusion
//!
//! Fuses the vector and keyword channels into one ranking:
//!
//!   rrf(x) = Σ_channel weight / (k + rank_channel(x) + 1)
//!
//! with zero-based ranks, k = 60, and unit weights by default. RRF
//! normalizes across incomparable scoring scales and rewards items
//! surfacing in both channels; per-channel ranks are carried through
//! for observability.

use std::collections::HashMap;

/// Fusion offset; dampens the effect of top ranks
pub const RRF_K: f32 = 60.0;

/// One fused candidate with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub content_id: String,
    pub score: f32,
    pub vector_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
}

impl FusedHit {
    /// Present in both channels
    pub fn is_overlap(&self) -> bool {
        self.vector_rank.is_some() && self.keyword_rank.is_some()
    }
}

/// Fuse two ranked id lists. Inputs must be rank-ordered best-first;
/// the attached scores are ignored, only positions matter.
pub fn reciprocal_rank_fusion(
    vector_ids: &[String],
    keyword_ids: &[String],
    k: f32,
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<FusedHit> {
    let mut hits: HashMap<String, FusedHit> = HashMap::new();

    for (rank, id) in vector_ids.iter().enumerate() {
        let entry = hits.entry(id.clone()).or_insert_with(|| FusedHit {
            content_id: id.clone(),
            score: 0.0,
            vector_rank: None,
            keyword_rank: None,
        });
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(rank);
            entry.score += vector_weight / (k + rank as f32 + 1.0);
        }
    }

    for (rank, id) in keyword_ids.iter().enumerate() {
        let entry = hits.entry(id.clone()).or_insert_with(|| FusedHit {
            content_id: id.clone(),
            score: 0.0,
            vector_rank: None,
            keyword_rank: None,
        });
        if entry.keyword_rank.is_none() {
            entry.keyword_rank = Some(rank);
            entry.score += keyword_weight / (k + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<FusedHit> = hits.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            // Deterministic ordering for equal scores
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
    fused
}

/// Count of candidates present in both channels
pub fn overlap_count(fused: &[FusedHit]) -> usize {
    fused.iter().filter(|h| h.is_overlap()).count()
}

// ============================================================================
// TESTS
// ============================================================================
