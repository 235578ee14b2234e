//! Multi-Signal Confidence
//!
//! Scores a finished query from three signals:
//! - retrieval agreement between the vector and keyword channels
//! - score spread of the fused ranking
//! - directory concentration of the included files
//!
//! Composite = 0.45·agreement + 0.25·spread + 0.30·concentration,
//! mapped onto {high, medium, low, degraded}. Zero results always
//! degrade.

use std::collections::HashMap;

use super::fusion::FusedHit;
use crate::model::{ConfidenceDiagnostics, ConfidenceReport, ConfidenceTier, Symbol};

/// Weights of the composite
const AGREEMENT_WEIGHT: f64 = 0.45;
const SPREAD_WEIGHT: f64 = 0.25;
const CONCENTRATION_WEIGHT: f64 = 0.30;

/// Tier cut-offs
const HIGH_THRESHOLD: f64 = 0.7;
const MEDIUM_THRESHOLD: f64 = 0.4;
const LOW_THRESHOLD: f64 = 0.1;

/// Compute the confidence report for a finished query
pub fn compute_confidence(
    vector_hits: usize,
    keyword_hits: usize,
    fused: &[FusedHit],
    included: &[Symbol],
) -> ConfidenceReport {
    if included.is_empty() {
        return ConfidenceReport {
            score: 0.0,
            tier: ConfidenceTier::Degraded,
            diagnostics: ConfidenceDiagnostics {
                total_candidates: fused.len(),
                tier_reason: "no results survived retrieval".to_string(),
                ..Default::default()
            },
        };
    }

    let agreement = retrieval_agreement(vector_hits, keyword_hits, fused);
    let spread = score_spread(fused);
    let concentration = scope_concentration(included);
    let unique_files = included
        .iter()
        .map(|s| s.file_path.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();

    let score = AGREEMENT_WEIGHT * agreement
        + SPREAD_WEIGHT * spread
        + CONCENTRATION_WEIGHT * concentration;

    let tier = if score >= HIGH_THRESHOLD {
        ConfidenceTier::High
    } else if score >= MEDIUM_THRESHOLD {
        ConfidenceTier::Medium
    } else if score >= LOW_THRESHOLD {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Degraded
    };

    let tier_reason = format!(
        "channel agreement {:.2}, score spread {:.2}, scope concentration {:.2} across {} file{}",
        agreement,
        spread,
        concentration,
        unique_files,
        if unique_files == 1 { "" } else { "s" }
    );

    ConfidenceReport {
        score,
        tier,
        diagnostics: ConfidenceDiagnostics {
            retrieval_agreement: agreement,
            score_spread: spread,
            scope_concentration: concentration,
            unique_files,
            total_candidates: fused.len(),
            tier_reason,
        },
    }
}

/// Agreement between channels: hit-count ratio, blended with the
/// fused-overlap fraction when overlap exists. A single productive
/// channel scores a flat 0.1.
fn retrieval_agreement(vector_hits: usize, keyword_hits: usize, fused: &[FusedHit]) -> f64 {
    if vector_hits == 0 && keyword_hits == 0 {
        return 0.0;
    }
    if vector_hits == 0 || keyword_hits == 0 {
        return 0.1;
    }

    let ratio = vector_hits.min(keyword_hits) as f64 / vector_hits.max(keyword_hits) as f64;
    let overlap = fused.iter().filter(|h| h.is_overlap()).count();
    if overlap > 0 && !fused.is_empty() {
        let overlap_fraction = overlap as f64 / fused.len() as f64;
        (ratio + overlap_fraction) / 2.0
    } else {
        ratio
    }
}

/// (top − second) / (top − last) over fused scores, clamped to [0, 1];
/// 0.5 for a single result
fn score_spread(fused: &[FusedHit]) -> f64 {
    match fused.len() {
        0 => 0.0,
        1 => 0.5,
        _ => {
            let top = fused[0].score as f64;
            let second = fused[1].score as f64;
            let last = fused[fused.len() - 1].score as f64;
            let range = top - last;
            if range <= f64::EPSILON {
                return 0.0;
            }
            ((top - second) / range).clamp(0.0, 1.0)
        }
    }
}

/// Largest directory share among included file paths
fn scope_concentration(included: &[Symbol]) -> f64 {
    if included.is_empty() {
        return 0.0;
    }
    let mut dirs: HashMap<&str, usize> = HashMap::new();
    for symbol in included {
        *dirs.entry(symbol.directory()).or_default() += 1;
    }
    let max = dirs.values().copied().max().unwrap_or(0);
    max as f64 / included.len() as f64
}

// ============================================================================
// TESTS
// ============================================================================
