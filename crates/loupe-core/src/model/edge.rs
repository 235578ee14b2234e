//! Edge - a relation between two symbols
//!
//! Edges are valid only when both endpoints exist in the same branch and
//! cascade-delete with them. The same logical edge may be re-asserted at
//! different confidence levels as better information arrives; newer wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// EDGE TYPES
// ============================================================================

/// Kinds of relations between symbols
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Source invokes target
    #[default]
    Calls,
    /// Source extends target
    Inherits,
    /// Source implements target interface
    Implements,
    /// Source file/module imports target
    Imports,
    /// Source references target in a non-call position
    Uses,
}

impl EdgeType {
    /// Stable lowercase serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Calls => "calls",
            EdgeType::Inherits => "inherits",
            EdgeType::Implements => "implements",
            EdgeType::Imports => "imports",
            EdgeType::Uses => "uses",
        }
    }

    /// Parse from the stable string form
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "calls" => EdgeType::Calls,
            "inherits" => EdgeType::Inherits,
            "implements" => EdgeType::Implements,
            "imports" => EdgeType::Imports,
            "uses" => EdgeType::Uses,
            _ => EdgeType::Uses,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EDGE ORIGIN
// ============================================================================

/// Where an edge came from; ranks inference quality for confidence tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeOrigin {
    /// Reported by a language server
    Lsp,
    /// Read from a SCIP index
    Scip,
    /// Inferred from source text without semantic tooling
    #[default]
    AstInference,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeOrigin::Lsp => "lsp",
            EdgeOrigin::Scip => "scip",
            EdgeOrigin::AstInference => "ast-inference",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "lsp" => EdgeOrigin::Lsp,
            "scip" => EdgeOrigin::Scip,
            _ => EdgeOrigin::AstInference,
        }
    }

    /// Quality rank used when mixing origins into a confidence tier
    pub fn rank(&self) -> u8 {
        match self {
            EdgeOrigin::Lsp => 3,
            EdgeOrigin::Scip => 2,
            EdgeOrigin::AstInference => 1,
        }
    }
}

// ============================================================================
// EDGE
// ============================================================================

/// A persisted edge row
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Deterministic id: first 16 hex chars of
    /// sha256(source_id :: target_id :: type)
    pub id: String,
    /// Id of the source symbol
    pub source_id: String,
    /// Id of the target symbol
    pub target_id: String,
    /// Relation kind
    pub edge_type: EdgeType,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Provenance of the relation
    pub origin: EdgeOrigin,
    /// Branch this row belongs to
    pub branch: String,
    /// Line range of the reference at the source, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_range: Option<(u32, u32)>,
    /// Line range of the definition at the target, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_range: Option<(u32, u32)>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Free-form JSON metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Edge {
    /// Build an edge with the canonical id derived from its endpoints
    pub fn new(
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        confidence: f32,
        origin: EdgeOrigin,
        branch: &str,
    ) -> Self {
        Self {
            id: crate::ident::edge_id(source_id, target_id, edge_type),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            edge_type,
            confidence: confidence.clamp(0.0, 1.0),
            origin,
            branch: branch.to_string(),
            source_range: None,
            target_range: None,
            updated_at: Utc::now(),
            metadata: None,
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
    fn test_edge_type_round_trip() {
        for ty in [
            EdgeType::Calls,
            EdgeType::Inherits,
            EdgeType::Implements,
            EdgeType::Imports,
            EdgeType::Uses,
        ] {
            assert_eq!(EdgeType::parse_name(ty.as_str()), ty);
        }
    }

    #[test]
    fn test_origin_rank_ordering() {
        assert!(EdgeOrigin::Lsp.rank() > EdgeOrigin::Scip.rank());
        assert!(EdgeOrigin::Scip.rank() > EdgeOrigin::AstInference.rank());
    }

    #[test]
    fn test_edge_confidence_is_clamped() {
        let edge = Edge::new("a", "b", EdgeType::Calls, 1.5, EdgeOrigin::Lsp, "main");
        assert_eq!(edge.confidence, 1.0);

        let edge = Edge::new("a", "b", EdgeType::Calls, -0.5, EdgeOrigin::Lsp, "main");
        assert_eq!(edge.confidence, 0.0);
    }

    #[test]
    fn test_edge_id_is_deterministic() {
        let e1 = Edge::new("src", "dst", EdgeType::Imports, 0.5, EdgeOrigin::AstInference, "main");
        let e2 = Edge::new("src", "dst", EdgeType::Imports, 0.9, EdgeOrigin::Lsp, "dev");
        // Same endpoints + type => same id regardless of confidence/origin/branch
        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.id.len(), 16);
    }
}
