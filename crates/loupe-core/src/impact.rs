//! Impact Analysis
//!
//! Reverse traversal of the edge graph: who breaks if this symbol
//! changes. Produces a risk classification from the number of unique
//! dependents and a confidence tier from the provenance mix of the
//! traversed edges.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{EdgeOrigin, Symbol};
use crate::storage::{Result, Store};

/// Default traversal depth
pub const DEFAULT_IMPACT_DEPTH: usize = 10;

/// Risk classification by unique dependent count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// 0-3 low, 4-10 medium, 11-25 high, >25 critical
    pub fn from_dependent_count(count: usize) -> Self {
        match count {
            0..=3 => RiskLevel::Low,
            4..=10 => RiskLevel::Medium,
            11..=25 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// One affected symbol with its hop path back to the root
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependent {
    pub symbol_id: String,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    /// Hops from the analyzed symbol
    pub depth: usize,
    /// Qualified names from the root to this dependent
    pub path: Vec<String>,
}

/// Impact report for a resolved symbol
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub root_id: String,
    pub root_qualified_name: String,
    pub risk: RiskLevel,
    pub total_dependents: usize,
    pub direct: Vec<Dependent>,
    pub transitive: Vec<Dependent>,
    /// Provenance tier of the traversed edges: lsp-backed beats
    /// inference
    pub confidence: &'static str,
}

/// Typed result: an unknown symbol is an answer, not an error
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ImpactOutcome {
    Found(ImpactReport),
    NotFound { query: String },
}

/// Stateless analyzer parameterized by a store handle
pub struct ImpactAnalyzer<'a> {
    store: &'a Store,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Analyze by symbol id, name, or qualified name
    pub fn analyze(
        &self,
        symbol_ref: &str,
        branch: &str,
        max_depth: usize,
    ) -> Result<ImpactOutcome> {
        let candidates = self.store.find_symbols_by_name(symbol_ref, branch, 1)?;
        let Some(root) = candidates.into_iter().next() else {
            return Ok(ImpactOutcome::NotFound {
                query: symbol_ref.to_string(),
            });
        };

        let max_depth = max_depth.max(1);
        let mut visited: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut frontier = vec![root.id.clone()];
        // Parent chain for hop paths
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut depth_of: HashMap<String, usize> = HashMap::new();
        let mut origin_counts: HashMap<EdgeOrigin, usize> = HashMap::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let incoming = self.store.edges_to(&frontier, branch)?;
            let mut next = Vec::new();
            for edge in incoming {
                *origin_counts.entry(edge.origin).or_default() += 1;
                if visited.insert(edge.source_id.clone()) {
                    parent.insert(edge.source_id.clone(), edge.target_id.clone());
                    depth_of.insert(edge.source_id.clone(), depth);
                    next.push(edge.source_id);
                }
            }
            frontier = next;
        }

        let dependent_ids: Vec<String> = depth_of.keys().cloned().collect();
        let hydrated = self.store.get_symbols(&dependent_ids, branch)?;

        let mut direct = Vec::new();
        let mut transitive = Vec::new();
        let mut ordered: Vec<(&String, &usize)> = depth_of.iter().collect();
        ordered.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        for (id, &depth) in ordered {
            let Some(symbol) = hydrated.get(id) else {
                continue;
            };
            let dependent = Dependent {
                symbol_id: symbol.id.clone(),
                name: symbol.name.clone(),
                qualified_name: symbol.qualified_name.clone(),
                file_path: symbol.file_path.clone(),
                depth,
                path: self.hop_path(id, &root, &parent, &hydrated),
            };
            if depth == 1 {
                direct.push(dependent);
            } else {
                transitive.push(dependent);
            }
        }

        let total = direct.len() + transitive.len();
        Ok(ImpactOutcome::Found(ImpactReport {
            root_id: root.id.clone(),
            root_qualified_name: root.qualified_name.clone(),
            risk: RiskLevel::from_dependent_count(total),
            total_dependents: total,
            direct,
            transitive,
            confidence: origin_tier(&origin_counts),
        }))
    }

    /// Qualified names from the root down to `id`
    fn hop_path(
        &self,
        id: &str,
        root: &Symbol,
        parent: &HashMap<String, String>,
        hydrated: &HashMap<String, Symbol>,
    ) -> Vec<String> {
        let mut chain = Vec::new();
        let mut cursor = id.to_string();
        while let Some(next) = parent.get(&cursor) {
            let name = hydrated
                .get(&cursor)
                .map(|s| s.qualified_name.clone())
                .unwrap_or_else(|| cursor.clone());
            chain.push(name);
            cursor = next.clone();
        }
        chain.push(root.qualified_name.clone());
        chain.reverse();
        chain
    }
}

/// Tier from provenance mix: mostly semantic-tooling edges rank high,
/// pure text inference ranks low
fn origin_tier(counts: &HashMap<EdgeOrigin, usize>) -> &'static str {
    let total: usize = counts.values().sum();
    if total == 0 {
        return "low";
    }
    let semantic = counts.get(&EdgeOrigin::Lsp).copied().unwrap_or(0)
        + counts.get(&EdgeOrigin::Scip).copied().unwrap_or(0);
    if semantic * 2 >= total {
        "high"
    } else if semantic > 0 {
        "medium"
    } else {
        "low"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident;
    use crate::model::{Edge, EdgeType, SymbolType};
    use chrono::Utc;

    fn symbol(store: &Store, name: &str) -> Symbol {
        let symbol = Symbol {
            id: ident::symbol_id(name, None, "typescript"),
            name: name.to_string(),
            qualified_name: format!("src.{}", name),
            symbol_type: SymbolType::Function,
            language: "typescript".to_string(),
            file_path: format!("src/{}.ts", name),
            start_line: 1,
            end_line: 1,
            content: format!("function {}() {{}}", name),
            signature: None,
            docstring: None,
            content_hash: ident::content_hash(name),
            is_external: false,
            branch: "main".to_string(),
            embedding_model_id: None,
            updated_at: Utc::now(),
            revision_id: 1,
        };
        store.upsert_symbol(&symbol).unwrap();
        symbol
    }

    fn call(store: &Store, from: &Symbol, to: &Symbol, origin: EdgeOrigin) {
        store
            .upsert_edge(&Edge::new(
                &from.id,
                &to.id,
                EdgeType::Calls,
                0.9,
                origin,
                "main",
            ))
            .unwrap();
    }

    #[test]
    fn test_direct_and_transitive_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db"), "hash-v1").unwrap();
        let target = symbol(&store, "target");
        let caller = symbol(&store, "caller");
        let indirect = symbol(&store, "indirect");
        call(&store, &caller, &target, EdgeOrigin::Lsp);
        call(&store, &indirect, &caller, EdgeOrigin::Lsp);

        let outcome = ImpactAnalyzer::new(&store)
            .analyze("target", "main", DEFAULT_IMPACT_DEPTH)
            .unwrap();
        let ImpactOutcome::Found(report) = outcome else {
            panic!("expected a report");
        };

        assert_eq!(report.total_dependents, 2);
        assert_eq!(report.direct.len(), 1);
        assert_eq!(report.direct[0].name, "caller");
        assert_eq!(report.transitive.len(), 1);
        assert_eq!(report.transitive[0].name, "indirect");
        assert_eq!(report.transitive[0].depth, 2);
        assert_eq!(
            report.transitive[0].path,
            vec!["src.target", "src.caller", "src.indirect"]
        );
        assert_eq!(report.risk, RiskLevel::Low);
        assert_eq!(report.confidence, "high");
    }

    #[test]
    fn test_risk_escalates_with_fanin() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db"), "hash-v1").unwrap();
        let target = symbol(&store, "hot");
        for i in 0..12 {
            let caller = symbol(&store, &format!("caller{}", i));
            call(&store, &caller, &target, EdgeOrigin::AstInference);
        }

        let outcome = ImpactAnalyzer::new(&store)
            .analyze("hot", "main", DEFAULT_IMPACT_DEPTH)
            .unwrap();
        let ImpactOutcome::Found(report) = outcome else {
            panic!("expected a report");
        };
        assert_eq!(report.risk, RiskLevel::High);
        assert_eq!(report.confidence, "low");
    }

    #[test]
    fn test_unknown_symbol_is_typed_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db"), "hash-v1").unwrap();
        let outcome = ImpactAnalyzer::new(&store)
            .analyze("ghost", "main", DEFAULT_IMPACT_DEPTH)
            .unwrap();
        assert!(matches!(outcome, ImpactOutcome::NotFound { .. }));
    }

    #[test]
    fn test_depth_limit_respected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db"), "hash-v1").unwrap();
        let a = symbol(&store, "a");
        let b = symbol(&store, "b");
        let c = symbol(&store, "c");
        call(&store, &b, &a, EdgeOrigin::Lsp);
        call(&store, &c, &b, EdgeOrigin::Lsp);

        let outcome = ImpactAnalyzer::new(&store).analyze("a", "main", 1).unwrap();
        let ImpactOutcome::Found(report) = outcome else {
            panic!("expected a report");
        };
        assert_eq!(report.total_dependents, 1);
        assert!(report.transitive.is_empty());
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_dependent_count(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_dependent_count(3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_dependent_count(4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_dependent_count(10), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_dependent_count(11), RiskLevel::High);
        assert_eq!(RiskLevel::from_dependent_count(25), RiskLevel::High);
        assert_eq!(RiskLevel::from_dependent_count(26), RiskLevel::Critical);
    }
}
