//! Graph Expansion
//!
//! BFS over the edge graph around the top retrieval hits, in both
//! directions: callers by reversing edges, callees by following them.
//! Bounded by depth (hard cap 3), per-node fan-out, and a confidence
//! threshold; traversed edges are deduped by id.

use std::collections::{HashMap, HashSet};

use crate::model::{Edge, Symbol};
use crate::storage::{Result, Store};

/// Hard cap on expansion depth regardless of the requested value
pub const MAX_GRAPH_DEPTH: usize = 3;

/// Default fan-out per node
pub const DEFAULT_FAN_OUT: usize = 10;

/// Traversal direction over the edge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Incoming edges only (who depends on the seeds)
    Callers,
    /// Outgoing edges only (what the seeds depend on)
    Callees,
    /// Both directions
    #[default]
    Both,
}

impl Direction {
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "callers" | "incoming" => Direction::Callers,
            "callees" | "outgoing" => Direction::Callees,
            _ => Direction::Both,
        }
    }
}

/// Result of a graph expansion
#[derive(Debug, Default)]
pub struct GraphExpansion {
    /// Symbols discovered during traversal (seeds excluded)
    pub symbols: Vec<Symbol>,
    /// Traversed edges, deduped by id
    pub edges: Vec<Edge>,
    /// Hop distance from the seed set for each discovered symbol
    pub depths: std::collections::HashMap<String, usize>,
}

/// Stateless expander parameterized by a store handle
pub struct GraphExpander<'a> {
    store: &'a Store,
}

impl<'a> GraphExpander<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Expand around `seed_ids` up to `depth` hops in both directions
    pub fn expand(
        &self,
        seed_ids: &[String],
        branch: &str,
        depth: usize,
        max_fan_out: usize,
        confidence_threshold: f32,
    ) -> Result<GraphExpansion> {
        self.expand_directed(
            seed_ids,
            branch,
            depth,
            max_fan_out,
            confidence_threshold,
            Direction::Both,
        )
    }

    /// Expand with explicit direction control
    pub fn expand_directed(
        &self,
        seed_ids: &[String],
        branch: &str,
        depth: usize,
        max_fan_out: usize,
        confidence_threshold: f32,
        direction: Direction,
    ) -> Result<GraphExpansion> {
        let depth = depth.min(MAX_GRAPH_DEPTH);
        let max_fan_out = max_fan_out.max(1);

        let mut visited: HashSet<String> = seed_ids.iter().cloned().collect();
        let mut frontier: Vec<String> = seed_ids.to_vec();
        let mut edges_by_id: HashMap<String, Edge> = HashMap::new();
        let mut discovered: Vec<String> = Vec::new();
        let mut depths: HashMap<String, usize> = HashMap::new();

        for hop in 0..depth {
            if frontier.is_empty() {
                break;
            }

            let outgoing = if direction != Direction::Callers {
                self.store.edges_from(&frontier, branch)?
            } else {
                Vec::new()
            };
            let incoming = if direction != Direction::Callees {
                self.store.edges_to(&frontier, branch)?
            } else {
                Vec::new()
            };

            // Per-node fan-out cap, preferring confident edges
            let mut per_node: HashMap<&str, usize> = HashMap::new();
            let mut candidates: Vec<&Edge> = outgoing
                .iter()
                .chain(incoming.iter())
                .filter(|e| e.confidence >= confidence_threshold)
                .collect();
            candidates.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });

            let mut next_frontier = Vec::new();
            for edge in candidates {
                // Which end anchors this edge to the frontier
                let (anchor, other) = if frontier.contains(&edge.source_id) {
                    (edge.source_id.as_str(), edge.target_id.as_str())
                } else {
                    (edge.target_id.as_str(), edge.source_id.as_str())
                };

                let taken = per_node.entry(anchor).or_insert(0);
                if *taken >= max_fan_out {
                    continue;
                }
                *taken += 1;

                edges_by_id.entry(edge.id.clone()).or_insert_with(|| edge.clone());
                if visited.insert(other.to_string()) {
                    discovered.push(other.to_string());
                    depths.insert(other.to_string(), hop + 1);
                    next_frontier.push(other.to_string());
                }
            }

            frontier = next_frontier;
        }

        let hydrated = self.store.get_symbols(&discovered, branch)?;
        let symbols = discovered
            .iter()
            .filter_map(|id| hydrated.get(id).cloned())
            .collect();

        let mut edges: Vec<Edge> = edges_by_id.into_values().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(GraphExpansion {
            symbols,
            edges,
            depths,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
