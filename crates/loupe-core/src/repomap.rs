//! Repo Map
//!
//! Ranks files by connectivity: the symbol edge graph is projected onto
//! files and scored with PageRank, weighted by edge confidence. Derived
//! data, recomputed on rebuild or explicit request.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::model::RepoMapEntry;
use crate::storage::{Result, Store};

/// PageRank damping factor
const DAMPING: f64 = 0.85;
/// Fixed iteration budget; the graph is small enough that convergence
/// checks are not worth the bookkeeping
const ITERATIONS: usize = 20;
/// Symbols listed in each file's summary
const SUMMARY_SYMBOLS: usize = 5;

/// Compute repo-map entries for a branch
pub fn compute_repo_map(store: &Store, branch: &str) -> Result<Vec<RepoMapEntry>> {
    let files = store.list_files(branch)?;
    if files.is_empty() {
        return Ok(Vec::new());
    }
    let paths: Vec<String> = files.iter().map(|f| f.file_path.clone()).collect();
    let index_of: HashMap<&str, usize> = paths
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();

    // Project symbol edges onto file edges, weighted by confidence
    let edges = store.all_edges(branch)?;
    let mut endpoint_ids: HashSet<String> = HashSet::new();
    for edge in &edges {
        endpoint_ids.insert(edge.source_id.clone());
        endpoint_ids.insert(edge.target_id.clone());
    }
    let ids: Vec<String> = endpoint_ids.into_iter().collect();
    let symbols = store.get_symbols(&ids, branch)?;

    let n = paths.len();
    // out_weights[i] = total outgoing weight; links[i] = (target, weight)
    let mut links: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut in_degree = vec![0u32; n];
    let mut out_degree = vec![0u32; n];

    for edge in &edges {
        let Some(source_file) = symbols.get(&edge.source_id).map(|s| s.file_path.as_str()) else {
            continue;
        };
        let Some(target_file) = symbols.get(&edge.target_id).map(|s| s.file_path.as_str()) else {
            continue;
        };
        if source_file == target_file {
            continue;
        }
        let (Some(&src), Some(&dst)) = (index_of.get(source_file), index_of.get(target_file))
        else {
            continue;
        };
        links[src].push((dst, edge.confidence as f64));
        out_degree[src] += 1;
        in_degree[dst] += 1;
    }

    let out_weight: Vec<f64> = links
        .iter()
        .map(|l| l.iter().map(|(_, w)| w).sum::<f64>())
        .collect();

    // Standard power iteration with uniform teleport
    let mut rank = vec![1.0 / n as f64; n];
    for _ in 0..ITERATIONS {
        let mut next = vec![(1.0 - DAMPING) / n as f64; n];
        let mut dangling = 0.0;
        for (src, outgoing) in links.iter().enumerate() {
            if outgoing.is_empty() {
                dangling += rank[src];
                continue;
            }
            for &(dst, weight) in outgoing {
                next[dst] += DAMPING * rank[src] * (weight / out_weight[src]);
            }
        }
        let dangling_share = DAMPING * dangling / n as f64;
        for value in &mut next {
            *value += dangling_share;
        }
        rank = next;
    }

    let now = Utc::now();
    let mut entries: Vec<RepoMapEntry> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let summary = store
                .get_symbols_by_file(path, branch)
                .unwrap_or_default()
                .iter()
                .filter(|s| s.symbol_type != crate::model::SymbolType::Module)
                .take(SUMMARY_SYMBOLS)
                .map(|s| s.name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            RepoMapEntry {
                file_path: path.clone(),
                branch: branch.to_string(),
                importance_score: rank[i],
                in_degree: in_degree[i],
                out_degree: out_degree[i],
                symbol_summary: summary,
                updated_at: now,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.importance_score
            .partial_cmp(&a.importance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================
