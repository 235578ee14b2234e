//! Token-Budgeted Context Assembly
//!
//! Formats ranked symbols into a markdown context pack under a token
//! budget. Tokens are estimated as ceil(chars / 4). Byte-identical
//! symbols (worktree copies) are collapsed by content hash; symbols
//! with no content hash are never deduplicated.

use std::collections::HashSet;

use crate::model::{Edge, Symbol};

/// Truncation only happens when at least this many tokens remain
const MIN_TRUNCATION_TOKENS: usize = 100;

/// An assembled context pack
#[derive(Debug, Default)]
pub struct ContextPack {
    pub context: String,
    /// Symbols that made it into the context, in order
    pub symbols_included: Vec<Symbol>,
    pub edges: Vec<Edge>,
    pub token_count: usize,
}

/// Estimate tokens as ceil(chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Format one symbol as a context block
fn format_symbol(symbol: &Symbol) -> String {
    let mut block = format!(
        "## {}: {}\n{}\n",
        symbol.symbol_type, symbol.qualified_name, symbol.location()
    );
    if let Some(signature) = &symbol.signature {
        block.push_str(&format!("Signature: {}\n", signature));
    }
    if let Some(docstring) = &symbol.docstring {
        block.push_str(&format!("Doc: {}\n", docstring));
    }
    block.push_str(&format!("```{}\n{}\n```", symbol.language, symbol.content));
    block
}

/// Assemble a context pack from ranked symbols under `max_tokens`
pub fn build_context(symbols: &[Symbol], edges: Vec<Edge>, max_tokens: usize) -> ContextPack {
    let mut context = String::new();
    let mut included = Vec::new();
    let mut seen_hashes: HashSet<&str> = HashSet::new();

    for symbol in symbols {
        // Worktree dedup: collapse byte-identical copies; empty hashes
        // are exempt
        if !symbol.content_hash.is_empty() && !seen_hashes.insert(symbol.content_hash.as_str()) {
            continue;
        }

        let block = format_symbol(symbol);
        let candidate_len = if context.is_empty() {
            block.len()
        } else {
            context.len() + 2 + block.len()
        };

        if estimate_tokens_len(candidate_len) <= max_tokens {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&block);
            included.push(symbol.clone());
            continue;
        }

        // Over budget: include a truncated version when enough room
        // remains, then stop
        let used = if context.is_empty() {
            0
        } else {
            context.len() + 2
        };
        let remaining_tokens = max_tokens.saturating_sub(estimate_tokens_len(used));
        if remaining_tokens >= MIN_TRUNCATION_TOKENS {
            let char_budget = remaining_tokens * 4 - 3;
            let cut = floor_char_boundary(&block, char_budget.min(block.len()));
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&block[..cut]);
            context.push_str("...");
            included.push(symbol.clone());
        }
        break;
    }

    let token_count = estimate_tokens(&context);
    ContextPack {
        context,
        symbols_included: included,
        edges,
        token_count,
    }
}

fn estimate_tokens_len(len: usize) -> usize {
    len.div_ceil(4)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

// ============================================================================
// TESTS
// ============================================================================
