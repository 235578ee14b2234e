//! Chunker
//!
//! Produces line-bounded chunks per file: one `symbol` chunk per
//! top-level symbol, fixed-window `block` chunks over residual lines.
//! The whole-file snapshot lives in `file_contents` and doubles as the
//! `file`-granularity chunk.

use chrono::Utc;

use crate::ident::{chunk_id, content_hash};
use crate::model::{Chunk, ChunkKind, Symbol, SymbolType};

/// Fixed window for residual block chunks
pub const DEFAULT_BLOCK_LINES: usize = 50;

pub struct Chunker {
    block_lines: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_LINES)
    }
}

impl Chunker {
    pub fn new(block_lines: usize) -> Self {
        Self {
            block_lines: block_lines.max(1),
        }
    }

    /// Chunk one file given its extracted symbols
    pub fn chunk_file(
        &self,
        file_path: &str,
        language: &str,
        branch: &str,
        source: &str,
        symbols: &[Symbol],
    ) -> Vec<Chunk> {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let mut chunks = Vec::new();
        let mut covered = vec![false; lines.len()];

        for symbol in top_level(symbols) {
            let start = symbol.start_line.max(1) as usize - 1;
            let end = (symbol.end_line as usize).min(lines.len());
            if start >= end {
                continue;
            }
            for flag in &mut covered[start..end] {
                *flag = true;
            }

            let content = lines[start..end].join("\n");
            let hash = content_hash(&content);
            chunks.push(Chunk {
                id: chunk_id(file_path, symbol.start_line, symbol.end_line, &hash),
                file_path: file_path.to_string(),
                start_line: symbol.start_line,
                end_line: symbol.end_line,
                content,
                chunk_type: ChunkKind::Symbol,
                parent_symbol_id: Some(symbol.id.clone()),
                language: language.to_string(),
                content_hash: hash,
                branch: branch.to_string(),
                updated_at: now,
            });
        }

        // Residual runs become fixed-window block chunks
        let mut run_start: Option<usize> = None;
        for idx in 0..=lines.len() {
            let in_run = idx < lines.len() && !covered[idx] && !lines[idx].trim().is_empty();
            match (run_start, in_run) {
                (None, true) => run_start = Some(idx),
                (Some(start), false) => {
                    self.push_blocks(
                        file_path, language, branch, &lines, start, idx, &mut chunks,
                    );
                    run_start = None;
                }
                _ => {}
            }
        }

        chunks
    }

    fn push_blocks(
        &self,
        file_path: &str,
        language: &str,
        branch: &str,
        lines: &[&str],
        start: usize,
        end: usize,
        chunks: &mut Vec<Chunk>,
    ) {
        let now = Utc::now();
        let mut window_start = start;
        while window_start < end {
            let window_end = (window_start + self.block_lines).min(end);
            let content = lines[window_start..window_end].join("\n");
            let hash = content_hash(&content);
            let start_line = window_start as u32 + 1;
            let end_line = window_end as u32;
            chunks.push(Chunk {
                id: chunk_id(file_path, start_line, end_line, &hash),
                file_path: file_path.to_string(),
                start_line,
                end_line,
                content,
                chunk_type: ChunkKind::Block,
                parent_symbol_id: None,
                language: language.to_string(),
                content_hash: hash,
                branch: branch.to_string(),
                updated_at: now,
            });
            window_start = window_end;
        }
    }
}

/// Symbols not nested inside another symbol's line range; module
/// symbols span the whole file and are excluded outright
fn top_level(symbols: &[Symbol]) -> Vec<&Symbol> {
    symbols
        .iter()
        .filter(|s| s.symbol_type != SymbolType::Module)
        .filter(|s| {
            !symbols.iter().any(|other| {
                other.id != s.id
                    && other.symbol_type != SymbolType::Module
                    && other.start_line <= s.start_line
                    && other.end_line >= s.end_line
                    && (other.start_line < s.start_line || other.end_line > s.end_line)
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident;
    use chrono::Utc;

    fn symbol(name: &str, start: u32, end: u32, symbol_type: SymbolType) -> Symbol {
        Symbol {
            id: ident::symbol_id(name, None, "typescript"),
            name: name.to_string(),
            qualified_name: name.to_string(),
            symbol_type,
            language: "typescript".to_string(),
            file_path: "a.ts".to_string(),
            start_line: start,
            end_line: end,
            content: String::new(),
            signature: None,
            docstring: None,
            content_hash: String::new(),
            is_external: false,
            branch: "main".to_string(),
            embedding_model_id: None,
            updated_at: Utc::now(),
            revision_id: 1,
        }
    }

    #[test]
    fn test_symbol_chunks_carry_parent() {
        let source = "function a() {\n  return 1;\n}\n\nfunction b() {\n  return 2;\n}\n";
        let symbols = vec![
            symbol("a", 1, 3, SymbolType::Function),
            symbol("b", 5, 7, SymbolType::Function),
        ];
        let chunks = Chunker::default().chunk_file("a.ts", "typescript", "main", source, &symbols);

        let symbol_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkKind::Symbol)
            .collect();
        assert_eq!(symbol_chunks.len(), 2);
        assert!(symbol_chunks.iter().all(|c| c.parent_symbol_id.is_some()));
        assert_eq!(symbol_chunks[0].start_line, 1);
        assert_eq!(symbol_chunks[0].end_line, 3);
    }

    #[test]
    fn test_nested_symbols_excluded() {
        let source = "class C {\n  m() {\n    return 1;\n  }\n}\n";
        let symbols = vec![
            symbol("C", 1, 5, SymbolType::Class),
            symbol("m", 2, 4, SymbolType::Method),
        ];
        let chunks = Chunker::default().chunk_file("a.ts", "typescript", "main", source, &symbols);
        let symbol_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkKind::Symbol)
            .collect();
        // Only the class gets a chunk; the method is inside its range
        assert_eq!(symbol_chunks.len(), 1);
    }

    #[test]
    fn test_residual_lines_become_blocks() {
        let mut source = String::from("const config = 1;\n");
        for i in 0..60 {
            source.push_str(&format!("statement_{};\n", i));
        }
        let chunks = Chunker::new(50).chunk_file("a.ts", "typescript", "main", &source, &[]);

        let blocks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkKind::Block)
            .collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start_line, 1);
        assert_eq!(blocks[0].end_line, 50);
        assert_eq!(blocks[1].start_line, 51);
        assert_eq!(blocks[1].end_line, 61);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let chunks = Chunker::default().chunk_file("a.ts", "typescript", "main", "", &[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_ids_deterministic() {
        let source = "function a() {\n  return 1;\n}\n";
        let symbols = vec![symbol("a", 1, 3, SymbolType::Function)];
        let first = Chunker::default().chunk_file("a.ts", "typescript", "main", source, &symbols);
        let second = Chunker::default().chunk_file("a.ts", "typescript", "main", source, &symbols);
        assert_eq!(first[0].id, second[0].id);
    }
}
