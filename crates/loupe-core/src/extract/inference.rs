//! Edge Inference Backstop
//!
//! Derives IMPORTS and CALLS edges from source text alone, for use when
//! no language server is available. Confidence encodes resolution
//! quality:
//! - imports: 0.5 exact-path match, 0.35 name-only match
//! - calls: 0.45 direct call, 0.30 method-of call
//!
//! Edges below the configured minimum are dropped and counted in the
//! returned report.

use std::collections::HashMap;

use crate::model::{Edge, EdgeOrigin, EdgeType, Symbol};

/// Confidence for an import resolved to an exact indexed path
pub const IMPORT_EXACT_CONFIDENCE: f32 = 0.5;
/// Confidence for an import matched by module name only
pub const IMPORT_NAME_CONFIDENCE: f32 = 0.35;
/// Confidence for a direct call `foo(...)`
pub const CALL_DIRECT_CONFIDENCE: f32 = 0.45;
/// Confidence for a method call `obj.foo(...)`
pub const CALL_METHOD_CONFIDENCE: f32 = 0.30;

/// Index-side lookups the inferencer needs
pub trait InferenceContext {
    /// Candidate symbols by simple name, across the branch
    fn symbols_named(&self, name: &str) -> Vec<Symbol>;

    /// The module symbol representing an indexed file
    fn module_symbol(&self, file_path: &str) -> Option<Symbol>;

    /// All indexed file paths in the branch
    fn indexed_paths(&self) -> Vec<String>;
}

/// Result of an inference pass over one file
#[derive(Debug, Default)]
pub struct InferenceReport {
    pub edges: Vec<Edge>,
    /// Edges discarded for falling below the confidence minimum
    pub dropped: usize,
}

/// Text-only edge inference
pub struct EdgeInferencer {
    min_confidence: f32,
    branch: String,
}

impl EdgeInferencer {
    pub fn new(min_confidence: f32, branch: &str) -> Self {
        Self {
            min_confidence,
            branch: branch.to_string(),
        }
    }

    /// Infer edges for one file: imports from its declarations, calls
    /// from each symbol's own text.
    pub fn infer_file(
        &self,
        file_path: &str,
        source: &str,
        language: &str,
        file_symbols: &[Symbol],
        ctx: &dyn InferenceContext,
    ) -> InferenceReport {
        let mut report = InferenceReport::default();
        let mut by_id: HashMap<String, Edge> = HashMap::new();

        self.infer_imports(file_path, source, language, ctx, &mut by_id, &mut report);
        self.infer_calls(file_symbols, ctx, &mut by_id, &mut report);

        report.edges = by_id.into_values().collect();
        report
            .edges
            .sort_by(|a, b| a.id.cmp(&b.id));
        report
    }

    fn push_edge(
        &self,
        source: &Symbol,
        target: &Symbol,
        edge_type: EdgeType,
        confidence: f32,
        by_id: &mut HashMap<String, Edge>,
        report: &mut InferenceReport,
    ) {
        if source.id == target.id {
            return;
        }
        if confidence < self.min_confidence {
            report.dropped += 1;
            return;
        }
        let edge = Edge::new(
            &source.id,
            &target.id,
            edge_type,
            confidence,
            EdgeOrigin::AstInference,
            &self.branch,
        );
        // Re-asserted edges keep their best confidence
        by_id
            .entry(edge.id.clone())
            .and_modify(|existing| {
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
            })
            .or_insert(edge);
    }

    // ========================================================================
    // IMPORTS
    // ========================================================================

    fn infer_imports(
        &self,
        file_path: &str,
        source: &str,
        language: &str,
        ctx: &dyn InferenceContext,
        by_id: &mut HashMap<String, Edge>,
        report: &mut InferenceReport,
    ) {
        let Some(importer) = ctx.module_symbol(file_path) else {
            return;
        };
        let paths = ctx.indexed_paths();

        for specifier in parse_import_specifiers(source, language) {
            let resolved = resolve_module(file_path, &specifier, language, &paths);
            let Some((target_path, exact)) = resolved else {
                continue;
            };
            let Some(target) = ctx.module_symbol(&target_path) else {
                continue;
            };
            let confidence = if exact {
                IMPORT_EXACT_CONFIDENCE
            } else {
                IMPORT_NAME_CONFIDENCE
            };
            self.push_edge(&importer, &target, EdgeType::Imports, confidence, by_id, report);
        }
    }

    // ========================================================================
    // CALLS
    // ========================================================================

    fn infer_calls(
        &self,
        file_symbols: &[Symbol],
        ctx: &dyn InferenceContext,
        by_id: &mut HashMap<String, Edge>,
        report: &mut InferenceReport,
    ) {
        for symbol in file_symbols {
            if !symbol.symbol_type.is_callable() {
                continue;
            }
            for site in collect_call_sites(&symbol.content) {
                if site.name == symbol.name {
                    continue;
                }
                let candidates = ctx.symbols_named(&site.name);
                let Some(target) = pick_call_target(&candidates, &symbol.file_path) else {
                    continue;
                };
                let confidence = if site.method_of {
                    CALL_METHOD_CONFIDENCE
                } else {
                    CALL_DIRECT_CONFIDENCE
                };
                self.push_edge(symbol, &target, EdgeType::Calls, confidence, by_id, report);
            }
        }
    }
}

/// Prefer same-file candidates, then callable kinds
fn pick_call_target(candidates: &[Symbol], caller_file: &str) -> Option<Symbol> {
    candidates
        .iter()
        .filter(|c| c.symbol_type.is_callable())
        .min_by_key(|c| if c.file_path == caller_file { 0 } else { 1 })
        .or_else(|| candidates.first())
        .cloned()
}

// ============================================================================
// SOURCE SCANNING
// ============================================================================

/// Module specifiers mentioned in import/require declarations
fn parse_import_specifiers(source: &str, language: &str) -> Vec<String> {
    let mut specifiers = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        match language {
            "python" => {
                if let Some(rest) = trimmed.strip_prefix("from ") {
                    if let Some(module) = rest.split_whitespace().next() {
                        specifiers.push(module.to_string());
                    }
                } else if let Some(rest) = trimmed.strip_prefix("import ") {
                    for module in rest.split(',') {
                        let module = module.split_whitespace().next().unwrap_or("");
                        if !module.is_empty() {
                            specifiers.push(module.to_string());
                        }
                    }
                }
            }
            _ => {
                let is_import = trimmed.starts_with("import ")
                    || (trimmed.starts_with("export ") && trimmed.contains(" from "))
                    || trimmed.contains("require(");
                if is_import {
                    if let Some(spec) = quoted_specifier(trimmed) {
                        specifiers.push(spec);
                    }
                }
            }
        }
    }
    specifiers
}

/// The first single- or double-quoted string in a line
fn quoted_specifier(line: &str) -> Option<String> {
    let start = line.find(['\'', '"'])?;
    let quote = line.as_bytes()[start] as char;
    let rest = &line[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Resolve a module specifier to an indexed path.
/// Returns `(path, exact)`; `exact` is false for name-only matches.
fn resolve_module(
    importer: &str,
    specifier: &str,
    language: &str,
    indexed_paths: &[String],
) -> Option<(String, bool)> {
    if language == "python" {
        let relative = specifier.trim_start_matches('.');
        let as_path = relative.replace('.', "/");
        for candidate in [format!("{}.py", as_path), format!("{}/__init__.py", as_path)] {
            if let Some(found) = indexed_paths.iter().find(|p| p.ends_with(&candidate)) {
                return Some((found.clone(), true));
            }
        }
        return name_only_match(specifier.rsplit('.').next()?, indexed_paths);
    }

    if specifier.starts_with('.') {
        let dir = importer.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let joined = normalize_path(&format!("{}/{}", dir, specifier));
        for ext in ["", ".ts", ".tsx", ".js", ".jsx", ".mjs"] {
            let candidate = format!("{}{}", joined, ext);
            if indexed_paths.contains(&candidate) {
                return Some((candidate, true));
            }
        }
        for index in ["/index.ts", "/index.js"] {
            let candidate = format!("{}{}", joined, index);
            if indexed_paths.contains(&candidate) {
                return Some((candidate, true));
            }
        }
        return None;
    }

    // Bare specifier: only a name-level match against indexed files
    name_only_match(specifier.rsplit('/').next()?, indexed_paths)
}

fn name_only_match(name: &str, indexed_paths: &[String]) -> Option<(String, bool)> {
    if name.is_empty() {
        return None;
    }
    indexed_paths
        .iter()
        .find(|p| {
            let stem = p
                .rsplit('/')
                .next()
                .and_then(|f| f.split('.').next())
                .unwrap_or("");
            stem == name
        })
        .map(|p| (p.clone(), false))
}

/// Collapse `.` and `..` components
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[derive(Debug, PartialEq)]
struct CallSite {
    name: String,
    method_of: bool,
}

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "def", "class", "elif",
    "with", "except", "lambda", "assert", "not", "and", "or", "in", "is", "await", "new",
    "typeof", "yield", "super", "constructor",
];

/// Identifiers appearing in call position within a symbol's own text
fn collect_call_sites(content: &str) -> Vec<CallSite> {
    let mut sites = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut prev_token = String::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        // Declaration lines would report the symbol's own header as a call
        if trimmed.starts_with("function ")
            || trimmed.starts_with("def ")
            || trimmed.starts_with("async def ")
            || trimmed.starts_with("class ")
        {
            continue;
        }

        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c.is_alphabetic() || c == '_' || c == '$' {
                let start = i;
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let ident = &line[start..i];
                // Skip whitespace to see whether this is a call
                let mut j = i;
                while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                    j += 1;
                }
                if j < bytes.len()
                    && bytes[j] == b'('
                    && !CALL_KEYWORDS.contains(&ident)
                    && prev_token != "function"
                    && prev_token != "def"
                {
                    let method_of = start > 0 && bytes[start - 1] == b'.';
                    if seen.insert((ident.to_string(), method_of)) {
                        sites.push(CallSite {
                            name: ident.to_string(),
                            method_of,
                        });
                    }
                }
                prev_token = ident.to_string();
            } else {
                i += 1;
            }
        }
    }
    sites
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident;
    use crate::model::SymbolType;
    use chrono::Utc;

    struct MockContext {
        symbols: Vec<Symbol>,
        paths: Vec<String>,
    }

    impl InferenceContext for MockContext {
        fn symbols_named(&self, name: &str) -> Vec<Symbol> {
            self.symbols.iter().filter(|s| s.name == name).cloned().collect()
        }

        fn module_symbol(&self, file_path: &str) -> Option<Symbol> {
            self.symbols
                .iter()
                .find(|s| s.symbol_type == SymbolType::Module && s.file_path == file_path)
                .cloned()
        }

        fn indexed_paths(&self) -> Vec<String> {
            self.paths.clone()
        }
    }

    fn symbol(name: &str, file: &str, symbol_type: SymbolType) -> Symbol {
        let qualified = format!("{}.{}", ident::qualified_path(file), name);
        Symbol {
            id: ident::symbol_id(&qualified, None, "typescript"),
            name: name.to_string(),
            qualified_name: qualified,
            symbol_type,
            language: "typescript".to_string(),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 5,
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

    fn mock_two_files() -> MockContext {
        MockContext {
            symbols: vec![
                symbol("app", "src/app.ts", SymbolType::Module),
                symbol("tax", "src/utils/tax.ts", SymbolType::Module),
                symbol("calculateTax", "src/utils/tax.ts", SymbolType::Function),
                symbol("main", "src/app.ts", SymbolType::Function),
            ],
            paths: vec!["src/app.ts".to_string(), "src/utils/tax.ts".to_string()],
        }
    }

    #[test]
    fn test_exact_import_edge() {
        let ctx = mock_two_files();
        let inferencer = EdgeInferencer::new(0.25, "main");
        let report = inferencer.infer_file(
            "src/app.ts",
            "import { calculateTax } from './utils/tax';\n",
            "typescript",
            &[],
            &ctx,
        );
        assert_eq!(report.edges.len(), 1);
        let edge = &report.edges[0];
        assert_eq!(edge.edge_type, EdgeType::Imports);
        assert!((edge.confidence - IMPORT_EXACT_CONFIDENCE).abs() < 1e-6);
        assert_eq!(edge.origin, EdgeOrigin::AstInference);
    }

    #[test]
    fn test_name_only_import_edge() {
        let ctx = mock_two_files();
        let inferencer = EdgeInferencer::new(0.25, "main");
        let report = inferencer.infer_file(
            "src/app.ts",
            "import tax from 'tax';\n",
            "typescript",
            &[],
            &ctx,
        );
        assert_eq!(report.edges.len(), 1);
        assert!((report.edges[0].confidence - IMPORT_NAME_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn test_direct_call_edge() {
        let ctx = mock_two_files();
        let mut caller = symbol("main", "src/app.ts", SymbolType::Function);
        caller.content = "function main() {\n  const t = calculateTax(100);\n}".to_string();

        let inferencer = EdgeInferencer::new(0.25, "main");
        let report = inferencer.infer_file("src/app.ts", "", "typescript", &[caller], &ctx);
        assert_eq!(report.edges.len(), 1);
        assert_eq!(report.edges[0].edge_type, EdgeType::Calls);
        assert!((report.edges[0].confidence - CALL_DIRECT_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn test_method_call_below_threshold_is_dropped() {
        let ctx = mock_two_files();
        let mut caller = symbol("main", "src/app.ts", SymbolType::Function);
        caller.content = "function main() {\n  svc.calculateTax(100);\n}".to_string();

        let inferencer = EdgeInferencer::new(0.4, "main");
        let report = inferencer.infer_file("src/app.ts", "", "typescript", &[caller], &ctx);
        assert!(report.edges.is_empty());
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn test_python_import_resolution() {
        let ctx = MockContext {
            symbols: vec![
                symbol("app", "app/main.py", SymbolType::Module),
                symbol("tax", "app/services/tax.py", SymbolType::Module),
            ],
            paths: vec!["app/main.py".to_string(), "app/services/tax.py".to_string()],
        };
        let inferencer = EdgeInferencer::new(0.25, "main");
        let report = inferencer.infer_file(
            "app/main.py",
            "from app.services.tax import calculate\n",
            "python",
            &[],
            &ctx,
        );
        assert_eq!(report.edges.len(), 1);
        assert!((report.edges[0].confidence - IMPORT_EXACT_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn test_self_call_ignored() {
        let ctx = mock_two_files();
        let mut rec = symbol("calculateTax", "src/utils/tax.ts", SymbolType::Function);
        rec.content = "function calculateTax(n) {\n  return calculateTax(n - 1);\n}".to_string();

        let inferencer = EdgeInferencer::new(0.25, "main");
        let report = inferencer.infer_file("src/utils/tax.ts", "", "typescript", &[rec], &ctx);
        assert!(report.edges.is_empty());
    }

    #[test]
    fn test_collect_call_sites_distinguishes_method_calls() {
        let sites = collect_call_sites("function f() {\n  helper();\n  obj.method();\n  if (x) {}\n}");
        assert!(sites.contains(&CallSite { name: "helper".to_string(), method_of: false }));
        assert!(sites.contains(&CallSite { name: "method".to_string(), method_of: true }));
        assert!(!sites.iter().any(|s| s.name == "if"));
        assert!(!sites.iter().any(|s| s.name == "f"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("src/./utils/../app"), "src/app");
        assert_eq!(normalize_path("src/utils/tax"), "src/utils/tax");
    }
}
