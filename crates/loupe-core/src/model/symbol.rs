//! Symbol - a named, located code entity
//!
//! Symbols carry a deterministic identity derived from their qualified
//! name, signature, and language, so the id survives file moves and
//! renames of the containing path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// SYMBOL TYPES
// ============================================================================

/// Kinds of code symbols the extractors produce
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    /// A free function
    #[default]
    Function,
    /// A class declaration
    Class,
    /// A method on a class or interface
    Method,
    /// An interface declaration
    Interface,
    /// A module or namespace
    Module,
    /// An enum declaration
    Enum,
    /// A top-level variable or constant
    Variable,
    /// A type alias
    TypeAlias,
    /// A property on a class or interface
    Property,
}

impl SymbolType {
    /// Stable lowercase serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolType::Function => "function",
            SymbolType::Class => "class",
            SymbolType::Method => "method",
            SymbolType::Interface => "interface",
            SymbolType::Module => "module",
            SymbolType::Enum => "enum",
            SymbolType::Variable => "variable",
            SymbolType::TypeAlias => "type_alias",
            SymbolType::Property => "property",
        }
    }

    /// Parse from the stable string form
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "function" => SymbolType::Function,
            "class" => SymbolType::Class,
            "method" => SymbolType::Method,
            "interface" => SymbolType::Interface,
            "module" => SymbolType::Module,
            "enum" => SymbolType::Enum,
            "variable" => SymbolType::Variable,
            "type_alias" => SymbolType::TypeAlias,
            "property" => SymbolType::Property,
            _ => SymbolType::Function,
        }
    }

    /// Whether this kind can appear as the target of a CALLS edge
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolType::Function | SymbolType::Method | SymbolType::Class
        )
    }
}

impl std::fmt::Display for SymbolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RAW SYMBOL
// ============================================================================

/// A symbol as produced by a language adapter, before identity is assigned
///
/// Adapters fill in what they can see in the source text; the indexing
/// layer derives canonical ids, content hashes, and branch placement.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSymbol {
    /// Simple name (`calculate`)
    pub name: String,
    /// Dotted qualified name (`src/utils/tax.TaxService.calculate`)
    pub qualified_name: String,
    /// Kind of symbol
    pub symbol_type: SymbolType,
    /// 1-based first line of the definition
    pub start_line: u32,
    /// 1-based last line of the definition (inclusive)
    pub end_line: u32,
    /// Full source text of the definition
    pub content: String,
    /// Declaration line / signature when the adapter can isolate it
    pub signature: Option<String>,
    /// Leading doc comment when present
    pub docstring: Option<String>,
}

// ============================================================================
// SYMBOL
// ============================================================================

/// A persisted symbol row
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    /// Deterministic id: first 16 hex chars of
    /// sha256(qualified_name :: signature :: language)
    pub id: String,
    /// Simple name
    pub name: String,
    /// Dotted qualified name
    pub qualified_name: String,
    /// Kind of symbol
    pub symbol_type: SymbolType,
    /// Language id (`typescript`, `python`, ...)
    pub language: String,
    /// Workspace-relative path of the defining file
    pub file_path: String,
    /// 1-based first line
    pub start_line: u32,
    /// 1-based last line (inclusive)
    pub end_line: u32,
    /// Full source text; may be empty for external symbols
    pub content: String,
    /// Declaration signature when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Doc comment when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// Full-length hex sha256 of `content`
    pub content_hash: String,
    /// Whether this symbol comes from vendored/third-party code
    pub is_external: bool,
    /// Branch this row belongs to
    pub branch: String,
    /// Model that produced this symbol's embedding, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model_id: Option<String>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Revision counter, bumped on every upsert that changes content
    pub revision_id: i64,
}

impl Symbol {
    /// Location string in `file:start-end` form
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }

    /// Directory component of the file path (empty for root-level files)
    pub fn directory(&self) -> &str {
        match self.file_path.rfind('/') {
            Some(idx) => &self.file_path[..idx],
            None => "",
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
    fn test_symbol_type_round_trip() {
        for ty in [
            SymbolType::Function,
            SymbolType::Class,
            SymbolType::Method,
            SymbolType::Interface,
            SymbolType::Module,
            SymbolType::Enum,
            SymbolType::Variable,
            SymbolType::TypeAlias,
            SymbolType::Property,
        ] {
            assert_eq!(SymbolType::parse_name(ty.as_str()), ty);
        }
    }

    #[test]
    fn test_symbol_type_unknown_defaults_to_function() {
        assert_eq!(SymbolType::parse_name("gizmo"), SymbolType::Function);
    }

    #[test]
    fn test_callable_kinds() {
        assert!(SymbolType::Function.is_callable());
        assert!(SymbolType::Method.is_callable());
        assert!(!SymbolType::Interface.is_callable());
        assert!(!SymbolType::TypeAlias.is_callable());
    }

    #[test]
    fn test_directory_component() {
        let mut sym = test_symbol();
        sym.file_path = "src/utils/tax.ts".to_string();
        assert_eq!(sym.directory(), "src/utils");

        sym.file_path = "main.py".to_string();
        assert_eq!(sym.directory(), "");
    }

    fn test_symbol() -> Symbol {
        Symbol {
            id: "0123456789abcdef".to_string(),
            name: "calculate".to_string(),
            qualified_name: "src/utils/tax.TaxService.calculate".to_string(),
            symbol_type: SymbolType::Method,
            language: "typescript".to_string(),
            file_path: "src/utils/tax.ts".to_string(),
            start_line: 10,
            end_line: 20,
            content: "calculate() {}".to_string(),
            signature: Some("calculate(): number".to_string()),
            docstring: None,
            content_hash: String::new(),
            is_external: false,
            branch: "main".to_string(),
            embedding_model_id: None,
            updated_at: Utc::now(),
            revision_id: 1,
        }
    }
}
