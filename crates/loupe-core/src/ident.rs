//! Canonical Identity
//!
//! Deterministic ids and hashes for symbols, edges, and chunks. Identity
//! must be stable across runs and across file moves: a symbol keeps its
//! id as long as its qualified name, signature, and language are
//! unchanged.

use sha2::{Digest, Sha256};

use crate::model::EdgeType;

/// Hex length of truncated entity ids
pub const ID_LEN: usize = 16;

/// Full-length hex sha256 of arbitrary bytes
pub fn content_hash(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    format!("{:x}", hash)
}

fn truncated(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)[..ID_LEN].to_string()
}

/// Canonical symbol id: sha256(qualified_name :: signature :: language),
/// hex-truncated to 16 chars. An absent signature hashes as the empty
/// string so overload-free languages stay stable.
pub fn symbol_id(qualified_name: &str, signature: Option<&str>, language: &str) -> String {
    truncated(&format!(
        "{}::{}::{}",
        qualified_name,
        signature.unwrap_or(""),
        language
    ))
}

/// Canonical edge id: sha256(source_id :: target_id :: type)
pub fn edge_id(source_id: &str, target_id: &str, edge_type: EdgeType) -> String {
    truncated(&format!("{}::{}::{}", source_id, target_id, edge_type.as_str()))
}

/// Chunk id derived from location and content
pub fn chunk_id(file_path: &str, start_line: u32, end_line: u32, content_hash: &str) -> String {
    truncated(&format!(
        "{}::{}::{}::{}",
        file_path, start_line, end_line, content_hash
    ))
}

/// Normalize a file path into the prefix of a qualified name:
/// separators unified to `/`, extension stripped, then `/` → `.`
pub fn qualified_path(file_path: &str) -> String {
    let unified = file_path.replace('\\', "/");
    let trimmed = unified.trim_start_matches("./");
    let without_ext = match trimmed.rfind('.') {
        // Only strip when the dot is inside the final component
        Some(idx) if !trimmed[idx..].contains('/') => &trimmed[..idx],
        _ => trimmed,
    };
    without_ext.replace('/', ".")
}

/// Join a normalized path with a dotted symbol path, optionally nested
/// under a parent (class/interface) name.
pub fn qualified_name(file_path: &str, parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{}.{}.{}", qualified_path(file_path), p, name),
        None => format!("{}.{}", qualified_path(file_path), name),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash("function foo() {}");
        let b = content_hash("function foo() {}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_symbol_id_stable_across_moves() {
        // Moving the file does not change the qualified name inputs here;
        // identity depends only on qualified_name + signature + language.
        let a = symbol_id("src/utils/tax.calculate", Some("calculate(n)"), "typescript");
        let b = symbol_id("src/utils/tax.calculate", Some("calculate(n)"), "typescript");
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LEN);
    }

    #[test]
    fn test_symbol_id_changes_with_signature() {
        let a = symbol_id("m.f", Some("f(a)"), "python");
        let b = symbol_id("m.f", Some("f(a, b)"), "python");
        assert_ne!(a, b);
    }

    #[test]
    fn test_symbol_id_missing_signature() {
        let a = symbol_id("m.f", None, "python");
        let b = symbol_id("m.f", Some(""), "python");
        assert_eq!(a, b);
    }

    #[test]
    fn test_qualified_path_strips_extension() {
        assert_eq!(qualified_path("src/utils/tax.ts"), "src.utils.tax");
        assert_eq!(qualified_path("./src/app.py"), "src.app");
        assert_eq!(qualified_path("src\\win\\mod.ts"), "src.win.mod");
        // A dot in a directory name is not an extension
        assert_eq!(qualified_path("v1.2/api"), "v1.2.api");
    }

    #[test]
    fn test_qualified_name_nesting() {
        assert_eq!(
            qualified_name("src/utils/tax.ts", Some("TaxService"), "calculate"),
            "src.utils.tax.TaxService.calculate"
        );
        assert_eq!(
            qualified_name("src/utils/tax.ts", None, "round"),
            "src.utils.tax.round"
        );
    }

    #[test]
    fn test_edge_id_distinct_per_type() {
        let calls = edge_id("a", "b", EdgeType::Calls);
        let imports = edge_id("a", "b", EdgeType::Imports);
        assert_ne!(calls, imports);
    }
}
