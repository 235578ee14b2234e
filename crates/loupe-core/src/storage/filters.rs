//! Path scoping SQL helpers
//!
//! Converts retrieval-facing globs and prefixes into LIKE clauses.
//! Every generated LIKE clause declares `ESCAPE '\'` so literal
//! `%`/`_`/`\` characters in paths cannot act as wildcards.

use crate::model::ScopeFilter;

/// Convert a glob pattern to a SQL LIKE pattern.
///
/// `**` and `*` both map to `%` (LIKE has no path-aware wildcard),
/// `?` maps to `_`, and literal `%`, `_`, `\` are escaped.
pub fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                }
                like.push('%');
            }
            '?' => like.push('_'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            other => like.push(other),
        }
    }
    like
}

/// Escape LIKE wildcard characters in a literal string
pub fn escape_like_literal(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build a `(clause, params)` pair restricting `column` to the scope.
/// Returns an empty clause when the scope is inactive.
pub fn scope_clause(scope: &ScopeFilter, column: &str) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(prefix) = &scope.path_prefix {
        clauses.push(format!("{} LIKE ? ESCAPE '\\'", column));
        params.push(format!("{}%", escape_like_literal(prefix)));
    }

    if !scope.file_patterns.is_empty() {
        let pattern_clauses: Vec<String> = scope
            .file_patterns
            .iter()
            .map(|p| {
                params.push(glob_to_like(p));
                format!("{} LIKE ? ESCAPE '\\'", column)
            })
            .collect();
        clauses.push(format!("({})", pattern_clauses.join(" OR ")));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" AND {}", clauses.join(" AND ")), params)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_like_wildcards() {
        assert_eq!(glob_to_like("auth-*"), "auth-%");
        assert_eq!(glob_to_like("**/*.ts"), "%/%.ts");
        assert_eq!(glob_to_like("file?.py"), "file_.py");
    }

    #[test]
    fn test_glob_to_like_escapes_literals() {
        assert_eq!(glob_to_like("100%_done"), "100\\%\\_done");
        assert_eq!(glob_to_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_escape_like_literal() {
        assert_eq!(escape_like_literal("src/a_b"), "src/a\\_b");
    }

    #[test]
    fn test_scope_clause_inactive() {
        let (clause, params) = scope_clause(&ScopeFilter::default(), "file_path");
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_scope_clause_prefix_and_patterns() {
        let scope = ScopeFilter {
            path_prefix: Some("src/".to_string()),
            file_patterns: vec!["auth-*".to_string(), "*.py".to_string()],
        };
        let (clause, params) = scope_clause(&scope, "file_path");
        assert!(clause.contains("ESCAPE"));
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], "src/%");
        assert_eq!(params[1], "auth-%");
        assert_eq!(params[2], "%.py");
    }
}
