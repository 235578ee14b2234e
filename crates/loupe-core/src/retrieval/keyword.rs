//! Keyword Query Sanitization
//!
//! Converts free-form user text into a MATCH expression that always
//! parses under the FTS dialect. Tokens are individually quoted; longer
//! tokens also get a prefix variant. An input that sanitizes to nothing
//! produces no search at all.

/// Reserved FTS operators dropped from user input
const RESERVED: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Characters with operator meaning in MATCH expressions
const OPERATOR_CHARS: &[char] = &['"', ':', '^', '(', ')'];

/// Minimum token length kept after splitting
const MIN_TOKEN_LEN: usize = 2;

/// Token length at which a prefix variant is added
const PREFIX_TOKEN_LEN: usize = 4;

/// Sanitize user text into an FTS MATCH expression.
///
/// Returns an empty string when nothing searchable remains; callers
/// must treat that as "no keyword search" rather than an error.
pub fn sanitize_match_query(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if OPERATOR_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let mut terms = Vec::new();
    for token in cleaned.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if token.len() < MIN_TOKEN_LEN {
            continue;
        }
        if RESERVED.iter().any(|r| token.eq_ignore_ascii_case(r)) {
            continue;
        }
        if token.len() >= PREFIX_TOKEN_LEN {
            terms.push(format!("(\"{}\" OR \"{}\"*)", token, token));
        } else {
            terms.push(format!("\"{}\"", token));
        }
    }

    terms.join(" AND ")
}

// ============================================================================
// TESTS
// ============================================================================
