//! Python Adapter
//!
//! Indentation-oriented extractor: top-level functions and classes,
//! methods and class attributes one level inside a class body, module
//! constants, and docstrings. Decorators are folded into the symbol
//! they decorate.

use super::LanguageAdapter;
use crate::ident::qualified_name;
use crate::model::{RawSymbol, SymbolType};

pub struct PythonAdapter;

impl PythonAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn extract(&self, file_path: &str, source: &str) -> Vec<RawSymbol> {
        let lines: Vec<&str> = source.lines().collect();
        let mut symbols = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if indent_of(line) != 0 || line.trim().is_empty() {
                i += 1;
                continue;
            }

            if let Some(symbol) = extract_def(file_path, &lines, i, 0, None) {
                let resume = symbol.end_line as usize;
                if symbol.symbol_type == SymbolType::Class {
                    extract_class_members(file_path, &lines, &symbol, &mut symbols);
                }
                symbols.push(symbol);
                i = resume.max(i + 1);
            } else if let Some(symbol) = extract_assignment(file_path, &lines, i, None) {
                symbols.push(symbol);
                i += 1;
            } else {
                i += 1;
            }
        }

        symbols
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn leading_ident(s: &str) -> Option<&str> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_alphanumeric() && *c != '_')
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

/// A `def` / `async def` / `class` declaration at the given indent
fn extract_def(
    file_path: &str,
    lines: &[&str],
    idx: usize,
    indent: usize,
    parent: Option<&str>,
) -> Option<RawSymbol> {
    let trimmed = lines[idx].trim_start();
    let (name, symbol_type) = if let Some(rest) = trimmed.strip_prefix("async def ") {
        (
            leading_ident(rest)?,
            if parent.is_some() {
                SymbolType::Method
            } else {
                SymbolType::Function
            },
        )
    } else if let Some(rest) = trimmed.strip_prefix("def ") {
        (
            leading_ident(rest)?,
            if parent.is_some() {
                SymbolType::Method
            } else {
                SymbolType::Function
            },
        )
    } else if let Some(rest) = trimmed.strip_prefix("class ") {
        (leading_ident(rest)?, SymbolType::Class)
    } else {
        return None;
    };

    let start = decorator_start(lines, idx, indent);
    let end = suite_end(lines, idx, indent);
    let content = lines[start..=end].join("\n");

    Some(RawSymbol {
        name: name.to_string(),
        qualified_name: qualified_name(file_path, parent, name),
        symbol_type,
        start_line: start as u32 + 1,
        end_line: end as u32 + 1,
        content,
        signature: Some(signature_of(lines, idx)),
        docstring: docstring_of(lines, idx, indent),
    })
}

/// Methods and class attributes one indentation level into a class body
fn extract_class_members(
    file_path: &str,
    lines: &[&str],
    class: &RawSymbol,
    out: &mut Vec<RawSymbol>,
) {
    let class_idx = class
        .content
        .lines()
        .position(|l| l.trim_start().starts_with("class "))
        .map(|offset| class.start_line as usize - 1 + offset)
        .unwrap_or(class.start_line as usize - 1);
    let end = (class.end_line as usize - 1).min(lines.len().saturating_sub(1));

    // First indented statement defines the member indent
    let member_indent = lines[class_idx + 1..=end]
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .unwrap_or(4);
    if member_indent == 0 {
        return;
    }

    let mut i = class_idx + 1;
    while i <= end {
        let line = lines[i];
        if line.trim().is_empty() || indent_of(line) != member_indent {
            i += 1;
            continue;
        }

        if let Some(member) = extract_def(file_path, lines, i, member_indent, Some(&class.name)) {
            let resume = member.end_line as usize;
            out.push(member);
            i = resume.max(i + 1);
        } else if let Some(mut attr) = extract_assignment(file_path, lines, i, Some(&class.name)) {
            attr.symbol_type = SymbolType::Property;
            out.push(attr);
            i += 1;
        } else {
            i += 1;
        }
    }
}

/// A simple `NAME = value` binding
fn extract_assignment(
    file_path: &str,
    lines: &[&str],
    idx: usize,
    parent: Option<&str>,
) -> Option<RawSymbol> {
    let trimmed = lines[idx].trim_start();
    let name = leading_ident(trimmed)?;
    let rest = trimmed[name.len()..].trim_start();
    if !rest.starts_with('=') || rest.starts_with("==") {
        return None;
    }
    if PYTHON_KEYWORDS.contains(&name) {
        return None;
    }

    Some(RawSymbol {
        name: name.to_string(),
        qualified_name: qualified_name(file_path, parent, name),
        symbol_type: SymbolType::Variable,
        start_line: idx as u32 + 1,
        end_line: idx as u32 + 1,
        content: lines[idx].to_string(),
        signature: None,
        docstring: None,
    })
}

const PYTHON_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "return", "import", "from", "try", "except",
    "finally", "with", "pass", "raise", "assert", "lambda", "yield", "global", "nonlocal",
    "del", "not", "and", "or", "in", "is", "None", "True", "False", "match", "case",
];

/// Start index including any decorators directly above
fn decorator_start(lines: &[&str], idx: usize, indent: usize) -> usize {
    let mut start = idx;
    while start > 0 {
        let above = lines[start - 1];
        if indent_of(above) == indent && above.trim_start().starts_with('@') {
            start -= 1;
        } else {
            break;
        }
    }
    start
}

/// Last line of the suite introduced at `idx`: scan until a non-blank
/// line at or below the declaration indent
fn suite_end(lines: &[&str], idx: usize, indent: usize) -> usize {
    let mut end = idx;
    for (offset, line) in lines[idx + 1..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= indent {
            break;
        }
        end = idx + 1 + offset;
    }
    end
}

/// The `def`/`class` header, joined across continuation lines up to `:`
fn signature_of(lines: &[&str], idx: usize) -> String {
    let mut parts = Vec::new();
    for line in &lines[idx..lines.len().min(idx + 5)] {
        let trimmed = line.trim();
        parts.push(trimmed.trim_end_matches(':').to_string());
        if trimmed.ends_with(':') {
            break;
        }
    }
    parts.join(" ")
}

/// Docstring: a string literal opening the suite
fn docstring_of(lines: &[&str], idx: usize, indent: usize) -> Option<String> {
    // Find the first non-blank line after the header's `:`
    let mut header_end = idx;
    for (offset, line) in lines[idx..].iter().enumerate() {
        if line.trim_end().ends_with(':') {
            header_end = idx + offset;
            break;
        }
    }
    let first = lines[header_end + 1..]
        .iter()
        .enumerate()
        .find(|(_, l)| !l.trim().is_empty())
        .map(|(offset, _)| header_end + 1 + offset)?;

    let trimmed = lines[first].trim();
    let quote = if trimmed.starts_with("\"\"\"") {
        "\"\"\""
    } else if trimmed.starts_with("'''") {
        "'''"
    } else {
        return None;
    };
    if indent_of(lines[first]) <= indent {
        return None;
    }

    let inner = trimmed.trim_start_matches(quote);
    if inner.contains(quote) {
        // Single-line docstring
        return Some(inner.trim_end_matches(quote).trim().to_string());
    }

    let mut parts = vec![inner.trim().to_string()];
    for line in &lines[first + 1..] {
        let text = line.trim();
        if let Some(stripped) = text.strip_suffix(quote) {
            if !stripped.trim().is_empty() {
                parts.push(stripped.trim().to_string());
            }
            break;
        }
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }
    Some(
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<RawSymbol> {
        PythonAdapter::new().extract("app/services/tax.py", source)
    }

    #[test]
    fn test_top_level_function() {
        let source = "def create_user(email, name):\n    user = User(email, name)\n    return user\n";
        let symbols = extract(source);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "create_user");
        assert_eq!(symbols[0].symbol_type, SymbolType::Function);
        assert_eq!(symbols[0].qualified_name, "app.services.tax.create_user");
        assert_eq!(symbols[0].end_line, 3);
    }

    #[test]
    fn test_class_with_methods_and_attrs() {
        let source = r#"class TaxService:
    RATE = 0.1

    def calculate(self, amount):
        return amount * self.RATE

    async def fetch_rates(self):
        await load()

def standalone():
    pass
"#;
        let symbols = extract(source);
        let class = symbols.iter().find(|s| s.symbol_type == SymbolType::Class).unwrap();
        assert_eq!(class.name, "TaxService");
        assert_eq!(class.end_line, 8);

        let methods: Vec<&str> = symbols
            .iter()
            .filter(|s| s.symbol_type == SymbolType::Method)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(methods, vec!["calculate", "fetch_rates"]);
        assert_eq!(
            symbols
                .iter()
                .find(|s| s.name == "calculate")
                .unwrap()
                .qualified_name,
            "app.services.tax.TaxService.calculate"
        );

        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::Property && s.name == "RATE"));
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::Function && s.name == "standalone"));
    }

    #[test]
    fn test_docstring_extraction() {
        let source = "def validate_email(email):\n    \"\"\"Check that an email address is well-formed.\"\"\"\n    return '@' in email\n";
        let symbols = extract(source);
        assert_eq!(
            symbols[0].docstring.as_deref(),
            Some("Check that an email address is well-formed.")
        );
    }

    #[test]
    fn test_multiline_docstring() {
        let source = "def f():\n    '''First line.\n    Second line.\n    '''\n    pass\n";
        let symbols = extract(source);
        assert_eq!(symbols[0].docstring.as_deref(), Some("First line. Second line."));
    }

    #[test]
    fn test_decorator_included() {
        let source = "@app.route('/users')\ndef list_users():\n    return []\n";
        let symbols = extract(source);
        assert_eq!(symbols[0].start_line, 1);
        assert!(symbols[0].content.starts_with("@app.route"));
    }

    #[test]
    fn test_nested_function_not_top_level() {
        let source = "def outer():\n    def inner():\n        pass\n    return inner\n";
        let symbols = extract(source);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "outer");
    }

    #[test]
    fn test_module_constant() {
        let symbols = extract("MAX_RETRIES = 3\n");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol_type, SymbolType::Variable);
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let symbols = extract("x == 3\n");
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_malformed_input_does_not_panic() {
        let symbols = extract("def (:\nclass :::\n   ???\n");
        assert!(symbols.iter().all(|s| !s.name.is_empty()));
    }
}
