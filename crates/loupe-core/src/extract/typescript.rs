//! TypeScript / JavaScript Adapter
//!
//! Line-oriented extractor for the TS/JS family: top-level functions,
//! classes with their methods, interfaces with their members, enums,
//! type aliases, and top-level variables (arrow functions count as
//! functions). Brace matching skips string literals and comments but
//! otherwise stays deliberately simple; anything it cannot parse is
//! skipped without failing the file.

use super::LanguageAdapter;
use crate::ident::qualified_name;
use crate::model::{RawSymbol, SymbolType};

pub struct TypeScriptAdapter;

impl TypeScriptAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeScriptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs"]
    }

    fn extract(&self, file_path: &str, source: &str) -> Vec<RawSymbol> {
        let lines: Vec<&str> = source.lines().collect();
        let docs = collect_jsdoc(&lines);
        let mut symbols = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            let decl = strip_modifiers(line.trim_start());

            if let Some(symbol) = extract_declaration(file_path, &lines, i, decl, &docs) {
                let next = symbol.end_line as usize; // resume after the block
                if symbol.symbol_type == SymbolType::Class
                    || symbol.symbol_type == SymbolType::Interface
                {
                    extract_members(file_path, &lines, &symbol, &docs, &mut symbols);
                }
                symbols.push(symbol);
                i = next.max(i + 1);
            } else {
                i += 1;
            }
        }

        symbols
    }
}

/// Strip leading declaration modifiers that do not change the kind
fn strip_modifiers(line: &str) -> &str {
    let mut rest = line;
    loop {
        let before = rest;
        for prefix in ["export ", "default ", "declare ", "abstract "] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped.trim_start();
            }
        }
        if rest == before {
            return rest;
        }
    }
}

/// Take the identifier starting at the head of `s`
fn leading_ident(s: &str) -> Option<&str> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_alphanumeric() && *c != '_' && *c != '$')
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

/// Identifier following `keyword`, requiring a real word boundary so
/// `typeof` never parses as `type`
fn ident_after<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    leading_ident(rest.trim_start())
}

fn extract_declaration(
    file_path: &str,
    lines: &[&str],
    idx: usize,
    decl: &str,
    docs: &[Option<String>],
) -> Option<RawSymbol> {
    let (name, symbol_type) = if let Some(name) = ident_after(decl, "async function") {
        (name, SymbolType::Function)
    } else if let Some(name) = ident_after(decl, "function") {
        (name, SymbolType::Function)
    } else if let Some(name) = ident_after(decl, "class") {
        (name, SymbolType::Class)
    } else if let Some(name) = ident_after(decl, "interface") {
        (name, SymbolType::Interface)
    } else if let Some(name) = ident_after(decl, "const enum") {
        (name, SymbolType::Enum)
    } else if let Some(name) = ident_after(decl, "enum") {
        (name, SymbolType::Enum)
    } else if let Some(name) = ident_after(decl, "type") {
        if decl.contains('=') {
            (name, SymbolType::TypeAlias)
        } else {
            return None;
        }
    } else if let Some(name) = ident_after(decl, "const")
        .or_else(|| ident_after(decl, "let"))
        .or_else(|| ident_after(decl, "var"))
    {
        if is_arrow_function(decl) {
            (name, SymbolType::Function)
        } else {
            (name, SymbolType::Variable)
        }
    } else {
        return None;
    };

    let end = match symbol_type {
        SymbolType::TypeAlias | SymbolType::Variable => statement_end(lines, idx),
        SymbolType::Function if is_arrow_function(decl) && !decl.contains('{') => {
            statement_end(lines, idx)
        }
        _ => block_end(lines, idx),
    };

    let content = lines[idx..=end].join("\n");
    Some(RawSymbol {
        name: name.to_string(),
        qualified_name: qualified_name(file_path, None, name),
        symbol_type,
        start_line: idx as u32 + 1,
        end_line: end as u32 + 1,
        content,
        signature: Some(signature_of(lines[idx])),
        docstring: doc_for(docs, idx),
    })
}

/// Methods and properties inside a class or interface body
fn extract_members(
    file_path: &str,
    lines: &[&str],
    parent: &RawSymbol,
    docs: &[Option<String>],
    out: &mut Vec<RawSymbol>,
) {
    let start = parent.start_line as usize - 1;
    let end = (parent.end_line as usize - 1).min(lines.len().saturating_sub(1));
    let is_interface = parent.symbol_type == SymbolType::Interface;

    let mut depth = 0_i32;
    let mut i = start;
    while i <= end {
        let line_depth_before = depth;
        depth += brace_delta(lines[i]);

        // Members live at depth 1 inside the parent's braces; method
        // bodies sit deeper and are skipped by the depth check alone
        if line_depth_before == 1 {
            let trimmed = lines[i].trim_start();
            if let Some((name, member_type)) = member_declaration(trimmed, is_interface) {
                let member_end = if is_interface || !lines[i].contains('{') {
                    i
                } else {
                    member_block_end(lines, i, end)
                };
                let content = lines[i..=member_end].join("\n");
                out.push(RawSymbol {
                    name: name.to_string(),
                    qualified_name: qualified_name(file_path, Some(&parent.name), name),
                    symbol_type: member_type,
                    start_line: i as u32 + 1,
                    end_line: member_end as u32 + 1,
                    content,
                    signature: Some(signature_of(lines[i])),
                    docstring: doc_for(docs, i),
                });
            }
        }
        i += 1;
    }
}

const MEMBER_MODIFIERS: &[&str] = &[
    "public ", "private ", "protected ", "readonly ", "static ", "async ", "override ",
];

const NON_MEMBER_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "typeof", "function", "else",
    "do", "try", "throw", "super", "this",
];

fn member_declaration(line: &str, is_interface: bool) -> Option<(&str, SymbolType)> {
    let mut rest = line;
    loop {
        let before = rest;
        for m in MEMBER_MODIFIERS {
            if let Some(stripped) = rest.strip_prefix(m) {
                rest = stripped.trim_start();
            }
        }
        if rest == before {
            break;
        }
    }
    for accessor in ["get ", "set "] {
        if let Some(stripped) = rest.strip_prefix(accessor) {
            rest = stripped.trim_start();
        }
    }

    let name = leading_ident(rest)?;
    if NON_MEMBER_KEYWORDS.contains(&name) {
        return None;
    }
    let after = rest[name.len()..].trim_start();
    if after.starts_with('(') || after.starts_with('<') {
        Some((name, SymbolType::Method))
    } else if is_interface && (after.starts_with(':') || after.starts_with('?')) {
        Some((name, SymbolType::Property))
    } else {
        None
    }
}

fn is_arrow_function(decl: &str) -> bool {
    match decl.find('=') {
        Some(eq) => {
            let value = decl[eq + 1..].trim_start();
            value.starts_with("function") || value.contains("=>")
        }
        None => false,
    }
}

fn signature_of(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.find('{') {
        Some(idx) => trimmed[..idx].trim_end().to_string(),
        None => trimmed.trim_end_matches(';').trim_end().to_string(),
    }
}

/// Brace opens/closes of a line, ignoring strings and line comments
fn brace_counts(line: &str) -> (i32, i32) {
    let mut opens = 0;
    let mut closes = 0;
    let mut chars = line.chars().peekable();
    let mut in_string: Option<char> = None;
    while let Some(c) = chars.next() {
        match in_string {
            Some(quote) => {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '"' | '\'' | '`' => in_string = Some(c),
                '/' if chars.peek() == Some(&'/') => return (opens, closes),
                '{' => opens += 1,
                '}' => closes += 1,
                _ => {}
            },
        }
    }
    (opens, closes)
}

/// Net brace depth change of a line
fn brace_delta(line: &str) -> i32 {
    let (opens, closes) = brace_counts(line);
    opens - closes
}

/// End of the brace-delimited block opened at `start`; recovers to the
/// last line when the block never closes
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0_i32;
    let mut opened = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        let (opens, closes) = brace_counts(line);
        if opens > 0 {
            opened = true;
        }
        depth += opens - closes;
        if opened && depth <= 0 {
            return start + offset;
        }
    }
    lines.len().saturating_sub(1)
}

fn member_block_end(lines: &[&str], start: usize, parent_end: usize) -> usize {
    block_end(lines, start).min(parent_end)
}

/// End of a `;`-terminated statement starting at `start`
fn statement_end(lines: &[&str], start: usize) -> usize {
    for (offset, line) in lines[start..].iter().enumerate() {
        if line.trim_end().ends_with(';') || line.trim_end().ends_with('}') {
            return start + offset;
        }
        // A statement without a semicolon still ends at a blank line
        if offset > 0 && line.trim().is_empty() {
            return start + offset - 1;
        }
    }
    lines.len().saturating_sub(1)
}

/// Map of line index -> doc comment ending on the previous line
fn collect_jsdoc(lines: &[&str]) -> Vec<Option<String>> {
    let mut docs: Vec<Option<String>> = vec![None; lines.len()];
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        if trimmed.starts_with("/**") {
            let mut body = Vec::new();
            let mut j = i;
            while j < lines.len() {
                let text = lines[j]
                    .trim()
                    .trim_start_matches("/**")
                    .trim_start_matches('*')
                    .trim_end_matches("*/")
                    .trim();
                if !text.is_empty() {
                    body.push(text.to_string());
                }
                if lines[j].contains("*/") {
                    break;
                }
                j += 1;
            }
            // Attach to the next non-blank line
            let mut target = j + 1;
            while target < lines.len() && lines[target].trim().is_empty() {
                target += 1;
            }
            if target < lines.len() && !body.is_empty() {
                docs[target] = Some(body.join(" "));
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    docs
}

fn doc_for(docs: &[Option<String>], idx: usize) -> Option<String> {
    docs.get(idx).cloned().flatten()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<RawSymbol> {
        TypeScriptAdapter::new().extract("src/sample.ts", source)
    }

    #[test]
    fn test_top_level_function() {
        let symbols = extract(
            "export function validateEmail(email: string): boolean {\n  return email.includes('@');\n}\n",
        );
        assert_eq!(symbols.len(), 1);
        let sym = &symbols[0];
        assert_eq!(sym.name, "validateEmail");
        assert_eq!(sym.symbol_type, SymbolType::Function);
        assert_eq!(sym.qualified_name, "src.sample.validateEmail");
        assert_eq!(sym.start_line, 1);
        assert_eq!(sym.end_line, 3);
        assert_eq!(
            sym.signature.as_deref(),
            Some("export function validateEmail(email: string): boolean")
        );
    }

    #[test]
    fn test_class_with_methods() {
        let source = r#"class TaxService {
  private rate = 0.1;

  calculate(amount: number): number {
    return amount * this.rate;
  }

  async fetchRates(): Promise<void> {
    await load();
  }
}
"#;
        let symbols = extract(source);
        let class = symbols.iter().find(|s| s.symbol_type == SymbolType::Class).unwrap();
        assert_eq!(class.name, "TaxService");
        assert_eq!(class.end_line, 11);

        let methods: Vec<&RawSymbol> = symbols
            .iter()
            .filter(|s| s.symbol_type == SymbolType::Method)
            .collect();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "calculate");
        assert_eq!(methods[0].qualified_name, "src.sample.TaxService.calculate");
        assert_eq!(methods[1].name, "fetchRates");
    }

    #[test]
    fn test_interface_members() {
        let source = r#"export interface UserStore {
  count: number;
  find(id: string): User;
}
"#;
        let symbols = extract(source);
        assert!(symbols.iter().any(|s| s.symbol_type == SymbolType::Interface));
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::Property && s.name == "count"));
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::Method && s.name == "find"));
    }

    #[test]
    fn test_arrow_function_const() {
        let symbols = extract("export const formatCurrency = (n: number) => `$${n.toFixed(2)}`;\n");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol_type, SymbolType::Function);
        assert_eq!(symbols[0].name, "formatCurrency");
    }

    #[test]
    fn test_type_alias_and_enum() {
        let symbols = extract("type UserId = string;\nenum Color { Red, Green }\n");
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::TypeAlias && s.name == "UserId"));
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::Enum && s.name == "Color"));
    }

    #[test]
    fn test_jsdoc_attached() {
        let source = "/** Validates an email address. */\nfunction validateEmail(email) {\n  return true;\n}\n";
        let symbols = extract(source);
        assert_eq!(
            symbols[0].docstring.as_deref(),
            Some("Validates an email address.")
        );
    }

    #[test]
    fn test_malformed_input_does_not_panic() {
        let symbols = extract("function broken( {{{ \nclass \n}}}}}}\nconst = ;\n");
        // Nothing useful, but no panic and no bogus names
        assert!(symbols.iter().all(|s| !s.name.is_empty()));
    }

    #[test]
    fn test_unclosed_block_recovers_to_eof() {
        let symbols = extract("function f() {\n  const a = 1;\n");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].end_line, 2);
    }

    #[test]
    fn test_braces_in_strings_ignored() {
        let source = "function f() {\n  const s = \"{\";\n  return s;\n}\nfunction g() {\n  return 1;\n}\n";
        let symbols = extract(source);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].end_line, 4);
    }
}
