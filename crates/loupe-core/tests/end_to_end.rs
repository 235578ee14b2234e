//! End-to-end scenarios over the full engine: index a workspace on
//! disk, then query through the facade.

use loupe_core::{ConfidenceTier, Loupe, QueryOptions};

fn write(dir: &std::path::Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn email_validator_discovery() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/validators.ts",
        "/** Checks that an email address is well-formed. */\nexport function validateEmail(email: string): boolean {\n  return email.includes('@') && email.includes('.');\n}\n",
    );
    write(
        dir.path(),
        "src/users.ts",
        "export function createUser(email: string, name: string) {\n  return { email, name };\n}\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    let options = loupe
        .default_query("function that validates email addresses")
        .with_max_tokens(4000);
    let result = loupe.smart_query(options).await.unwrap();

    assert!(
        result.context.contains("validateEmail"),
        "expected validateEmail in the context pack"
    );
    assert!(result.token_count <= 4000);
    assert!(result.token_count > 0);
}

#[tokio::test]
async fn worktree_copies_deduplicate_in_context() {
    let dir = tempfile::tempdir().unwrap();
    // Byte-identical copies at different paths
    let tax = "function calculateTax(n){\n  // tax calculation\n  return n*0.1;\n}\n";
    write(dir.path(), "worktree-a/tax.js", tax);
    write(dir.path(), "worktree-b/tax.js", tax);
    write(
        dir.path(),
        "fmt.js",
        "function formatCurrency(n){return '$' + n.toFixed(2);}\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    let result = loupe
        .smart_query(loupe.default_query("tax calculation"))
        .await
        .unwrap();

    let tax_hits = result
        .symbols
        .iter()
        .filter(|s| s.name == "calculateTax")
        .count();
    assert_eq!(tax_hits, 1, "identical copies must collapse to one");

    // No two included symbols share a non-empty content hash
    let mut hashes: Vec<&str> = result
        .symbols
        .iter()
        .map(|s| s.content_hash.as_str())
        .filter(|h| !h.is_empty())
        .collect();
    hashes.sort_unstable();
    let before = hashes.len();
    hashes.dedup();
    assert_eq!(before, hashes.len());
}

#[tokio::test]
async fn path_scope_restricts_results() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "user-service.ts",
        "export function loginHistory(user: string) {\n  return [];\n}\n",
    );
    write(
        dir.path(),
        "auth-controller.ts",
        "export function login(user: string) {\n  return true;\n}\nexport function signup(user: string) {\n  return true;\n}\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    let options = loupe
        .default_query("login signup")
        .with_file_patterns(vec!["auth-*".to_string()]);
    let result = loupe.smart_query(options).await.unwrap();

    assert!(!result.symbols.is_empty());
    assert!(
        result.symbols.iter().all(|s| s.file_path.starts_with("auth-")),
        "every symbol must come from an auth-* file"
    );
}

#[tokio::test]
async fn fts_operator_injection_is_sanitized() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "store.ts",
        "export function createRecord(data: object) {\n  deleteStale();\n  return save(data);\n}\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    // AND would be an FTS operator; sanitization drops it
    let result = loupe
        .smart_query(loupe.default_query("create AND delete"))
        .await
        .unwrap();
    assert!(
        result.symbols.iter().any(|s| s.name == "createRecord"),
        "the create term should still match"
    );
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/a.py",
        "def first():\n    return second()\n\ndef second():\n    return 1\n",
    );
    write(
        dir.path(),
        "src/b.py",
        "from src.a import first\n\ndef caller():\n    return first()\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.rebuild().await.unwrap();
    let first = loupe.status().unwrap();

    loupe.rebuild().await.unwrap();
    let second = loupe.status().unwrap();

    assert_eq!(first.total_symbols, second.total_symbols);
    assert_eq!(first.total_edges, second.total_edges);
    assert_eq!(first.total_chunks, second.total_chunks);
    assert!(first.total_symbols > 0);
}

#[tokio::test]
async fn empty_query_degrades_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export const x = 1;\n");

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    // Pure operator soup sanitizes to nothing
    let result = loupe
        .smart_query(QueryOptions::text("\" : ^ ( )"))
        .await
        .unwrap();
    assert_eq!(result.confidence.tier, ConfidenceTier::Degraded);
    assert_eq!(result.token_count, 0);
}

#[tokio::test]
async fn impact_follows_cross_file_calls() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/core.ts",
        "export function parseConfig(raw: string) {\n  return JSON.parse(raw);\n}\n",
    );
    write(
        dir.path(),
        "src/app.ts",
        "import { parseConfig } from './core';\n\nexport function boot(raw: string) {\n  return parseConfig(raw);\n}\n",
    );

    let loupe = Loupe::open(dir.path()).unwrap();
    loupe.refresh().await.unwrap();

    match loupe.symbol_impact("parseConfig", None).unwrap() {
        loupe_core::ImpactOutcome::Found(report) => {
            assert!(
                report.direct.iter().any(|d| d.name == "boot"),
                "boot calls parseConfig and must appear as a direct dependent"
            );
        }
        loupe_core::ImpactOutcome::NotFound { query } => {
            panic!("symbol {} should resolve", query)
        }
    }
}
