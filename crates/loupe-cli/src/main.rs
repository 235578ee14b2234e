//! Loupe CLI
//!
//! Thin command surface over the engine. Exit codes: 0 success,
//! 2 config/usage error, 3 store/migration error, 4 index busy.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use loupe_core::retrieval::Direction;
use loupe_core::{Loupe, LoupeError, RerankMode, SymbolType};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loupe", version, about = "Code intelligence for a source tree")]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hybrid-retrieval query returning a token-budgeted context pack
    Query {
        /// Natural-language or keyword query
        query: String,
        /// Token budget for the context
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Graph expansion depth
        #[arg(long)]
        graph_depth: Option<usize>,
        /// Reranking mode: none, heuristic, bm25, cross-encoder
        #[arg(long)]
        rerank: Option<String>,
        /// Retrieval granularity: auto, symbol, chunk, file
        #[arg(long)]
        granularity: Option<String>,
        /// Restrict results to this path prefix
        #[arg(long)]
        path_prefix: Option<String>,
        /// Restrict results to files matching these globs
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// Restrict results to these symbol types
        #[arg(long = "symbol-type")]
        symbol_types: Vec<String>,
    },
    /// Who breaks if this symbol changes
    Impact {
        /// Symbol name, qualified name, or id
        symbol: String,
        /// Traversal depth
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Callers/callees around a symbol
    Graph {
        /// Symbol name, qualified name, or id
        symbol: String,
        /// callers, callees, or both
        #[arg(long, default_value = "both")]
        direction: String,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long, default_value_t = 10)]
        max_fan_out: usize,
    },
    /// Ranked symbol search
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Restrict to one symbol type
        #[arg(long)]
        symbol_type: Option<String>,
    },
    /// Files ranked by graph importance
    Map {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Restrict to a directory prefix
        #[arg(long)]
        directory: Option<String>,
    },
    /// Index statistics
    Status,
    /// Incremental re-index of changed files
    Refresh,
    /// Full re-index from scratch
    Rebuild,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::from(3);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), LoupeError> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().map_err(loupe_core::IndexError::from)?,
    };
    let loupe = Loupe::open(&root)?;

    match cli.command {
        Command::Query {
            query,
            max_tokens,
            graph_depth,
            rerank,
            granularity,
            path_prefix,
            patterns,
            symbol_types,
        } => {
            let mut options = loupe.default_query(query);
            if let Some(max_tokens) = max_tokens {
                options.max_tokens = max_tokens;
            }
            if let Some(depth) = graph_depth {
                options.graph_depth = depth;
            }
            if let Some(rerank) = rerank {
                options.rerank = RerankMode::parse_name(&rerank);
            }
            if let Some(granularity) = granularity {
                options.granularity = parse_granularity(&granularity);
            }
            if let Some(prefix) = path_prefix {
                options.scope.path_prefix = Some(prefix);
            }
            options.scope.file_patterns = patterns;
            options.symbol_types = symbol_types
                .iter()
                .map(|t| SymbolType::parse_name(t))
                .collect();

            let result = loupe.smart_query(options).await?;
            if cli.json {
                print_json(&result);
            } else {
                println!("{}", result.context);
                eprintln!(
                    "-- {} symbols, {} tokens, confidence {} ({})",
                    result.symbols.len(),
                    result.token_count,
                    result.confidence.tier.as_str(),
                    result.confidence.diagnostics.tier_reason
                );
            }
        }
        Command::Impact { symbol, max_depth } => {
            let outcome = loupe.symbol_impact(&symbol, max_depth)?;
            print_json(&outcome);
        }
        Command::Graph {
            symbol,
            direction,
            depth,
            max_fan_out,
        } => {
            let outcome = loupe.call_graph(
                &symbol,
                Direction::parse_name(&direction),
                depth,
                max_fan_out,
            )?;
            print_json(&outcome);
        }
        Command::Search {
            query,
            limit,
            symbol_type,
        } => {
            let hits = loupe.symbol_search(
                &query,
                limit,
                symbol_type.as_deref().map(SymbolType::parse_name),
            )?;
            if cli.json {
                print_json(&hits);
            } else {
                for hit in hits {
                    println!(
                        "{:<10} {}  {}",
                        hit.symbol.symbol_type.as_str(),
                        hit.symbol.qualified_name,
                        hit.symbol.location()
                    );
                }
            }
        }
        Command::Map { limit, directory } => {
            let entries = loupe.repo_map(limit, directory.as_deref())?;
            if cli.json {
                print_json(&entries);
            } else {
                for entry in entries {
                    println!(
                        "{:>8.5}  {}  [{}]",
                        entry.importance_score, entry.file_path, entry.symbol_summary
                    );
                }
            }
        }
        Command::Status => {
            let status = loupe.status()?;
            print_json(&status);
        }
        Command::Refresh => {
            let outcome = loupe.refresh().await?;
            print_json(&outcome);
        }
        Command::Rebuild => {
            let outcome = loupe.rebuild().await?;
            print_json(&outcome);
        }
    }

    Ok(())
}

fn parse_granularity(s: &str) -> loupe_core::Granularity {
    match s.to_lowercase().as_str() {
        "symbol" => loupe_core::Granularity::Symbol,
        "chunk" => loupe_core::Granularity::Chunk,
        "file" => loupe_core::Granularity::File,
        _ => loupe_core::Granularity::Auto,
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("error: serialization failed: {}", e),
    }
}

// ============================================================================
// TESTS
// ============================================================================
