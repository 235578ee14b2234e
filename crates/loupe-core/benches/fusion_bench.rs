//! Loupe Retrieval Benchmarks
//!
//! Benchmarks for the hot retrieval-path primitives using Criterion.
//! Run with: cargo bench -p loupe-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loupe_core::embeddings::{cosine_similarity, Embedder, HashEmbedder, InputType};
use loupe_core::retrieval::{reciprocal_rank_fusion, sanitize_match_query, RRF_K};

fn bench_rrf_fusion(c: &mut Criterion) {
    let vector_ids: Vec<String> = (0..50).map(|i| format!("sym-{i}")).collect();
    let keyword_ids: Vec<String> = (0..50).map(|i| format!("sym-{}", 25 + i)).collect();

    c.bench_function("rrf_50x50", |b| {
        b.iter(|| {
            black_box(reciprocal_rank_fusion(
                &vector_ids,
                &keyword_ids,
                RRF_K,
                1.0,
                1.0,
            ));
        })
    });
}

fn bench_sanitize_match_query(c: &mut Criterion) {
    let queries = [
        "function that validates email addresses",
        "create AND delete \"user\" (session)",
        "calculateTax",
        "how does the retry backoff work",
    ];

    c.bench_function("sanitize_match_query", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(sanitize_match_query(q));
            }
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b_vec: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_256d", |b| {
        b.iter(|| {
            black_box(cosine_similarity(&a, &b_vec));
        })
    });
}

fn bench_hash_embedder(c: &mut Criterion) {
    let embedder = HashEmbedder::new(256);
    let text = "export function calculateTax(amount: number): number {\n  return amount * TAX_RATE;\n}";
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

    c.bench_function("hash_embed_snippet", |b| {
        b.iter(|| {
            let vector = rt
                .block_on(embedder.embed(black_box(text), InputType::Document))
                .unwrap();
            black_box(vector);
        })
    });
}

criterion_group!(
    benches,
    bench_rrf_fusion,
    bench_sanitize_match_query,
    bench_cosine_similarity,
    bench_hash_embedder
);
criterion_main!(benches);
