//! Performance benchmarks for the search subsystem
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use doctree::filter::{Filter, FilterFile};
use doctree::search::hashing::{fuzzy_key_set, hash, query_hashes, tokenize_query};
use tempfile::TempDir;

fn bench_hashing(c: &mut Criterion) {
    c.bench_function("hash_short_token", |b| {
        b.iter(|| hash(black_box("http")));
    });

    c.bench_function("hash_long_key", |b| {
        b.iter(|| hash(black_box("net/http.Client.PostForm")));
    });

    let key = vec![vec![
        "net".to_string(),
        "/".to_string(),
        "http".to_string(),
        ".".to_string(),
        "Client".to_string(),
        ".".to_string(),
        "PostForm".to_string(),
    ]];
    c.bench_function("fuzzy_key_set", |b| {
        b.iter(|| fuzzy_key_set(black_box(&key)));
    });
}

/// Build a filter shaped like a midsize project: a few thousand pages, each
/// with a handful of searchable keys.
fn build_filter_fixture() -> (TempDir, FilterFile) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("bench.sinter");

    let mut filter = Filter::new(500_000);
    for page in 0..2_000 {
        let keys: Vec<Vec<String>> = (0..8)
            .map(|section| {
                vec![
                    format!("pkg{page}"),
                    ".".to_string(),
                    format!("Func{page}x{section}"),
                ]
            })
            .collect();
        let payload = format!("payload-{page}").into_bytes();
        filter.insert(fuzzy_key_set(&keys), payload);
    }
    filter
        .build()
        .expect("Failed to build filter")
        .write(&path)
        .expect("Failed to write filter");

    let file = FilterFile::read(&path).expect("Failed to read filter");
    (dir, file)
}

fn bench_filter_probe(c: &mut Criterion) {
    let (_dir, filter) = build_filter_fixture();

    let hit_tokens = tokenize_query("pkg1500.Func1500x3");
    let hit = query_hashes("pkg1500.Func1500x3", &hit_tokens);
    c.bench_function("query_or_hit", |b| {
        b.iter(|| filter.query_or(black_box(&hit)).unwrap());
    });

    let miss_tokens = tokenize_query("nothing.like.this");
    let miss = query_hashes("nothing.like.this", &miss_tokens);
    c.bench_function("query_or_miss", |b| {
        b.iter(|| filter.query_or(black_box(&miss)).unwrap());
    });
}

criterion_group!(benches, bench_hashing, bench_filter_probe);
criterion_main!(benches);
