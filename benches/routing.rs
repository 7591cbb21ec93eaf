//! Routing benchmarks: measures the per-text overhead the router adds on top
//! of model inference.
//!
//! - Complexity scoring across text lengths
//! - Full routing decision (nuance scan + rule chain)
//! - Batch of 100 texts through the lexicon predictors

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

use hybrid_sentiment_router::routing::ComplexityScorer;
use hybrid_sentiment_router::{
    BatchCoordinator, BoostedPredictor, HybridOrchestrator, LexiconPredictor, Predictor,
    RoutingConfig, RoutingPolicy,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn review(words: usize) -> String {
    ["товар", "хороший", "но", "доставка", "долгая"]
        .iter()
        .cycle()
        .take(words)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn policy() -> RoutingPolicy {
    RoutingPolicy::new(RoutingConfig::default()).expect("policy")
}

// ---------------------------------------------------------------------------
// Bench: complexity scoring
// ---------------------------------------------------------------------------

fn bench_complexity_score(c: &mut Criterion) {
    let scorer = ComplexityScorer::new(&RoutingConfig::default()).expect("scorer");

    let mut group = c.benchmark_group("complexity_score");
    for words in [3usize, 20, 150] {
        let text = review(words);
        group.bench_with_input(BenchmarkId::new("words", words), &text, |b, text| {
            b.iter(|| black_box(scorer.score(black_box(text))))
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Bench: routing decision
// ---------------------------------------------------------------------------

fn bench_decide(c: &mut Criterion) {
    let policy = policy();

    c.bench_function("decide_simple_text", |b| {
        b.iter(|| black_box(policy.decide(black_box("хороший товар"), Some(0.92))))
    });

    c.bench_function("decide_pattern_match", |b| {
        b.iter(|| {
            black_box(policy.decide(
                black_box("Сарказм? Да, конечно, отличное качество..."),
                Some(0.92),
            ))
        })
    });

    let long = review(60);
    c.bench_function("decide_too_long", |b| {
        b.iter(|| black_box(policy.decide(black_box(&long), Some(0.92))))
    });
}

// ---------------------------------------------------------------------------
// Bench: batch of 100 texts
// ---------------------------------------------------------------------------

fn bench_batch_100(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let fast: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
    let accurate: Arc<dyn Predictor> =
        Arc::new(BoostedPredictor::new(Arc::new(LexiconPredictor::new())));
    let coordinator = BatchCoordinator::new(Arc::new(HybridOrchestrator::new(
        fast,
        accurate,
        policy(),
    )));
    let texts: Vec<String> = (0..100).map(|i| review(3 + i % 40)).collect();

    let mut group = c.benchmark_group("batch");
    group.sample_size(20);
    group.bench_function("lexicon_100", |b| {
        b.to_async(&rt).iter(|| async {
            let report = coordinator.analyze_batch(texts.clone()).await.expect("batch");
            black_box(report.summary.successful)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_complexity_score, bench_decide, bench_batch_100);
criterion_main!(benches);
