//! Benchmarks for pipeline execution and retrieval ranking.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reelforge::confirm::ConfirmationRegistry;
use reelforge::metrics::MetricsRegistry;
use reelforge::pipeline::{PipelineExecutor, PipelineNode};
use reelforge::retrieval::{
    ExampleRecord, MetadataFilter, RetrievalPreferences, RetrievalService, VectorMatch,
};
use reelforge::session::Session;
use reelforge::stage::{FnStage, StageConfig, StageOutput};
use reelforge::testing::{CountingEmbedder, InMemoryExampleStore, InMemoryVectorStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn sequential_chain(depth: usize) -> PipelineNode {
    let children = (0..depth)
        .map(|i| {
            PipelineNode::stage(Arc::new(FnStage::new(
                StageConfig::tool(format!("stage_{i}"), format!("key_{i}")),
                move |_ctx| Ok(StageOutput::Completed(json!(i))),
            )))
        })
        .collect();
    PipelineNode::sequential("chain", children)
}

fn executor_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let root = sequential_chain(32);
    let executor = PipelineExecutor::new(
        Arc::new(ConfirmationRegistry::new()),
        Arc::new(MetricsRegistry::new()),
    );

    c.bench_function("sequential_32_stages", |b| {
        b.iter(|| {
            rt.block_on(async {
                let session = Arc::new(Session::new("bench"));
                black_box(executor.run(&root, &session).await.expect("run"));
            });
        });
    });
}

fn retrieval_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let vectors = Arc::new(InMemoryVectorStore::new());
    let examples = Arc::new(InMemoryExampleStore::new());

    let matches = (0..200)
        .map(|i| VectorMatch {
            id: format!("ex-{i}"),
            score: 0.9 + f64::from(i % 10) / 100.0,
            metadata: HashMap::new(),
        })
        .collect();
    vectors.script_matches(matches);
    for i in 0..200 {
        examples.seed(ExampleRecord {
            id: format!("ex-{i}"),
            title: format!("example {i}"),
            content: json!({"script": "scene"}),
            category: if i % 2 == 0 { "food" } else { "fitness" }.to_string(),
            tags: vec!["upbeat".to_string()],
        });
    }

    let service = RetrievalService::new(
        Arc::new(CountingEmbedder::new()),
        vectors,
        examples,
        Arc::new(MetricsRegistry::new()),
    );
    let prefs = RetrievalPreferences {
        category: Some("food".to_string()),
        tones: vec!["upbeat".to_string()],
        ..RetrievalPreferences::top_k(10)
    };

    c.bench_function("retrieval_rank_200_candidates", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    service
                        .search("bench query", &MetadataFilter::default(), &prefs)
                        .await
                        .expect("search"),
                );
            });
        });
    });
}

criterion_group!(benches, executor_benchmark, retrieval_benchmark);
criterion_main!(benches);
