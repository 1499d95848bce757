//! End-to-end runs against the in-memory reference driver.

use std::sync::Arc;
use std::time::Duration;

use vbench_client::{
    BenchEvent, CollectionSchema, ConnectionParams, InMemoryClient, MemoryObserver, Phase,
};
use vbench_runner::{BenchRunner, Dataset};

const DIM: usize = 8;

/// Distinct unit vectors on a 2-plane so every record has a unique nearest
/// neighbor under cosine similarity.
fn dataset(n: usize) -> Arc<Dataset> {
    let ids: Vec<i64> = (0..n as i64).collect();
    let vectors: Vec<Vec<f32>> = (0..n)
        .map(|i| {
            let theta = i as f32 * 0.01;
            let mut v = vec![0.0f32; DIM];
            v[0] = theta.cos();
            v[1] = theta.sin();
            v
        })
        .collect();
    Arc::new(Dataset::new(ids, vectors).unwrap())
}

fn inmemory_client(params: ConnectionParams) -> Arc<InMemoryClient> {
    let schema = CollectionSchema::new("run_test", DIM).unwrap();
    Arc::new(InMemoryClient::configure(&params, &schema).unwrap())
}

#[tokio::test]
async fn full_run_produces_a_complete_report() {
    let params =
        ConnectionParams::new().set("index_polls", "2").set("poll_interval_ms", "1");
    let client = inmemory_client(params);
    let observer = MemoryObserver::new();

    let runner = BenchRunner::builder()
        .client(client.clone())
        .concurrency(4)
        .sub_batch_size(50)
        .k(10)
        .observer(Arc::new(observer.clone()))
        .build()
        .unwrap();

    let data = dataset(200);
    let queries: Vec<Vec<f32>> = vec![data.vectors[42].clone(), data.vectors[7].clone()];
    let report = runner.run(Arc::clone(&data), &queries).await.unwrap();

    assert_eq!(report.backend, "inmemory");
    assert_eq!(report.inserted, 200);
    assert!(report.load_complete());
    assert!(report.optimize_duration.is_some());

    // Each query vector is itself stored, so it is its own nearest neighbor.
    assert_eq!(report.queries.len(), 2);
    assert_eq!(report.queries[0].ids.first(), Some(&42));
    assert_eq!(report.queries[1].ids.first(), Some(&7));
    assert!(report.queries.iter().all(|q| q.ids.len() <= 10));

    // All four phases ran, and the simulated index build was polled.
    let started = |phase: Phase| {
        observer.count_matching(move |e| {
            matches!(e, BenchEvent::PhaseStarted { phase: p } if *p == phase)
        })
    };
    assert_eq!(started(Phase::Setup), 1);
    assert_eq!(started(Phase::Load), 1);
    assert_eq!(started(Phase::Optimize), 1);
    assert_eq!(started(Phase::Search), 1);
    assert_eq!(
        observer.count_matching(|e| matches!(e, BenchEvent::ReadinessPoll { .. })),
        2
    );
}

#[tokio::test]
async fn load_failure_skips_optimize_and_search() {
    let client = inmemory_client(ConnectionParams::new());
    let observer = MemoryObserver::new();

    let runner = BenchRunner::builder()
        .client(client)
        .concurrency(1)
        .sub_batch_size(10)
        .observer(Arc::new(observer.clone()))
        .build()
        .unwrap();

    // Corrupt an id after construction so the duplicate reaches the driver
    // inside the third sub-batch.
    let mut data = (*dataset(50)).clone();
    data.ids[25] = 3;
    let report = runner.run(Arc::new(data), &[vec![0.0; DIM]]).await.unwrap();

    assert!(report.insert_error.is_some());
    assert!(report.inserted < 50);
    // The two complete sub-batches plus the prefix of the failing one.
    assert_eq!(report.inserted, 25);
    assert!(report.optimize_duration.is_none());
    assert!(report.queries.is_empty());
    assert_eq!(
        observer.count_matching(
            |e| matches!(e, BenchEvent::PhaseStarted { phase: Phase::Optimize })
        ),
        0
    );
}

#[tokio::test]
async fn optimize_deadline_expiry_fails_the_run() {
    let params =
        ConnectionParams::new().set("index_polls", "100000").set("poll_interval_ms", "5");
    let client = inmemory_client(params);

    let runner = BenchRunner::builder()
        .client(client)
        .concurrency(2)
        .optimize_deadline(Duration::from_millis(25))
        .build()
        .unwrap();

    let err = runner.run(dataset(20), &[]).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn report_serializes_to_json() {
    let client = inmemory_client(ConnectionParams::new());
    let runner = BenchRunner::builder().client(client).concurrency(2).k(5).build().unwrap();

    let data = dataset(30);
    let queries = vec![data.vectors[3].clone()];
    let report = runner.run(data, &queries).await.unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["inserted"], 30);
    assert_eq!(value["backend"], "inmemory");
    assert!(value.get("insert_error").is_none());
}

#[tokio::test]
async fn builder_rejects_invalid_parameters() {
    assert!(BenchRunner::builder().build().is_err());

    let client = inmemory_client(ConnectionParams::new());
    assert!(BenchRunner::builder().client(client.clone()).k(0).build().is_err());
    assert!(BenchRunner::builder().client(client).concurrency(0).build().is_err());
}
