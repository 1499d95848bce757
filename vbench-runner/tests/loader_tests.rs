//! Orchestrator tests: partitioning invariants and partial-failure
//! accounting against a stub driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use vbench_client::{
    BenchError, BenchEvent, BenchObserver, ClientSession, CollectionSchema, MemoryObserver,
    RecordBatch, Result, SearchFilters, VectorClient,
};
use vbench_runner::{Dataset, InsertOrchestrator, partition};

/// Driver stub that records every committed id and can fail the sub-batch
/// beginning at a chosen id.
struct StubClient {
    schema: CollectionSchema,
    committed: Arc<Mutex<Vec<i64>>>,
    fail_batch_starting_at: Option<i64>,
    sessions_opened: Arc<AtomicUsize>,
}

impl StubClient {
    fn new(fail_batch_starting_at: Option<i64>) -> Self {
        Self {
            schema: CollectionSchema::new("stub", 4).unwrap(),
            committed: Arc::new(Mutex::new(Vec::new())),
            fail_batch_starting_at,
            sessions_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn committed_ids(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorClient for StubClient {
    fn backend(&self) -> &'static str {
        "stub"
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn setup_schema(&self, _drop_existing: bool) -> Result<()> {
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn ClientSession>> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            committed: Arc::clone(&self.committed),
            fail_batch_starting_at: self.fail_batch_starting_at,
        }))
    }

    async fn optimize(
        &self,
        _deadline: Option<Duration>,
        _observer: &dyn BenchObserver,
    ) -> Result<()> {
        Ok(())
    }
}

struct StubSession {
    committed: Arc<Mutex<Vec<i64>>>,
    fail_batch_starting_at: Option<i64>,
}

#[async_trait]
impl ClientSession for StubSession {
    async fn insert(&mut self, batch: RecordBatch<'_>) -> Result<usize> {
        if self.fail_batch_starting_at == batch.ids.first().copied() {
            return Err(BenchError::Insert {
                backend: "stub",
                inserted: 0,
                message: "injected failure".to_string(),
            });
        }
        self.committed.lock().unwrap().extend_from_slice(batch.ids);
        Ok(batch.len())
    }

    async fn search(
        &mut self,
        _query: &[f32],
        _k: usize,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<i64>> {
        Ok(Vec::new())
    }
}

fn dataset(n: usize) -> Arc<Dataset> {
    let ids: Vec<i64> = (0..n as i64).collect();
    let vectors = vec![vec![0.0f32; 4]; n];
    Arc::new(Dataset::new(ids, vectors).unwrap())
}

#[tokio::test]
async fn ten_thousand_records_ten_workers_all_committed() {
    let client = Arc::new(StubClient::new(None));
    let observer = MemoryObserver::new();
    let orchestrator =
        InsertOrchestrator::new().concurrency(10).observer(Arc::new(observer.clone()));

    let (total, error) = orchestrator.bulk_insert(client.clone(), dataset(10_000)).await;

    assert_eq!(total, 10_000);
    assert!(error.is_none());
    // One session per worker, one 1000-record sub-batch each.
    assert_eq!(client.sessions_opened.load(Ordering::SeqCst), 10);
    assert_eq!(
        observer.count_matching(|e| matches!(e, BenchEvent::BatchInserted { .. })),
        10
    );
}

#[tokio::test]
async fn injected_failure_reports_partial_count_and_first_error() {
    // Worker 7 of 10 owns [7000, 8000); its single sub-batch fails.
    let client = Arc::new(StubClient::new(Some(7000)));
    let orchestrator = InsertOrchestrator::new().concurrency(10);

    let (total, error) = orchestrator.bulk_insert(client.clone(), dataset(10_000)).await;

    assert_eq!(total, 9_000);
    assert!(total < 10_000);
    match error {
        Some(BenchError::Insert { message, .. }) => assert!(message.contains("injected")),
        other => panic!("expected Insert error, got {other:?}"),
    }
    // Sibling workers were not cancelled; their records stayed committed.
    let mut committed = client.committed_ids();
    committed.sort_unstable();
    assert_eq!(committed.len(), 9_000);
    assert!(!committed.contains(&7000));
    assert!(committed.contains(&6999));
    assert!(committed.contains(&8000));
}

#[tokio::test]
async fn failing_worker_keeps_its_earlier_sub_batches() {
    // One worker, sub-batches of 100; the batch starting at 300 fails, so
    // the worker commits [0, 300) and stops.
    let client = Arc::new(StubClient::new(Some(300)));
    let orchestrator = InsertOrchestrator::new().concurrency(1).sub_batch_size(100);

    let (total, error) = orchestrator.bulk_insert(client.clone(), dataset(1_000)).await;

    assert_eq!(total, 300);
    assert!(error.is_some());
    assert_eq!(client.committed_ids().len(), 300);
}

#[tokio::test]
async fn empty_dataset_is_a_successful_noop() {
    let client = Arc::new(StubClient::new(None));
    let orchestrator = InsertOrchestrator::new().concurrency(4);

    let (total, error) = orchestrator.bulk_insert(client, dataset(0)).await;
    assert_eq!(total, 0);
    assert!(error.is_none());
}

struct NoSessionClient {
    schema: CollectionSchema,
}

#[async_trait]
impl VectorClient for NoSessionClient {
    fn backend(&self) -> &'static str {
        "no-session"
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn setup_schema(&self, _drop_existing: bool) -> Result<()> {
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn ClientSession>> {
        Err(BenchError::Connection { backend: "no-session", message: "refused".to_string() })
    }

    async fn optimize(
        &self,
        _deadline: Option<Duration>,
        _observer: &dyn BenchObserver,
    ) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn session_failure_surfaces_as_the_first_error() {
    let client = Arc::new(NoSessionClient { schema: CollectionSchema::new("x", 4).unwrap() });
    let orchestrator = InsertOrchestrator::new().concurrency(3);

    let (total, error) = orchestrator.bulk_insert(client, dataset(30)).await;
    assert_eq!(total, 0);
    assert!(matches!(error, Some(BenchError::Connection { .. })));
}

/// For all N and C, partitioning covers [0, N) exactly once with no gaps or
/// overlaps, batch sizes are ⌈N / C⌉ (last possibly shorter), and the batch
/// count never exceeds C.
mod prop_partitioning {
    use super::*;

    proptest! {
        #[test]
        fn covers_range_exactly(n in 0usize..5_000, workers in 1usize..64) {
            let ranges = partition(n, workers);

            prop_assert!(ranges.len() <= workers);
            prop_assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), n);

            let size = n.div_ceil(workers.max(1));
            let mut cursor = 0;
            for (i, range) in ranges.iter().enumerate() {
                prop_assert_eq!(range.start, cursor);
                if i + 1 < ranges.len() {
                    prop_assert_eq!(range.len(), size);
                }
                cursor = range.end;
            }
            prop_assert_eq!(cursor, n);
        }
    }
}

/// For all N and C, a never-failing driver commits exactly N records, each
/// id exactly once.
mod prop_bulk_insert_exhaustive {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn total_equals_n_for_any_concurrency(n in 0usize..1_200, workers in 1usize..16) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let client = Arc::new(StubClient::new(None));
                let orchestrator =
                    InsertOrchestrator::new().concurrency(workers).sub_batch_size(97);

                let (total, error) = orchestrator.bulk_insert(client.clone(), dataset(n)).await;

                prop_assert_eq!(total, n);
                prop_assert!(error.is_none());

                let mut committed = client.committed_ids();
                committed.sort_unstable();
                let expected: Vec<i64> = (0..n as i64).collect();
                prop_assert_eq!(committed, expected);
                Ok(())
            })?;
        }
    }
}
