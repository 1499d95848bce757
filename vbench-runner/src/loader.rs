//! Concurrent bulk-insert orchestration.
//!
//! [`InsertOrchestrator`] partitions an embedding set into at most
//! `concurrency` contiguous batches, drives one worker per batch against a
//! driver, and aggregates an accurate global committed count plus the first
//! observed failure. Workers each acquire their own session (client
//! libraries are not assumed safe for concurrent use of one connection) and
//! sub-batch their range to respect backend payload limits.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use tracing::warn;
use vbench_client::{
    BenchError, BenchEvent, BenchObserver, ClientSession, RecordBatch, TracingObserver,
    VectorClient,
};

/// An embedding set with caller-supplied record ids.
///
/// Invariant, enforced at construction: `ids` and `vectors` have equal
/// length, and every id is unique within the run.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Record ids, unique within the target collection.
    pub ids: Vec<i64>,
    /// Embedding vectors, parallel to `ids`.
    pub vectors: Vec<Vec<f32>>,
}

impl Dataset {
    /// Create a dataset from parallel id/vector columns.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if the columns differ in length or an
    /// id appears more than once.
    pub fn new(ids: Vec<i64>, vectors: Vec<Vec<f32>>) -> Result<Self, BenchError> {
        if ids.len() != vectors.len() {
            return Err(BenchError::Config(format!(
                "dataset columns differ in length: {} ids, {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(*id) {
                return Err(BenchError::Config(format!("duplicate id {id} in dataset")));
            }
        }
        Ok(Self { ids, vectors })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Partition `[0, n)` into at most `workers` contiguous ranges of size
/// `⌈n / workers⌉` (the last may be shorter).
///
/// The ranges cover `[0, n)` exactly once with no gaps or overlaps.
pub fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let size = n.div_ceil(workers.max(1));
    (0..n).step_by(size).map(|start| start..(start + size).min(n)).collect()
}

/// Orchestrates a concurrent bulk load against one driver.
pub struct InsertOrchestrator {
    concurrency: usize,
    sub_batch: usize,
    observer: Arc<dyn BenchObserver>,
}

impl Default for InsertOrchestrator {
    fn default() -> Self {
        Self { concurrency: 10, sub_batch: 1000, observer: Arc::new(TracingObserver) }
    }
}

impl InsertOrchestrator {
    /// Create an orchestrator with the default concurrency (10) and
    /// sub-batch size (1000).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of concurrent insert workers (minimum 1).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-call sub-batch size (minimum 1).
    pub fn sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch = size.max(1);
        self
    }

    /// Replace the observer sink.
    pub fn observer(mut self, observer: Arc<dyn BenchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Load the dataset with bounded parallelism.
    ///
    /// Returns the total number of records committed across all workers and
    /// the first observed error, if any. The count is always accurate:
    /// records committed by workers that finished, and by a failing worker
    /// before its first failing sub-batch, are included — confirmed work is
    /// never discarded. Siblings of a failed worker are not cancelled;
    /// their records remain committed in the backend.
    pub async fn bulk_insert(
        &self,
        client: Arc<dyn VectorClient>,
        dataset: Arc<Dataset>,
    ) -> (usize, Option<BenchError>) {
        if dataset.ids.len() != dataset.vectors.len() {
            return (0, Some(BenchError::Config("dataset columns differ in length".to_string())));
        }
        if dataset.is_empty() {
            return (0, None);
        }

        let mut handles = Vec::new();
        for (worker, range) in partition(dataset.len(), self.concurrency).into_iter().enumerate() {
            let client = Arc::clone(&client);
            let dataset = Arc::clone(&dataset);
            let observer = Arc::clone(&self.observer);
            let sub_batch = self.sub_batch;

            handles.push(tokio::spawn(async move {
                let mut session = match client.session().await {
                    Ok(session) => session,
                    Err(e) => {
                        observer.on_event(BenchEvent::InsertFailed {
                            worker,
                            inserted: 0,
                            message: e.to_string(),
                        });
                        return (0usize, Some(e));
                    }
                };

                let batch =
                    RecordBatch::new(&dataset.ids[range.clone()], &dataset.vectors[range]);
                let mut inserted = 0usize;
                for chunk in batch.chunks(sub_batch) {
                    match session.insert(chunk).await {
                        Ok(count) => {
                            inserted += count;
                            observer.on_event(BenchEvent::BatchInserted { worker, inserted });
                        }
                        Err(e) => {
                            // The failing sub-batch may itself have committed
                            // a prefix; fold it into the worker's count.
                            inserted += e.committed();
                            observer.on_event(BenchEvent::InsertFailed {
                                worker,
                                inserted,
                                message: e.to_string(),
                            });
                            return (inserted, Some(e));
                        }
                    }
                }
                (inserted, None)
            }));
        }

        let mut total = 0usize;
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok((inserted, error)) => {
                    total += inserted;
                    if first_error.is_none() {
                        first_error = error;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "insert worker panicked");
                    if first_error.is_none() {
                        first_error = Some(BenchError::Insert {
                            backend: "orchestrator",
                            inserted: 0,
                            message: format!("insert worker panicked: {e}"),
                        });
                    }
                }
            }
        }
        (total, first_error)
    }
}
