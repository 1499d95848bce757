//! In-memory reference driver.
//!
//! [`InMemoryClient`] keeps the collection in a `HashMap` behind a
//! `tokio::sync::RwLock` and scores queries exactly per [`MetricType`]. It
//! is the reference implementation of the client contract, used by the test
//! suite and suitable for harness development without a live backend.
//!
//! An asynchronous index build can be simulated through the `index_polls`
//! connection parameter: `optimize` then reports a pending counter that
//! drains by one per poll before reaching ready.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::{ClientSession, RecordBatch, VectorClient};
use crate::config::{CollectionSchema, ConnectionParams, MetricType, SearchFilters};
use crate::error::{BenchError, Result};
use crate::observe::BenchObserver;
use crate::ready::{PollOptions, ReadyState, ReadyStatus, poll_until_ready};

const BACKEND: &str = "inmemory";

#[derive(Default)]
struct InMemoryState {
    /// `None` until the collection is created.
    records: RwLock<Option<HashMap<i64, Vec<f32>>>>,
    /// Simulated index-build polls remaining before `optimize` is ready.
    pending_polls: AtomicU64,
}

/// An in-memory [`VectorClient`] with exact per-metric scoring.
pub struct InMemoryClient {
    schema: CollectionSchema,
    state: Arc<InMemoryState>,
    index_polls: u64,
    poll_interval: Duration,
}

impl InMemoryClient {
    /// Validate connection parameters and bind the target schema.
    ///
    /// Recognized parameters: `index_polls` (simulated build polls before
    /// `optimize` reports ready, default 0) and `poll_interval_ms`
    /// (backoff between simulated polls, default 2000).
    ///
    /// Performs no I/O.
    pub fn configure(params: &ConnectionParams, schema: &CollectionSchema) -> Result<Self> {
        let index_polls = params.parse_or("index_polls", 0u64)?;
        let poll_interval = Duration::from_millis(params.parse_or("poll_interval_ms", 2000u64)?);
        Ok(Self {
            schema: schema.clone(),
            state: Arc::new(InMemoryState::default()),
            index_polls,
            poll_interval,
        })
    }
}

#[async_trait]
impl VectorClient for InMemoryClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn setup_schema(&self, drop_existing: bool) -> Result<()> {
        if !drop_existing {
            return Ok(());
        }
        let mut records = self.state.records.write().await;
        *records = Some(HashMap::new());
        self.state.pending_polls.store(self.index_polls, Ordering::SeqCst);
        debug!(
            collection = %self.schema.name,
            dimensions = self.schema.dimensions,
            "created in-memory collection"
        );
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn ClientSession>> {
        Ok(Box::new(InMemorySession {
            schema: self.schema.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn optimize(
        &self,
        deadline: Option<Duration>,
        observer: &dyn BenchObserver,
    ) -> Result<()> {
        let state = Arc::clone(&self.state);
        let probe = move || {
            let state = Arc::clone(&state);
            async move {
                let pending = state.pending_polls.load(Ordering::SeqCst);
                if pending == 0 {
                    return Ok(ReadyStatus::ready());
                }
                state.pending_polls.store(pending - 1, Ordering::SeqCst);
                Ok(ReadyStatus::busy(ReadyState::IndexBuilding, pending))
            }
        };

        let options = PollOptions { interval: self.poll_interval, deadline };
        let report = poll_until_ready(probe, options, observer).await?;
        debug!(polls = report.polls, elapsed = ?report.elapsed, "in-memory index ready");
        Ok(())
    }
}

struct InMemorySession {
    schema: CollectionSchema,
    state: Arc<InMemoryState>,
}

impl InMemorySession {
    /// Similarity score, higher is nearer, per the configured metric.
    fn score(&self, stored: &[f32], query: &[f32]) -> f32 {
        match self.schema.index.metric {
            MetricType::L2 => {
                let dist: f32 =
                    stored.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum::<f32>();
                -dist
            }
            MetricType::InnerProduct => stored.iter().zip(query).map(|(a, b)| a * b).sum(),
            MetricType::Cosine => {
                let dot: f32 = stored.iter().zip(query).map(|(a, b)| a * b).sum();
                let norm_a: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
            }
        }
    }
}

#[async_trait]
impl ClientSession for InMemorySession {
    async fn insert(&mut self, batch: RecordBatch<'_>) -> Result<usize> {
        let mut records = self.state.records.write().await;
        let records = records.as_mut().ok_or_else(|| BenchError::Insert {
            backend: BACKEND,
            inserted: 0,
            message: format!("collection '{}' does not exist", self.schema.name),
        })?;

        let mut inserted = 0;
        for (id, vector) in batch.ids.iter().zip(batch.vectors) {
            if vector.len() != self.schema.dimensions {
                return Err(BenchError::Insert {
                    backend: BACKEND,
                    inserted,
                    message: format!(
                        "dimension mismatch for id {id}: expected {}, got {}",
                        self.schema.dimensions,
                        vector.len()
                    ),
                });
            }
            // Ids are caller-supplied and unique per run; a duplicate means
            // the caller retried a committed batch, which must surface.
            if records.contains_key(id) {
                return Err(BenchError::Insert {
                    backend: BACKEND,
                    inserted,
                    message: format!("duplicate id {id}"),
                });
            }
            records.insert(*id, vector.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn search(
        &mut self,
        query: &[f32],
        k: usize,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<i64>> {
        let records = self.state.records.read().await;
        let records = records.as_ref().ok_or_else(|| BenchError::Search {
            backend: BACKEND,
            message: format!("collection '{}' does not exist", self.schema.name),
        })?;

        let mut scored: Vec<(i64, f32)> =
            records.iter().map(|(id, vector)| (*id, self.score(vector, query))).collect();
        // Nearest first; ties broken by id so results are deterministic.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }
}
