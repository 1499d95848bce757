//! Sequential search evaluation.
//!
//! [`SearchEvaluator`] issues one query at a time against a driver session
//! and collects the returned id sequences with per-query wall-clock
//! latency. Result ordering is backend-determined and passed through
//! unmodified; recall computation happens downstream.

use std::sync::Arc;
use std::time::Instant;

use vbench_client::{
    BenchEvent, BenchObserver, ClientSession, Result, SearchFilters, TracingObserver,
};

use crate::report::QueryRecord;

/// What to do when a single query fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchErrorPolicy {
    /// Abort the workload on the first failed query.
    #[default]
    FailFast,
    /// Record the failure and continue with the next query.
    Skip,
}

/// Issues a query workload against one driver session, strictly
/// sequentially. Any query concurrency is a caller responsibility.
pub struct SearchEvaluator {
    k: usize,
    policy: SearchErrorPolicy,
    filters: Option<SearchFilters>,
    observer: Arc<dyn BenchObserver>,
}

impl SearchEvaluator {
    /// Create an evaluator requesting `k` neighbors per query.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            policy: SearchErrorPolicy::default(),
            filters: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Set the per-query failure policy.
    pub fn policy(mut self, policy: SearchErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach backend-specific search filters, passed through to the driver.
    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Replace the observer sink.
    pub fn observer(mut self, observer: Arc<dyn BenchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Issue one query and return the driver's id sequence unmodified.
    pub async fn evaluate(
        &self,
        session: &mut dyn ClientSession,
        query: &[f32],
    ) -> Result<Vec<i64>> {
        session.search(query, self.k, self.filters.as_ref()).await
    }

    /// Issue the whole workload sequentially, recording per-query latency.
    ///
    /// # Errors
    ///
    /// Under [`SearchErrorPolicy::FailFast`], the first query failure
    /// propagates and later queries are not issued. Under
    /// [`SearchErrorPolicy::Skip`], failures are captured in the returned
    /// records instead.
    pub async fn evaluate_all(
        &self,
        session: &mut dyn ClientSession,
        queries: &[Vec<f32>],
    ) -> Result<Vec<QueryRecord>> {
        let mut records = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let started = Instant::now();
            match self.evaluate(session, query).await {
                Ok(ids) => {
                    let latency = started.elapsed();
                    self.observer.on_event(BenchEvent::QueryFinished {
                        index,
                        returned: ids.len(),
                        latency,
                    });
                    records.push(QueryRecord { index, ids, latency, error: None });
                }
                Err(e) => match self.policy {
                    SearchErrorPolicy::FailFast => return Err(e),
                    SearchErrorPolicy::Skip => {
                        self.observer.on_event(BenchEvent::QuerySkipped {
                            index,
                            message: e.to_string(),
                        });
                        records.push(QueryRecord {
                            index,
                            ids: Vec::new(),
                            latency: started.elapsed(),
                            error: Some(e.to_string()),
                        });
                    }
                },
            }
        }
        Ok(records)
    }
}
