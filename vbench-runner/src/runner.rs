//! The benchmark phase driver.
//!
//! [`BenchRunner`] sequences one run end to end:
//! setup → ready-to-load → bulk insert → optimize → search, emitting phase
//! events to the configured observer and aggregating a [`RunReport`].
//! Phases are strictly sequential; no other work proceeds concurrently
//! with optimization.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use vbench_client::{
    BenchError, BenchEvent, BenchObserver, Phase, Result, SearchFilters, TracingObserver,
    VectorClient,
};

use crate::evaluator::{SearchErrorPolicy, SearchEvaluator};
use crate::loader::{Dataset, InsertOrchestrator};
use crate::report::RunReport;

/// Drives one benchmark run against one configured client.
///
/// Construct via [`BenchRunner::builder()`].
///
/// # Example
///
/// ```rust,ignore
/// use vbench_runner::BenchRunner;
///
/// let runner = BenchRunner::builder()
///     .client(client)
///     .concurrency(10)
///     .k(100)
///     .build()?;
/// let report = runner.run(Arc::new(dataset), &queries).await?;
/// ```
pub struct BenchRunner {
    client: Arc<dyn VectorClient>,
    drop_existing: bool,
    concurrency: usize,
    sub_batch: usize,
    k: usize,
    policy: SearchErrorPolicy,
    filters: Option<SearchFilters>,
    optimize_deadline: Option<Duration>,
    observer: Arc<dyn BenchObserver>,
}

impl BenchRunner {
    /// Create a new [`BenchRunnerBuilder`].
    pub fn builder() -> BenchRunnerBuilder {
        BenchRunnerBuilder::default()
    }

    /// Execute one full run.
    ///
    /// A load failure is captured in the report (committed count plus the
    /// causing error) and skips the optimize and search phases. Schema,
    /// connection, timeout, and fail-fast search errors propagate as `Err`.
    pub async fn run(&self, dataset: Arc<Dataset>, queries: &[Vec<f32>]) -> Result<RunReport> {
        let backend = self.client.backend();

        self.observer.on_event(BenchEvent::PhaseStarted { phase: Phase::Setup });
        let setup_started = Instant::now();
        self.client.setup_schema(self.drop_existing).await?;
        self.client.ready_to_load().await?;
        self.finish_phase(Phase::Setup, setup_started);

        self.observer.on_event(BenchEvent::PhaseStarted { phase: Phase::Load });
        let load_started = Instant::now();
        let orchestrator = InsertOrchestrator::new()
            .concurrency(self.concurrency)
            .sub_batch_size(self.sub_batch)
            .observer(Arc::clone(&self.observer));
        let (inserted, insert_error) =
            orchestrator.bulk_insert(Arc::clone(&self.client), Arc::clone(&dataset)).await;
        let load_duration = load_started.elapsed();
        self.finish_phase(Phase::Load, load_started);

        if let Some(e) = insert_error {
            warn!(backend, inserted, error = %e, "load failed, skipping optimize and search");
            return Ok(RunReport {
                backend: backend.to_string(),
                inserted,
                insert_error: Some(e.to_string()),
                load_duration,
                optimize_duration: None,
                queries: Vec::new(),
            });
        }
        info!(backend, inserted, ?load_duration, "load complete");

        self.observer.on_event(BenchEvent::PhaseStarted { phase: Phase::Optimize });
        let optimize_started = Instant::now();
        self.client.optimize(self.optimize_deadline, self.observer.as_ref()).await?;
        let optimize_duration = optimize_started.elapsed();
        self.finish_phase(Phase::Optimize, optimize_started);

        self.observer.on_event(BenchEvent::PhaseStarted { phase: Phase::Search });
        let search_started = Instant::now();
        let mut session = self.client.session().await?;
        let mut evaluator = SearchEvaluator::new(self.k)
            .policy(self.policy)
            .observer(Arc::clone(&self.observer));
        if let Some(filters) = &self.filters {
            evaluator = evaluator.filters(filters.clone());
        }
        let query_records = evaluator.evaluate_all(session.as_mut(), queries).await?;
        self.finish_phase(Phase::Search, search_started);

        Ok(RunReport {
            backend: backend.to_string(),
            inserted,
            insert_error: None,
            load_duration,
            optimize_duration: Some(optimize_duration),
            queries: query_records,
        })
    }

    fn finish_phase(&self, phase: Phase, started: Instant) {
        self.observer.on_event(BenchEvent::PhaseFinished { phase, elapsed: started.elapsed() });
    }
}

/// Builder for a validated [`BenchRunner`].
#[derive(Default)]
pub struct BenchRunnerBuilder {
    client: Option<Arc<dyn VectorClient>>,
    drop_existing: Option<bool>,
    concurrency: Option<usize>,
    sub_batch: Option<usize>,
    k: Option<usize>,
    policy: SearchErrorPolicy,
    filters: Option<SearchFilters>,
    optimize_deadline: Option<Duration>,
    observer: Option<Arc<dyn BenchObserver>>,
}

impl BenchRunnerBuilder {
    /// Set the client under test (required).
    pub fn client(mut self, client: Arc<dyn VectorClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Whether setup drops and recreates the collection (default `true`).
    pub fn drop_existing(mut self, drop_existing: bool) -> Self {
        self.drop_existing = Some(drop_existing);
        self
    }

    /// Number of concurrent insert workers (default 10).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Per-call insert sub-batch size (default 1000).
    pub fn sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch = Some(size);
        self
    }

    /// Neighbors requested per query (default 100).
    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Per-query failure policy (default fail-fast).
    pub fn search_error_policy(mut self, policy: SearchErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Backend-specific search filters.
    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Wall-clock deadline for the optimize phase (default unbounded).
    pub fn optimize_deadline(mut self, deadline: Duration) -> Self {
        self.optimize_deadline = Some(deadline);
        self
    }

    /// Replace the observer sink (default: forward to `tracing`).
    pub fn observer(mut self, observer: Arc<dyn BenchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the runner, validating its parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if no client was set, or if
    /// `concurrency` or `k` is zero.
    pub fn build(self) -> Result<BenchRunner> {
        let client =
            self.client.ok_or_else(|| BenchError::Config("runner requires a client".to_string()))?;
        let concurrency = self.concurrency.unwrap_or(10);
        if concurrency == 0 {
            return Err(BenchError::Config("concurrency must be at least 1".to_string()));
        }
        let k = self.k.unwrap_or(100);
        if k == 0 {
            return Err(BenchError::Config("k must be greater than zero".to_string()));
        }
        Ok(BenchRunner {
            client,
            drop_existing: self.drop_existing.unwrap_or(true),
            concurrency,
            sub_batch: self.sub_batch.unwrap_or(1000),
            k,
            policy: self.policy,
            filters: self.filters,
            optimize_deadline: self.optimize_deadline,
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
        })
    }
}
