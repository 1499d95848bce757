//! Injected observability sink for benchmark lifecycle events.
//!
//! Components take a [`BenchObserver`] instead of logging through global
//! state, so tests can assert on emitted events without capturing logger
//! output. [`TracingObserver`] forwards events to `tracing` and is the
//! default everywhere; [`MemoryObserver`] records events for assertions.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ready::ReadyState;

/// A benchmark phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Schema and index creation.
    Setup,
    /// Concurrent bulk insert.
    Load,
    /// Readiness polling until the index is query-ready.
    Optimize,
    /// Sequential query workload.
    Search,
}

impl Phase {
    /// Lowercase phase name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Load => "load",
            Phase::Optimize => "optimize",
            Phase::Search => "search",
        }
    }
}

/// A lifecycle event emitted by the harness components.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchEvent {
    /// A benchmark phase began.
    PhaseStarted {
        /// The phase that began.
        phase: Phase,
    },
    /// A benchmark phase completed.
    PhaseFinished {
        /// The phase that completed.
        phase: Phase,
        /// Wall-clock duration of the phase.
        elapsed: Duration,
    },
    /// An insert worker committed one batch.
    BatchInserted {
        /// Zero-based worker index.
        worker: usize,
        /// Records committed by this worker so far.
        inserted: usize,
    },
    /// An insert worker stopped at its first failing sub-batch.
    InsertFailed {
        /// Zero-based worker index.
        worker: usize,
        /// Records the worker committed before the failure.
        inserted: usize,
        /// A description of the failure.
        message: String,
    },
    /// One readiness poll completed without reaching the ready state.
    ReadinessPoll {
        /// State reported by the backend probe.
        state: ReadyState,
        /// Backend progress scalar (pending rows, replicas, …), if any.
        pending: Option<u64>,
    },
    /// One search query completed.
    QueryFinished {
        /// Zero-based query index within the workload.
        index: usize,
        /// Number of ids the backend returned.
        returned: usize,
        /// Wall-clock query latency.
        latency: Duration,
    },
    /// One search query failed and was skipped.
    QuerySkipped {
        /// Zero-based query index within the workload.
        index: usize,
        /// A description of the failure.
        message: String,
    },
}

/// Sink for [`BenchEvent`]s, injected into every harness component.
pub trait BenchObserver: Send + Sync {
    /// Record one event. Must not fail; observers are best-effort.
    fn on_event(&self, event: BenchEvent);
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BenchObserver for TracingObserver {
    fn on_event(&self, event: BenchEvent) {
        match event {
            BenchEvent::PhaseStarted { phase } => info!(phase = phase.name(), "phase started"),
            BenchEvent::PhaseFinished { phase, elapsed } => {
                info!(phase = phase.name(), ?elapsed, "phase finished");
            }
            BenchEvent::BatchInserted { worker, inserted } => {
                debug!(worker, inserted, "batch inserted");
            }
            BenchEvent::InsertFailed { worker, inserted, message } => {
                warn!(worker, inserted, message = %message, "insert worker failed");
            }
            BenchEvent::ReadinessPoll { state, pending } => {
                debug!(?state, pending, "index not ready, polling again");
            }
            BenchEvent::QueryFinished { index, returned, latency } => {
                debug!(index, returned, ?latency, "query finished");
            }
            BenchEvent::QuerySkipped { index, message } => {
                warn!(index, message = %message, "query skipped");
            }
        }
    }
}

/// Observer that records every event in memory, for test assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryObserver {
    events: Arc<RwLock<Vec<BenchEvent>>>,
}

impl MemoryObserver {
    /// Create an empty recording observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far, in emission order.
    pub fn events(&self) -> Vec<BenchEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count_matching(&self, predicate: impl Fn(&BenchEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl BenchObserver for MemoryObserver {
    fn on_event(&self, event: BenchEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}
