//! Readiness polling for asynchronous server-side index builds.
//!
//! Many backends keep building their vector index after bulk load returns;
//! search is not valid until that build completes. Drivers express their
//! backend-specific status query as a probe returning a [`ReadyStatus`] and
//! hand it to [`poll_until_ready`], the one generic poll-with-backoff
//! primitive, instead of duplicating the loop per backend.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{BenchError, Result};
use crate::observe::{BenchEvent, BenchObserver};

/// Index-materialization state reported by a backend probe.
///
/// The machine only moves forward: `Loading → Replicating → IndexBuilding →
/// Compacting (optional) → Ready`. There is no failed state; probe errors
/// propagate as fatal instead of being retried indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    /// Records are still being ingested or flushed.
    Loading,
    /// Replicas are catching up with the loaded data.
    Replicating,
    /// The vector index is being built over loaded rows.
    IndexBuilding,
    /// The backend is compacting storage before serving queries.
    Compacting,
    /// The index is fully materialized; search results are valid.
    Ready,
}

/// One probe observation: a state plus an optional progress scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyStatus {
    /// Current readiness state.
    pub state: ReadyState,
    /// Backend progress scalar (pending rows, lagging replicas, …), if the
    /// status query reports one.
    pub pending: Option<u64>,
}

impl ReadyStatus {
    /// The terminal ready status.
    pub fn ready() -> Self {
        Self { state: ReadyState::Ready, pending: None }
    }

    /// A not-yet-ready status with a progress scalar.
    pub fn busy(state: ReadyState, pending: u64) -> Self {
        Self { state, pending: Some(pending) }
    }

    /// Whether this status satisfies the readiness predicate.
    pub fn is_ready(&self) -> bool {
        self.state == ReadyState::Ready
    }
}

/// Poll loop parameters.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Fixed backoff between polls.
    pub interval: Duration,
    /// Optional wall-clock deadline for the whole wait. `None` polls
    /// without bound, which is intentional: index build time is
    /// data-size-dependent.
    pub deadline: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { interval: Duration::from_secs(2), deadline: None }
    }
}

impl PollOptions {
    /// Options with the default 2 s interval and the given deadline.
    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self { deadline, ..Self::default() }
    }

    /// Remaining options for a follow-up wait that shares this wait's
    /// deadline, after `elapsed` has already been spent.
    pub fn remaining_after(&self, elapsed: Duration) -> Self {
        Self {
            interval: self.interval,
            deadline: self.deadline.map(|deadline| deadline.saturating_sub(elapsed)),
        }
    }
}

/// Outcome of a completed readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyReport {
    /// Number of probe calls issued, including the final ready one.
    pub polls: u32,
    /// Wall-clock time spent waiting.
    pub elapsed: Duration,
}

/// Poll `probe` until it reports ready, sleeping a fixed interval between
/// polls.
///
/// Every non-ready observation is emitted to `observer` as
/// [`BenchEvent::ReadinessPoll`]. Probe errors are fatal and propagate
/// unchanged.
///
/// # Errors
///
/// Returns [`BenchError::Timeout`] once the deadline in `options` expires;
/// no probe call is issued past the deadline.
pub async fn poll_until_ready<F, Fut>(
    mut probe: F,
    options: PollOptions,
    observer: &dyn BenchObserver,
) -> Result<ReadyReport>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ReadyStatus>>,
{
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        if let Some(deadline) = options.deadline {
            if started.elapsed() >= deadline {
                return Err(BenchError::Timeout { elapsed: started.elapsed() });
            }
        }

        let status = probe().await?;
        polls += 1;

        if status.is_ready() {
            return Ok(ReadyReport { polls, elapsed: started.elapsed() });
        }

        observer.on_event(BenchEvent::ReadinessPoll {
            state: status.state,
            pending: status.pending,
        });

        // Never sleep past the deadline; the loop head converts the expiry
        // into a Timeout before the next probe.
        let nap = match options.deadline {
            Some(deadline) => options.interval.min(deadline.saturating_sub(started.elapsed())),
            None => options.interval,
        };
        tokio::time::sleep(nap).await;
    }
}
