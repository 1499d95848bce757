//! Serializable run results.

use std::time::Duration;

use serde::Serialize;

/// Outcome of a single search query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    /// Zero-based query index within the workload.
    pub index: usize,
    /// Record ids in backend order, empty if the query failed.
    pub ids: Vec<i64>,
    /// Wall-clock latency of the backend call.
    pub latency: Duration,
    /// Failure description, when the query was skipped under
    /// [`SearchErrorPolicy::Skip`](crate::SearchErrorPolicy::Skip).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated results of one benchmark run.
///
/// Recall and latency statistics are computed downstream from the raw
/// per-query records; this report only collects.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Backend identifier of the driver under test.
    pub backend: String,
    /// Records committed across all insert workers.
    pub inserted: usize,
    /// First insert failure, if the load phase did not complete. A failed
    /// load still reports the accurate committed count, and the optimize
    /// and search phases are skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_error: Option<String>,
    /// Wall-clock duration of the load phase.
    pub load_duration: Duration,
    /// Wall-clock duration of the optimize phase; `None` if it was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_duration: Option<Duration>,
    /// Per-query outcomes, in workload order.
    pub queries: Vec<QueryRecord>,
}

impl RunReport {
    /// Whether the load phase committed every record without error.
    pub fn load_complete(&self) -> bool {
        self.insert_error.is_none()
    }
}
