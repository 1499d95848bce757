//! Error types shared across the benchmarking harness.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors surfaced through the client contract and the run phases built on it.
///
/// Each variant corresponds to one failure class a benchmark caller must be
/// able to distinguish: connection failures are retryable across phases,
/// schema failures abort the run, insert failures carry the number of
/// records committed before the failure, and timeouts are kept separate from
/// backend errors so "backend broken" and "backend just slow" stay apart.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Connecting to or pinging the backend failed.
    #[error("Connection error ({backend}): {message}")]
    Connection {
        /// The backend driver that produced the error.
        backend: &'static str,
        /// A description of the failure.
        message: String,
    },

    /// The backend rejected the collection schema or index parameters.
    #[error("Schema error ({backend}): {message}")]
    Schema {
        /// The backend driver that produced the error.
        backend: &'static str,
        /// A description of the failure.
        message: String,
    },

    /// An insert operation failed after committing part of its input.
    #[error("Insert error ({backend}) after {inserted} committed records: {message}")]
    Insert {
        /// The backend driver that produced the error.
        backend: &'static str,
        /// Records committed before the failure, within the failing call.
        inserted: usize,
        /// A description of the failure.
        message: String,
    },

    /// A single search query failed.
    #[error("Search error ({backend}): {message}")]
    Search {
        /// The backend driver that produced the error.
        backend: &'static str,
        /// A description of the failure.
        message: String,
    },

    /// A readiness poll loop exceeded its caller-supplied deadline.
    #[error("Readiness deadline exceeded after {elapsed:?}")]
    Timeout {
        /// Wall-clock time spent waiting before giving up.
        elapsed: Duration,
    },

    /// Connection parameters or benchmark configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BenchError {
    /// Records committed before the failure, for [`BenchError::Insert`].
    ///
    /// Returns `0` for every other variant so orchestration code can
    /// accumulate committed counts without matching on the variant.
    pub fn committed(&self) -> usize {
        match self {
            BenchError::Insert { inserted, .. } => *inserted,
            _ => 0,
        }
    }

    /// Restamp a [`BenchError::Timeout`] with the elapsed time since
    /// `started`; other variants pass through unchanged.
    ///
    /// A poll loop times only its own wait. Drivers that chain several
    /// loops into one optimize call use this to report the wait across the
    /// whole sequence.
    pub fn timeout_since(self, started: Instant) -> Self {
        match self {
            BenchError::Timeout { .. } => BenchError::Timeout { elapsed: started.elapsed() },
            other => other,
        }
    }

    /// Whether this error is a readiness-poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BenchError::Timeout { .. })
    }
}

/// A convenience result type for client and harness operations.
pub type Result<T> = std::result::Result<T, BenchError>;
