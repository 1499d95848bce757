//! # vbench-client
//!
//! Uniform vector-database client contract for the vbench benchmarking
//! harness.
//!
//! This crate defines:
//! - [`VectorClient`] / [`ClientSession`] - the capability set every
//!   backend driver implements (schema setup, scoped sessions, insert,
//!   optimize, search)
//! - [`BenchError`] - the error taxonomy benchmark callers match on
//! - [`poll_until_ready`] - the generic readiness poll primitive backing
//!   every driver's `optimize`
//! - [`BenchObserver`] - the injected observability sink
//! - [`ClientRegistry`] - backend selection by identifier
//! - [`InMemoryClient`] - the always-available reference driver
//!
//! Production drivers are feature-gated: `tidb` (TiDB Serverless over
//! sqlx/MySQL) and `qdrant` (Qdrant over gRPC).

pub mod client;
pub mod config;
pub mod error;
pub mod inmemory;
pub mod observe;
pub mod ready;
pub mod registry;

#[cfg(feature = "qdrant")]
pub mod qdrant;
#[cfg(feature = "tidb")]
pub mod tidb;

pub use client::{ClientSession, RecordBatch, VectorClient};
pub use config::{
    CollectionSchema, ConnectionParams, IndexDescriptor, MetricType, SearchFilters,
};
pub use error::{BenchError, Result};
pub use inmemory::InMemoryClient;
pub use observe::{BenchEvent, BenchObserver, MemoryObserver, Phase, TracingObserver};
pub use ready::{PollOptions, ReadyReport, ReadyState, ReadyStatus, poll_until_ready};
pub use registry::{ClientFactory, ClientRegistry};
