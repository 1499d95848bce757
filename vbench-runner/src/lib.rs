//! # vbench-runner
//!
//! Benchmark orchestration over the [`vbench_client`] contract:
//!
//! - [`InsertOrchestrator`] - concurrent bulk load with partial-failure
//!   accounting
//! - [`SearchEvaluator`] - sequential query workload with per-query latency
//!   capture
//! - [`BenchRunner`] - the phase driver sequencing
//!   setup → load → optimize → search into a [`RunReport`]
//!
//! Recall computation, dataset loading, and result plotting live outside
//! this crate; it consumes prepared id/vector columns and emits raw
//! per-query records.

pub mod evaluator;
pub mod loader;
pub mod report;
pub mod runner;

pub use evaluator::{SearchErrorPolicy, SearchEvaluator};
pub use loader::{Dataset, InsertOrchestrator, partition};
pub use report::{QueryRecord, RunReport};
pub use runner::{BenchRunner, BenchRunnerBuilder};
