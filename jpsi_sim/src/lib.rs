//! Parallel J/psi production harness
//!
//! Splits a run into isolated workers, each with its own seeded generator and
//! its own output file, then merges the sealed files once every worker has
//! finished.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ParallelRunner                         │
//! │                                                             │
//! │  RunConfig ──► WorkerPlan (seed = base + i*stride)          │
//! │                    │                                        │
//! │  ┌─────────────────▼──────────────┐                         │
//! │  │ worker i (blocking thread)     │   ... x N               │
//! │  │  ToyGenerator ──► RunAccumulator ──► JsonLinesSink       │
//! │  └────────────────────────────────┘                         │
//! │                    │                                        │
//! │               barrier (all joined)                          │
//! │                    │                                        │
//! │             JsonLinesMerger ──► Merged_JpsiToMuMu.jsonl     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use jpsi_sim::{ParallelRunner, RunConfig};
//!
//! let config = RunConfig::charmonium_7tev()
//!     .with_workers(4, 1_000)
//!     .with_output_dir("out");
//!
//! let report = ParallelRunner::toy(config).run_to_files().await?;
//! println!("{}", report.totals);
//! ```

mod config;
mod exporter;
mod generator;
mod parallel;

pub use config::{ConfigError, RunConfig, WorkerPlan, WORKER_PLACEHOLDER};
pub use exporter::{read_records, write_json, DatasetFile, JsonLinesMerger, JsonLinesSink};
pub use generator::{ReplayGenerator, ToyGenerator, ToySettings, DEFAULT_SEED};
pub use parallel::{
    DatasetOf, FailureKind, ParallelRunner, RunReport, RunnerError, ToyWorkerFactory, WorkerFactory,
    WorkerFailure, WorkerReport,
};
