//! Parallel runner - isolated workers, one barrier, one merge.
//!
//! ```text
//!            ┌── worker 0 (seed b)        : generator + sink ──┐
//!  plans ────┼── worker 1 (seed b + s)    : generator + sink ──┼──► barrier ──► merge
//!            └── worker n (seed b + n*s)  : generator + sink ──┘
//! ```
//!
//! Workers share nothing. Each runs on tokio's blocking pool and hands back
//! its statistics and sealed dataset as a return value. Failed, panicked or
//! timed-out workers are reported and left out of the merge; their siblings
//! keep running.

use crate::config::{ConfigError, RunConfig, WorkerPlan};
use crate::exporter::{JsonLinesMerger, JsonLinesSink};
use crate::generator::ToyGenerator;
use jpsi_core::{EventExtractor, RunAccumulator, RunStatistics, TargetInstance};
use jpsi_env::{DatasetMerger, EnvError, EventGenerator, GeneratorStats, RecordSink, WorkerId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, info_span};

/// Builds the generator and sink a worker owns.
///
/// Called on the worker's own thread, once per worker.
pub trait WorkerFactory: Send + Sync + 'static {
    type Generator: EventGenerator + 'static;
    type Sink: RecordSink<TargetInstance> + 'static;
    
    fn build(&self, plan: &WorkerPlan) -> Result<(Self::Generator, Self::Sink), EnvError>;
}

/// Dataset handle produced by a factory's sink.
pub type DatasetOf<F> = <<F as WorkerFactory>::Sink as RecordSink<TargetInstance>>::Dataset;

/// Toy generator writing JSON-lines files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToyWorkerFactory;

impl WorkerFactory for ToyWorkerFactory {
    type Generator = ToyGenerator;
    type Sink = JsonLinesSink;
    
    fn build(&self, plan: &WorkerPlan) -> Result<(ToyGenerator, JsonLinesSink), EnvError> {
        let generator = ToyGenerator::with_settings(&plan.settings)?;
        let sink = JsonLinesSink::create(&plan.output)?;
        Ok((generator, sink))
    }
}

/// Why a worker was left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("setup failed: {0}")]
    Setup(String),
    
    #[error("run failed: {0}")]
    Run(String),
    
    #[error("panicked: {0}")]
    Panicked(String),
    
    #[error("did not finish before the deadline")]
    TimedOut,
}

/// A worker that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{worker} (seed={seed}) {kind}")]
pub struct WorkerFailure {
    pub worker: WorkerId,
    pub seed: u64,
    pub kind: FailureKind,
}

/// A worker that completed and sealed its dataset.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub seed: u64,
    pub statistics: RunStatistics,
    pub generator: GeneratorStats,
    pub elapsed_secs: f64,
}

/// Result of a parallel run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<M> {
    /// Merged dataset of every successful worker
    pub merged: M,
    
    /// Successful workers in worker order
    pub workers: Vec<WorkerReport>,
    
    /// Excluded workers in worker order
    pub failures: Vec<WorkerFailure>,
    
    /// Sum of the successful workers' statistics
    pub totals: RunStatistics,
}

impl<M> RunReport<M> {
    /// True if every worker completed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Errors that prevent the run as a whole.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    
    #[error("Merge failed: {0}")]
    Merge(EnvError),
}

/// Runs workers in parallel and merges their datasets.
pub struct ParallelRunner<F> {
    config: RunConfig,
    factory: Arc<F>,
}

impl ParallelRunner<ToyWorkerFactory> {
    /// Toy generator + JSON-lines files, merged into `config.merged_path()`.
    pub fn toy(config: RunConfig) -> Self {
        Self::new(config, ToyWorkerFactory)
    }
    
    /// Runs and merges into the configured merged-output file.
    pub async fn run_to_files(&self) -> Result<RunReport<DatasetOf<ToyWorkerFactory>>, RunnerError> {
        let merger = JsonLinesMerger::new(self.config.merged_path());
        self.run_all(&merger).await
    }
}

impl<F: WorkerFactory> ParallelRunner<F> {
    pub fn new(config: RunConfig, factory: F) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
        }
    }
    
    pub fn config(&self) -> &RunConfig {
        &self.config
    }
    
    /// Runs every worker, waits for all of them, then merges.
    pub async fn run_all<M>(&self, merger: &M) -> Result<RunReport<M::Output>, RunnerError>
    where
        M: DatasetMerger<DatasetOf<F>>,
    {
        self.config.validate()?;
        info!(
            "Starting {} workers x {} events (seed {} + i*{})",
            self.config.workers, self.config.events_per_worker, self.config.base_seed, self.config.seed_stride
        );
        
        let deadline = self
            .config
            .worker_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        
        let mut handles = Vec::with_capacity(self.config.workers as usize);
        for plan in self.config.plans() {
            let factory = Arc::clone(&self.factory);
            let extractor = EventExtractor::new(self.config.extractor);
            let (worker, seed) = (plan.worker, plan.seed);
            let handle = tokio::task::spawn_blocking(move || run_worker(factory.as_ref(), &plan, extractor));
            handles.push((worker, seed, handle));
        }
        
        // Barrier: every handle is awaited before anything is merged.
        let mut datasets = Vec::new();
        let mut workers = Vec::new();
        let mut failures = Vec::new();
        for (worker, seed, handle) in handles {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        failures.push(WorkerFailure { worker, seed, kind: FailureKind::TimedOut });
                        continue;
                    }
                },
                None => handle.await,
            };
            
            match joined {
                Ok(Ok((report, dataset))) => {
                    workers.push(report);
                    datasets.push(dataset);
                }
                Ok(Err(kind)) => failures.push(WorkerFailure { worker, seed, kind }),
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "cancelled".to_string()
                    };
                    failures.push(WorkerFailure { worker, seed, kind: FailureKind::Panicked(message) });
                }
            }
        }
        
        for failure in &failures {
            error!("✗ {}", failure);
        }
        
        let totals: RunStatistics = workers.iter().map(|w| w.statistics).sum();
        let merged = merger.merge(datasets).map_err(RunnerError::Merge)?;
        info!(
            "✓ {}/{} workers merged | {}",
            workers.len(),
            self.config.workers,
            totals
        );
        
        Ok(RunReport {
            merged,
            workers,
            failures,
            totals,
        })
    }
}

/// Body of one worker; runs on a blocking thread.
fn run_worker<F: WorkerFactory>(
    factory: &F,
    plan: &WorkerPlan,
    extractor: EventExtractor,
) -> Result<(WorkerReport, DatasetOf<F>), FailureKind> {
    let span = info_span!("worker", id = plan.worker.index(), seed = plan.seed);
    let _guard = span.enter();
    let started = Instant::now();
    
    let (generator, sink) = factory
        .build(plan)
        .map_err(|e| FailureKind::Setup(e.to_string()))?;
    
    let outcome = RunAccumulator::new(generator, sink, extractor)
        .run(plan.events)
        .map_err(|e| FailureKind::Run(e.to_string()))?;
    
    let report = WorkerReport {
        worker: plan.worker,
        seed: plan.seed,
        statistics: outcome.statistics,
        generator: outcome.generator,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    Ok((report, outcome.dataset))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ReplayGenerator;
    use jpsi_core::ProvenanceClass;
    use jpsi_env::{ConcatMerger, Event, MemorySink, Particle};
    use nalgebra::Vector4;
    use std::time::Duration;
    
    fn particle(id: i32, mother: usize) -> Particle {
        Particle::new(id, mother, Vector4::zeros())
    }
    
    /// One J/psi per event; non-prompt on odd workers.
    fn one_jpsi(worker: u32, number: u64) -> Event {
        let mother_code = if worker % 2 == 1 { 511 } else { 21 };
        Event::from_particles(number, [
            particle(2212, 0),
            particle(mother_code, 0),
            particle(443, 1).with_daughters(3, 4),
            Particle::new(-13, 2, Vector4::new(f64::from(worker), number as f64, 1.0, 2.0)),
            particle(13, 2),
        ])
    }
    
    /// Replays `events` one-J/psi events; worker ids listed in `panics` blow up.
    struct ReplayFactory {
        panics: Vec<u32>,
        stall: Option<(u32, Duration)>,
    }
    
    impl ReplayFactory {
        fn healthy() -> Self {
            Self { panics: Vec::new(), stall: None }
        }
    }
    
    impl WorkerFactory for ReplayFactory {
        type Generator = ReplayGenerator;
        type Sink = MemorySink<TargetInstance>;
        
        fn build(&self, plan: &WorkerPlan) -> Result<(ReplayGenerator, MemorySink<TargetInstance>), EnvError> {
            let worker = plan.worker.index();
            if self.panics.contains(&worker) {
                panic!("generator crashed in worker {}", worker);
            }
            if let Some((slow, delay)) = self.stall {
                if slow == worker {
                    std::thread::sleep(delay);
                }
            }
            
            let mut generator = ReplayGenerator::from_events((0..plan.events).map(|n| one_jpsi(worker, n)));
            for setting in &plan.settings {
                generator.configure(setting)?;
            }
            Ok((generator, MemorySink::new()))
        }
    }
    
    fn config(workers: u32, events: u64) -> RunConfig {
        RunConfig::default().with_workers(workers, events)
    }
    
    #[tokio::test]
    async fn test_three_workers_merge_thirty_records() {
        let runner = ParallelRunner::new(config(3, 10), ReplayFactory::healthy());
        let report = runner.run_all(&ConcatMerger).await.unwrap();
        
        assert!(report.is_success());
        assert_eq!(report.merged.len(), 30);
        assert_eq!(report.workers.len(), 3);
        
        let summed: RunStatistics = report.workers.iter().map(|w| w.statistics).sum();
        assert_eq!(summed, report.totals);
        assert_eq!(report.totals.target_instances, 30);
        assert_eq!(report.totals.events_requested, 30);
        assert_eq!((report.totals.prompt, report.totals.non_prompt), (20, 10));
        assert!(report.totals.is_consistent());
    }
    
    #[tokio::test]
    async fn test_order_within_worker_preserved() {
        let runner = ParallelRunner::new(config(2, 5), ReplayFactory::healthy());
        let merged = runner.run_all(&ConcatMerger).await.unwrap().merged;
        
        // muon_px[0] carries the worker id, muon_py[0] the event number.
        for worker in 0..2 {
            let events: Vec<f64> = merged
                .iter()
                .filter(|r| r.muon_px[0] == f64::from(worker))
                .map(|r| r.muon_py[0])
                .collect();
            assert_eq!(events, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        }
        assert!(merged[5..].iter().all(|r| r.provenance == ProvenanceClass::NonPrompt));
    }
    
    #[tokio::test]
    async fn test_workers_receive_distinct_seeds() {
        let report = ParallelRunner::new(config(4, 1).with_seeds(500, 25), ReplayFactory::healthy())
            .run_all(&ConcatMerger)
            .await
            .unwrap();
        
        let seeds: Vec<u64> = report.workers.iter().map(|w| w.seed).collect();
        assert_eq!(seeds, vec![500, 525, 550, 575]);
    }
    
    #[tokio::test]
    async fn test_panicking_worker_is_excluded() {
        let factory = ReplayFactory { panics: vec![1], stall: None };
        let report = ParallelRunner::new(config(3, 4), factory)
            .run_all(&ConcatMerger)
            .await
            .unwrap();
        
        assert!(!report.is_success());
        assert_eq!(report.merged.len(), 8);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].worker, WorkerId(1));
        assert!(matches!(&report.failures[0].kind, FailureKind::Panicked(m) if m.contains("worker 1")));
        assert_eq!(report.totals.target_instances, 8);
    }
    
    #[tokio::test]
    async fn test_slow_worker_times_out() {
        let factory = ReplayFactory { panics: Vec::new(), stall: Some((0, Duration::from_millis(500))) };
        let report = ParallelRunner::new(config(2, 3).with_timeout(Duration::from_millis(50)), factory)
            .run_all(&ConcatMerger)
            .await
            .unwrap();
        
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::TimedOut);
        assert_eq!(report.merged.len(), 3);
    }
    
    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = ParallelRunner::new(config(0, 1), ReplayFactory::healthy())
            .run_all(&ConcatMerger)
            .await;
        assert!(matches!(result, Err(RunnerError::Config(ConfigError::NoWorkers))));
    }
    
    #[tokio::test]
    async fn test_toy_run_writes_merged_file() {
        let dir = std::env::temp_dir().join(format!("jpsi-parallel-toy-{}", std::process::id()));
        let config = RunConfig::charmonium_7tev()
            .with_workers(2, 20)
            .with_output_dir(&dir);
        
        let report = ParallelRunner::toy(config.clone()).run_to_files().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.merged.path, config.merged_path());
        assert_eq!(report.merged.records, report.totals.records_written());
        assert!(report.totals.is_consistent());
        
        let merged: Vec<TargetInstance> = crate::exporter::read_records(config.merged_path()).unwrap();
        assert_eq!(merged.len() as u64, report.merged.records);
        for worker in 0..2 {
            assert!(config.output_path(worker).exists());
        }
        
        std::fs::remove_dir_all(&dir).ok();
    }
    
    async fn merged_bytes(tag: &str, base_seed: u64) -> Vec<u8> {
        let dir = std::env::temp_dir().join(format!("jpsi-parallel-{}-{}", tag, std::process::id()));
        let config = RunConfig::charmonium_7tev()
            .with_workers(3, 30)
            .with_seeds(base_seed, 100)
            .with_output_dir(&dir);
        
        let report = ParallelRunner::toy(config).run_to_files().await.unwrap();
        assert!(report.merged.records > 0);
        let bytes = std::fs::read(&report.merged.path).unwrap();
        
        std::fs::remove_dir_all(&dir).ok();
        bytes
    }
    
    #[tokio::test]
    async fn test_same_seed_gives_identical_files() {
        let first = merged_bytes("seed-a", 10_000).await;
        let second = merged_bytes("seed-b", 10_000).await;
        assert_eq!(first, second);
        
        let other = merged_bytes("seed-c", 20_000).await;
        assert_ne!(first, other);
    }
    
    #[test]
    fn test_failure_display() {
        let failure = WorkerFailure { worker: WorkerId(2), seed: 10_200, kind: FailureKind::TimedOut };
        assert_eq!(failure.to_string(), "worker-2 (seed=10200) did not finish before the deadline");
    }
}
