//! Run configuration: worker partitioning, seeds, output naming.

use jpsi_core::{AncestryPolicy, ExtractorConfig};
use jpsi_env::WorkerId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Placeholder replaced by the worker number in `output_pattern`.
pub const WORKER_PLACEHOLDER: &str = "{worker}";

/// Invalid run configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one worker is required")]
    NoWorkers,
    
    #[error("output pattern '{0}' must contain {{worker}} when running several workers")]
    AmbiguousOutput(String),
    
    #[error("merged output '{0}' collides with a worker output")]
    MergedCollision(String),
    
    #[error("seed stride must be non-zero for several workers")]
    ZeroStride,
    
    #[error("seed of worker {0} overflows u64")]
    SeedOverflow(u32),
}

/// Configuration for a parallel run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of isolated workers
    pub workers: u32,
    
    /// Event slots per worker
    pub events_per_worker: u64,
    
    /// Seed of worker 0
    pub base_seed: u64,
    
    /// Seed distance between consecutive workers
    pub seed_stride: u64,
    
    /// Directory receiving every output file
    pub output_dir: PathBuf,
    
    /// Per-worker file name, `{worker}` is replaced by the worker number
    pub output_pattern: String,
    
    /// File name of the merged dataset
    pub merged_output: String,
    
    /// Generator settings applied to every worker, before its seed
    pub generator_settings: Vec<String>,
    
    /// What to extract and how to classify it
    pub extractor: ExtractorConfig,
    
    /// Deadline for the whole worker set (None = wait forever)
    pub worker_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            events_per_worker: 20_000,
            base_seed: 10_000,
            seed_stride: 100,
            output_dir: PathBuf::from("."),
            output_pattern: format!("JpsiToMuMu_{}.jsonl", WORKER_PLACEHOLDER),
            merged_output: "Merged_JpsiToMuMu.jsonl".to_string(),
            generator_settings: Vec::new(),
            extractor: ExtractorConfig::default(),
            worker_timeout: None,
        }
    }
}

/// Everything one worker needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlan {
    pub worker: WorkerId,
    pub seed: u64,
    pub events: u64,
    
    /// Final path of the worker's dataset
    pub output: PathBuf,
    
    /// Shared settings followed by the worker's seed settings
    pub settings: Vec<String>,
}

impl RunConfig {
    /// pp collisions at 7 TeV with vertex spread, J/psi -> mu+ mu-.
    pub fn charmonium_7tev() -> Self {
        Self {
            generator_settings: vec![
                "Beams:idA = 2212".to_string(),
                "Beams:idB = 2212".to_string(),
                "Beams:eCM = 7000.".to_string(),
                "Charmonium:all = on".to_string(),
                "PhaseSpace:pTHatMin = 0.5".to_string(),
                "Beams:allowVertexSpread = on".to_string(),
                "443:onIfMatch = 13 -13".to_string(),
            ],
            ..Self::default()
        }
    }
    
    /// pp collisions at 13 TeV without vertex spread.
    pub fn charmonium_13tev() -> Self {
        Self {
            generator_settings: vec![
                "Beams:idA = 2212".to_string(),
                "Beams:idB = 2212".to_string(),
                "Beams:eCM = 13000.".to_string(),
                "Charmonium:all = on".to_string(),
                "443:onIfMatch = 13 -13".to_string(),
            ],
            ..Self::default()
        }
    }
    
    /// Sets worker count and events per worker.
    pub fn with_workers(mut self, workers: u32, events_per_worker: u64) -> Self {
        self.workers = workers;
        self.events_per_worker = events_per_worker;
        self
    }
    
    /// Sets base seed and stride.
    pub fn with_seeds(mut self, base_seed: u64, seed_stride: u64) -> Self {
        self.base_seed = base_seed;
        self.seed_stride = seed_stride;
        self
    }
    
    /// Sets the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
    
    /// Appends one generator setting.
    pub fn with_setting(mut self, setting: impl Into<String>) -> Self {
        self.generator_settings.push(setting.into());
        self
    }
    
    /// Sets the ancestry policy.
    pub fn with_policy(mut self, policy: AncestryPolicy) -> Self {
        self.extractor.policy = policy;
        self
    }
    
    /// Sets the worker deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }
    
    /// Seed of worker `i`: `base_seed + i * seed_stride`.
    pub fn seed_for(&self, worker: u32) -> u64 {
        self.base_seed
            .wrapping_add(u64::from(worker).wrapping_mul(self.seed_stride))
    }
    
    /// Final dataset path of worker `i`.
    pub fn output_path(&self, worker: u32) -> PathBuf {
        let name = self.output_pattern.replace(WORKER_PLACEHOLDER, &worker.to_string());
        self.output_dir.join(name)
    }
    
    /// Path of the merged dataset.
    pub fn merged_path(&self) -> PathBuf {
        self.output_dir.join(&self.merged_output)
    }
    
    /// Checks that workers get distinct seeds and distinct files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.workers > 1 {
            if !self.output_pattern.contains(WORKER_PLACEHOLDER) {
                return Err(ConfigError::AmbiguousOutput(self.output_pattern.clone()));
            }
            if self.seed_stride == 0 {
                return Err(ConfigError::ZeroStride);
            }
        }
        
        let last = self.workers - 1;
        u64::from(last)
            .checked_mul(self.seed_stride)
            .and_then(|offset| self.base_seed.checked_add(offset))
            .ok_or(ConfigError::SeedOverflow(last))?;
        
        let merged = self.merged_path();
        if (0..self.workers).any(|i| self.output_path(i) == merged) {
            return Err(ConfigError::MergedCollision(self.merged_output.clone()));
        }
        
        Ok(())
    }
    
    /// One plan per worker, in worker order.
    pub fn plans(&self) -> Vec<WorkerPlan> {
        (0..self.workers)
            .map(|i| {
                let seed = self.seed_for(i);
                let mut settings = self.generator_settings.clone();
                settings.push("Random:setSeed = on".to_string());
                settings.push(format!("Random:seed = {}", seed));
                
                WorkerPlan {
                    worker: WorkerId(i),
                    seed,
                    events: self.events_per_worker,
                    output: self.output_path(i),
                    settings,
                }
            })
            .collect()
    }
}
