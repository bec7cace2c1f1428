//! J/psi Extraction Core
//!
//! Finds J/psi instances in generated events, tells prompt production apart
//! from B-hadron feed-down, and extracts the muon pair of each instance:
//!
//! 1. **Ancestry**: one-hop (or full-chain) mother walk against a fixed B-hadron table
//! 2. **Extraction**: per-event records with muon kinematics and decay vertex
//! 3. **Accumulation**: the per-worker event loop feeding a record sink

pub mod accumulator;
pub mod ancestry;
pub mod extractor;
pub mod hadrons;
pub mod statistics;

// Re-export key types for convenience
pub use accumulator::{RunAccumulator, RunError, RunOutcome};
pub use ancestry::{AncestryClassifier, AncestryError, AncestryPolicy, ProvenanceClass};
pub use extractor::{AnomalyKind, EventExtractor, Extraction, ExtractorConfig, TargetInstance, TopologyAnomaly};
pub use statistics::RunStatistics;
