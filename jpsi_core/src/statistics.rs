//! Per-worker run counters.

use crate::extractor::Extraction;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Counters for one worker run.
///
/// Invariants:
/// - `events_generated + generation_misses == events_requested`
/// - `prompt + non_prompt + malformed == target_instances`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Loop iterations (event slots)
    pub events_requested: u64,
    
    /// Slots for which the generator produced an event
    pub events_generated: u64,
    
    /// Slots for which the generator produced nothing
    pub generation_misses: u64,
    
    /// Generated events with zero target instances
    pub events_without_target: u64,
    
    /// Target instances found, well-formed or not
    pub target_instances: u64,
    
    pub prompt: u64,
    pub non_prompt: u64,
    
    /// Instances skipped because of a malformed decay topology
    pub malformed: u64,
}

impl RunStatistics {
    /// Counts a slot the generator could not fill.
    pub fn record_miss(&mut self) {
        self.events_requested += 1;
        self.generation_misses += 1;
    }
    
    /// Counts one extracted event.
    pub fn record_event(&mut self, extraction: &Extraction) {
        self.events_requested += 1;
        self.events_generated += 1;
        if extraction.is_empty() {
            self.events_without_target += 1;
        }
        self.target_instances += extraction.instances() as u64;
        self.prompt += extraction.prompt as u64;
        self.non_prompt += extraction.non_prompt as u64;
        self.malformed += extraction.anomalies.len() as u64;
    }
    
    /// Records that were written to the sink.
    pub fn records_written(&self) -> u64 {
        self.prompt + self.non_prompt
    }
    
    /// Fraction of extracted instances that are non-prompt.
    pub fn non_prompt_fraction(&self) -> f64 {
        let written = self.records_written();
        if written == 0 {
            return 0.0;
        }
        self.non_prompt as f64 / written as f64
    }
    
    /// True if both counter invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.events_generated + self.generation_misses == self.events_requested
            && self.prompt + self.non_prompt + self.malformed == self.target_instances
    }
}

impl AddAssign for RunStatistics {
    fn add_assign(&mut self, other: Self) {
        self.events_requested += other.events_requested;
        self.events_generated += other.events_generated;
        self.generation_misses += other.generation_misses;
        self.events_without_target += other.events_without_target;
        self.target_instances += other.target_instances;
        self.prompt += other.prompt;
        self.non_prompt += other.non_prompt;
        self.malformed += other.malformed;
    }
}

impl std::iter::Sum for RunStatistics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, stats| {
            acc += stats;
            acc
        })
    }
}

impl std::fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events generated ({} misses), {} without J/psi | {} J/psi: {} prompt, {} non-prompt, {} malformed",
            self.events_generated,
            self.generation_misses,
            self.events_without_target,
            self.target_instances,
            self.prompt,
            self.non_prompt,
            self.malformed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{AnomalyKind, TopologyAnomaly};
    
    #[test]
    fn test_empty_event_counts_as_without_target() {
        let mut stats = RunStatistics::default();
        stats.record_event(&Extraction::default());
        
        assert_eq!(stats.events_without_target, 1);
        assert_eq!(stats.events_generated, 1);
        assert_eq!(stats.target_instances, 0);
        assert!(stats.is_consistent());
    }
    
    #[test]
    fn test_anomaly_only_event_is_not_without_target() {
        let extraction = Extraction {
            anomalies: vec![TopologyAnomaly { event: 0, index: 3, kind: AnomalyKind::MissingDaughter }],
            ..Extraction::default()
        };
        let mut stats = RunStatistics::default();
        stats.record_event(&extraction);
        
        assert_eq!(stats.events_without_target, 0);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.target_instances, 1);
        assert!(stats.is_consistent());
    }
    
    #[test]
    fn test_miss_counts() {
        let mut stats = RunStatistics::default();
        stats.record_miss();
        stats.record_miss();
        
        assert_eq!(stats.events_requested, 2);
        assert_eq!(stats.generation_misses, 2);
        assert_eq!(stats.events_generated, 0);
        assert!(stats.is_consistent());
    }
    
    #[test]
    fn test_sum_of_workers() {
        let a = RunStatistics { events_requested: 10, events_generated: 10, target_instances: 4, prompt: 3, non_prompt: 1, ..Default::default() };
        let b = RunStatistics { events_requested: 5, events_generated: 4, generation_misses: 1, events_without_target: 4, ..Default::default() };
        
        let total: RunStatistics = [a, b].into_iter().sum();
        assert_eq!(total.events_requested, 15);
        assert_eq!(total.generation_misses, 1);
        assert_eq!(total.records_written(), 4);
        assert_eq!(total.non_prompt_fraction(), 0.25);
        assert!(total.is_consistent());
    }
}
