//! Run Accumulator - drives one worker's event loop.
//!
//! # Lifecycle
//!
//! ```text
//! generator.initialize()
//!   for slot in 0..event_count
//!     next_event() ── None ──► miss (warn, count, continue)
//!          │
//!          ▼
//!     extractor.extract() ──► sink.write(record) per record
//!          │
//!          ▼
//!     statistics.record_event()
//! sink.close()  ──► RunOutcome { statistics, generator, dataset }
//! ```
//!
//! Records are written one at a time so memory use does not grow with the
//! run length.

use crate::extractor::{EventExtractor, TargetInstance};
use crate::statistics::RunStatistics;
use jpsi_env::{EnvError, EventGenerator, GeneratorStats, RecordSink};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a worker run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Generator could not be initialized
    #[error("generator: {0}")]
    Generator(EnvError),
    
    /// Durable write or seal failure
    #[error("sink: {0}")]
    Sink(EnvError),
}

/// Everything a finished worker hands back.
#[derive(Debug, Clone)]
pub struct RunOutcome<D> {
    pub statistics: RunStatistics,
    pub generator: GeneratorStats,
    
    /// Sealed dataset handle from the sink
    pub dataset: D,
}

/// Owns one generator and one sink for the duration of a run.
pub struct RunAccumulator<G, S> {
    generator: G,
    sink: S,
    extractor: EventExtractor,
    statistics: RunStatistics,
}

impl<G, S> RunAccumulator<G, S>
where
    G: EventGenerator,
    S: RecordSink<TargetInstance>,
{
    /// Takes ownership of a configured (not necessarily initialized) generator.
    pub fn new(generator: G, sink: S, extractor: EventExtractor) -> Self {
        Self {
            generator,
            sink,
            extractor,
            statistics: RunStatistics::default(),
        }
    }
    
    /// Runs exactly `event_count` slots, then seals the sink.
    pub fn run(mut self, event_count: u64) -> Result<RunOutcome<S::Dataset>, RunError> {
        self.generator.initialize().map_err(RunError::Generator)?;
        
        for slot in 0..event_count {
            self.step(slot)?;
        }
        
        let dataset = self.sink.close().map_err(RunError::Sink)?;
        let generator = self.generator.stats();
        
        info!(
            "{} events requested: {}",
            self.statistics.events_requested, self.statistics
        );
        debug!(
            attempted = generator.attempted,
            generated = generator.generated,
            failed = generator.failed,
            "generator statistics"
        );
        
        Ok(RunOutcome {
            statistics: self.statistics,
            generator,
            dataset,
        })
    }
    
    fn step(&mut self, slot: u64) -> Result<(), RunError> {
        let Some(event) = self.generator.next_event() else {
            warn!(slot, "generator returned no event, skipping slot");
            self.statistics.record_miss();
            return Ok(());
        };
        
        let extraction = self.extractor.extract(&event);
        for anomaly in &extraction.anomalies {
            warn!("malformed decay topology: {}", anomaly);
        }
        for record in &extraction.records {
            self.sink.write(record).map_err(RunError::Sink)?;
        }
        
        debug!(
            slot,
            particles = event.len(),
            instances = extraction.instances(),
            "event extracted"
        );
        self.statistics.record_event(&extraction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestry::ProvenanceClass;
    use jpsi_env::{Event, MemorySink, Particle};
    use nalgebra::Vector4;
    use std::collections::VecDeque;
    
    /// Hands out a fixed queue of slots.
    struct QueueGenerator {
        slots: VecDeque<Option<Event>>,
        initialized: bool,
        stats: GeneratorStats,
    }
    
    impl QueueGenerator {
        fn new(slots: Vec<Option<Event>>) -> Self {
            Self { slots: slots.into(), initialized: false, stats: GeneratorStats::default() }
        }
    }
    
    impl EventGenerator for QueueGenerator {
        fn configure(&mut self, _setting: &str) -> Result<(), EnvError> {
            Ok(())
        }
        
        fn initialize(&mut self) -> Result<(), EnvError> {
            self.initialized = true;
            Ok(())
        }
        
        fn next_event(&mut self) -> Option<Event> {
            assert!(self.initialized);
            let event = self.slots.pop_front().flatten();
            self.stats.record(event.is_some());
            event
        }
        
        fn stats(&self) -> GeneratorStats {
            self.stats
        }
    }
    
    /// Sink whose writes always fail.
    struct BrokenSink;
    
    impl RecordSink<TargetInstance> for BrokenSink {
        type Dataset = ();
        
        fn write(&mut self, _record: &TargetInstance) -> Result<(), EnvError> {
            Err(EnvError::Io(std::io::Error::other("disk full")))
        }
        
        fn close(&mut self) -> Result<(), EnvError> {
            Ok(())
        }
    }
    
    fn particle(id: i32, mother: usize) -> Particle {
        Particle::new(id, mother, Vector4::zeros())
    }
    
    fn jpsi_event(number: u64, from_b: bool) -> Event {
        Event::from_particles(number, [
            particle(2212, 0),
            particle(if from_b { 521 } else { 21 }, 0),
            particle(443, 1).with_daughters(3, 4),
            particle(-13, 2),
            particle(13, 2),
        ])
    }
    
    fn empty_event(number: u64) -> Event {
        Event::from_particles(number, [particle(2212, 0), particle(211, 0)])
    }
    
    #[test]
    fn test_run_counts_and_records() {
        let generator = QueueGenerator::new(vec![
            Some(jpsi_event(0, true)),
            None,
            Some(empty_event(2)),
            Some(jpsi_event(3, false)),
        ]);
        let outcome = RunAccumulator::new(generator, MemorySink::new(), EventExtractor::default())
            .run(4)
            .unwrap();
        
        let stats = outcome.statistics;
        assert_eq!(stats.events_requested, 4);
        assert_eq!(stats.events_generated, 3);
        assert_eq!(stats.generation_misses, 1);
        assert_eq!(stats.events_without_target, 1);
        assert_eq!((stats.prompt, stats.non_prompt), (1, 1));
        assert!(stats.is_consistent());
        
        assert_eq!(outcome.generator.failed, 1);
        let provenance: Vec<(u64, ProvenanceClass)> =
            outcome.dataset.iter().map(|r| (r.event, r.provenance)).collect();
        assert_eq!(provenance, vec![(0, ProvenanceClass::NonPrompt), (3, ProvenanceClass::Prompt)]);
    }
    
    #[test]
    fn test_exhausted_generator_counts_misses() {
        let generator = QueueGenerator::new(vec![Some(jpsi_event(0, false))]);
        let outcome = RunAccumulator::new(generator, MemorySink::new(), EventExtractor::default())
            .run(3)
            .unwrap();
        
        assert_eq!(outcome.statistics.events_requested, 3);
        assert_eq!(outcome.statistics.generation_misses, 2);
        assert_eq!(outcome.dataset.len(), 1);
    }
    
    #[test]
    fn test_zero_events_still_closes_sink() {
        let outcome = RunAccumulator::new(QueueGenerator::new(vec![]), MemorySink::new(), EventExtractor::default())
            .run(0)
            .unwrap();
        
        assert!(outcome.dataset.is_empty());
        assert_eq!(outcome.statistics, RunStatistics::default());
    }
    
    #[test]
    fn test_sink_failure_is_fatal() {
        let generator = QueueGenerator::new(vec![Some(jpsi_event(0, true))]);
        let result = RunAccumulator::new(generator, BrokenSink, EventExtractor::default()).run(1);
        
        assert!(matches!(result, Err(RunError::Sink(EnvError::Io(_)))));
    }
}
