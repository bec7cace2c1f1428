//! In-memory sink and merger.

use crate::error::EnvError;
use crate::sink::{DatasetMerger, RecordSink};

/// Sink that keeps records in a `Vec`.
///
/// Used by tests and by callers that post-process records directly instead
/// of persisting them.
#[derive(Debug)]
pub struct MemorySink<R> {
    records: Vec<R>,
    closed: bool,
}

impl<R> MemorySink<R> {
    /// Creates an empty, open sink.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            closed: false,
        }
    }
    
    /// Records written so far.
    pub fn records(&self) -> &[R] {
        &self.records
    }
    
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<R> Default for MemorySink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RecordSink<R> for MemorySink<R>
where
    R: Clone + Send + 'static,
{
    type Dataset = Vec<R>;
    
    fn write(&mut self, record: &R) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::SinkClosed("memory sink".to_string()));
        }
        self.records.push(record.clone());
        Ok(())
    }
    
    fn close(&mut self) -> Result<Vec<R>, EnvError> {
        self.closed = true;
        Ok(self.records.clone())
    }
}

/// Merger for in-memory datasets: plain concatenation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatMerger;

impl<R> DatasetMerger<Vec<R>> for ConcatMerger {
    type Output = Vec<R>;
    
    fn merge(&self, inputs: Vec<Vec<R>>) -> Result<Vec<R>, EnvError> {
        Ok(inputs.into_iter().flatten().collect())
    }
}
