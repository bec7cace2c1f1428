//! Record sink and dataset merge abstractions.

use crate::error::EnvError;

/// A structured-record writer owned by exactly one worker.
///
/// # Record Flow
///
/// ```text
/// Worker                        Sink                     Storage
///   |-- write(record) ---------->|                          |
///   |-- write(record) ---------->|                          |
///   |-- close() ---------------->|-- flush + seal --------->|
///   |<-- Dataset ----------------|                          |
/// ```
///
/// One `write` corresponds to one "fill" of the output tree: one record per
/// target instance.
pub trait RecordSink<R>: Send {
    /// Handle to the sealed dataset, handed to a [`DatasetMerger`].
    type Dataset: Send + 'static;
    
    /// Appends one record.
    ///
    /// # Returns
    /// * `Err(EnvError::SinkClosed)` - the sink was already sealed
    /// * `Err(EnvError::Io)` - durable write failure
    fn write(&mut self, record: &R) -> Result<(), EnvError>;
    
    /// Flushes everything to durable storage and seals the dataset.
    ///
    /// Closing an already closed sink returns the same dataset handle again
    /// and does not touch storage.
    fn close(&mut self) -> Result<Self::Dataset, EnvError>;
}

/// Combines sealed per-worker datasets into one.
///
/// Concatenation semantics: the output holds every input record, inputs in
/// the order given, records within an input in their original order.
pub trait DatasetMerger<D> {
    /// Handle to the merged dataset.
    type Output;
    
    fn merge(&self, inputs: Vec<D>) -> Result<Self::Output, EnvError>;
}
