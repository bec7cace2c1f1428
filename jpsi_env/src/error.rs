//! Error types for the collaborator layer.

use thiserror::Error;

/// Errors raised by generators, sinks and mergers.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A generator setting was unknown, malformed, or applied too late
    #[error("Configuration error: {0}")]
    Configuration(String),
    
    /// Generator used before `initialize()` succeeded
    #[error("Generator not initialized")]
    NotInitialized,
    
    /// Sink written to after it was sealed
    #[error("Sink already closed: {0}")]
    SinkClosed(String),
    
    /// Durable storage failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    /// Record encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
    
    /// Dataset merge failed
    #[error("Merge error: {0}")]
    Merge(String),
}

impl EnvError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
    
    /// Creates a serialization error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}
