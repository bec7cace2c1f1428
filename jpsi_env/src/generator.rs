//! Event generator abstraction.

use crate::error::EnvError;
use crate::types::Event;
use serde::{Deserialize, Serialize};

/// The interface the extraction core needs from an event generator.
///
/// A generator is an explicitly owned, non-shared object with a fixed
/// lifecycle:
///
/// ```text
/// configure(..)* ──► initialize() ──► next_event()* ──► stats()
/// ```
///
/// # Implementations
///
/// - **Toy**: `jpsi_sim::ToyGenerator` - seeded synthetic events
/// - **Replay**: `jpsi_sim::ReplayGenerator` - fixed event list for tests
///
/// # Determinism
///
/// Two generators configured with the same settings (including the seed)
/// must produce the same sequence of events.
pub trait EventGenerator: Send {
    /// Applies one `"Key:sub = value"` setting.
    ///
    /// Must be called before `initialize()`; unknown keys are errors.
    fn configure(&mut self, setting: &str) -> Result<(), EnvError>;
    
    /// Freezes the configuration and prepares random streams.
    ///
    /// Calling it again after success is a no-op.
    fn initialize(&mut self) -> Result<(), EnvError>;
    
    /// Produces the next event, or `None` if generation failed for this slot.
    fn next_event(&mut self) -> Option<Event>;
    
    /// Returns generation counters so far.
    fn stats(&self) -> GeneratorStats;
}

/// Counters reported by a generator at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorStats {
    /// Calls to `next_event()`
    pub attempted: u64,
    
    /// Calls that produced an event
    pub generated: u64,
    
    /// Calls that returned `None`
    pub failed: u64,
}

impl GeneratorStats {
    /// Records the outcome of one `next_event()` call.
    pub fn record(&mut self, produced: bool) {
        self.attempted += 1;
        if produced {
            self.generated += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Splits a `"Key:sub = value"` setting into a trimmed `(key, value)` pair.
///
/// Keys are lower-cased so lookups are case-insensitive.
pub fn parse_setting(setting: &str) -> Result<(String, String), EnvError> {
    let (key, value) = setting
        .split_once('=')
        .ok_or_else(|| EnvError::configuration(format!("missing '=' in setting: {setting}")))?;
    
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Err(EnvError::configuration(format!("empty key or value in setting: {setting}")));
    }
    
    Ok((key.to_ascii_lowercase(), value.to_string()))
}

/// Parses an on/off flag the way generator settings spell them.
pub fn parse_flag(key: &str, value: &str) -> Result<bool, EnvError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(EnvError::configuration(format!("{key}: expected on/off, got '{value}'"))),
    }
}
