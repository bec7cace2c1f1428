//! Ancestry classification: is a J/psi prompt or from a B-hadron decay?
//!
//! # Policies
//!
//! ```text
//!   root ── B0 ── X ── J/psi
//!                 ▲      │
//!                 │      └─ NearestAncestor looks only at X
//!   FullChain walks X, B0, ... until mother index 0
//! ```
//!
//! The default is [`AncestryPolicy::NearestAncestor`]: a single hop. Walks
//! are bounded by the event size so malformed (cyclic) records terminate.

use crate::hadrons::is_b_hadron;
use jpsi_env::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provenance of one target-particle instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceClass {
    /// Produced in the hard process, no B-hadron parent
    Prompt,
    
    /// Produced in the decay of a B hadron
    NonPrompt,
}

impl ProvenanceClass {
    pub fn is_prompt(&self) -> bool {
        matches!(self, ProvenanceClass::Prompt)
    }
    
    /// Value of the record's `is_prompt_jpsi` field.
    pub fn as_flag(&self) -> i32 {
        match self {
            ProvenanceClass::Prompt => 1,
            ProvenanceClass::NonPrompt => 0,
        }
    }
}

impl std::fmt::Display for ProvenanceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvenanceClass::Prompt => write!(f, "prompt"),
            ProvenanceClass::NonPrompt => write!(f, "non_prompt"),
        }
    }
}

/// How far up the mother chain the classifier looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncestryPolicy {
    /// Inspect only the direct mother
    #[default]
    NearestAncestor,
    
    /// Walk every ancestor up to the root
    FullChain,
}

impl std::str::FromStr for AncestryPolicy {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" | "nearest_ancestor" | "one-hop" => Ok(AncestryPolicy::NearestAncestor),
            "full" | "full-chain" | "full_chain" => Ok(AncestryPolicy::FullChain),
            _ => Err(format!("Unknown ancestry policy: {}", s)),
        }
    }
}

/// Malformed event records detected while walking ancestry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AncestryError {
    #[error("particle index {index} outside event of {len} particles")]
    IndexOutOfRange { index: usize, len: usize },
    
    #[error("particle {index} has mother {mother} outside the event")]
    DanglingMother { index: usize, mother: usize },
    
    #[error("mother chain from particle {start} does not terminate")]
    Cycle { start: usize },
}

/// Classifies target instances by their mother chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestryClassifier {
    policy: AncestryPolicy,
}

impl AncestryClassifier {
    pub fn new(policy: AncestryPolicy) -> Self {
        Self { policy }
    }
    
    pub fn policy(&self) -> AncestryPolicy {
        self.policy
    }
    
    /// Classifies the particle at `index`.
    ///
    /// A particle whose mother index is 0 is always prompt.
    pub fn classify(&self, event: &Event, index: usize) -> Result<ProvenanceClass, AncestryError> {
        let mut current = event
            .get(index)
            .ok_or(AncestryError::IndexOutOfRange { index, len: event.len() })?;
        
        let mut steps = 0;
        while current.mother != 0 {
            steps += 1;
            if steps > event.len() {
                return Err(AncestryError::Cycle { start: index });
            }
            
            let mother = event.get(current.mother).ok_or(AncestryError::DanglingMother {
                index: current.index,
                mother: current.mother,
            })?;
            
            if is_b_hadron(mother.id) {
                return Ok(ProvenanceClass::NonPrompt);
            }
            if self.policy == AncestryPolicy::NearestAncestor {
                return Ok(ProvenanceClass::Prompt);
            }
            current = mother;
        }
        
        Ok(ProvenanceClass::Prompt)
    }
}
