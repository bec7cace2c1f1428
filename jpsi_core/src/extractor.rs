//! Per-event extraction of target instances and their decay products.
//!
//! For every particle whose code equals the target code the extractor
//! classifies its provenance and reads the two linked decay products:
//!
//! ```text
//! event[i] (443) ── daughter1 ──► mu  (px, py, pz, e, production vertex)
//!               └── daughter2 ──► mu  (px, py, pz, e)
//! ```
//!
//! Records come out in ascending particle index. Instances with a broken
//! decay topology are reported as [`TopologyAnomaly`] instead of records.

use crate::ancestry::{AncestryClassifier, AncestryError, AncestryPolicy, ProvenanceClass};
use crate::hadrons::{JPSI, MUON};
use jpsi_env::{Event, Particle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to extract and how to classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Signed code of the target particle
    pub target_code: i32,
    
    /// Expected `|id|` of both decay products (`None` = accept anything)
    pub product_code: Option<i32>,
    
    /// Ancestry walk policy
    pub policy: AncestryPolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            target_code: JPSI,
            product_code: Some(MUON),
            policy: AncestryPolicy::NearestAncestor,
        }
    }
}

/// One extracted target instance; the unit written to a sink.
///
/// Field names are the output contract. Decay-product kinematics are
/// parallel arrays, entry 0 for `daughter1` and entry 1 for `daughter2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInstance {
    /// Event slot number within the worker run
    pub event: u64,
    
    /// Index of the target particle in the event record
    pub index: usize,
    
    /// Indices of the two decay products
    pub daughters: [usize; 2],
    
    pub provenance: ProvenanceClass,
    
    /// 1 for prompt, 0 for non-prompt
    pub is_prompt_jpsi: i32,
    
    /// Production vertex of the first decay product (mm)
    pub jpsi_vx: f64,
    pub jpsi_vy: f64,
    pub jpsi_vz: f64,
    
    pub muon_px: [f64; 2],
    pub muon_py: [f64; 2],
    pub muon_pz: [f64; 2],
    pub muon_e: [f64; 2],
}

impl TargetInstance {
    fn from_products(
        event: u64,
        target: &Particle,
        provenance: ProvenanceClass,
        first: &Particle,
        second: &Particle,
    ) -> Self {
        Self {
            event,
            index: target.index,
            daughters: [first.index, second.index],
            provenance,
            is_prompt_jpsi: provenance.as_flag(),
            jpsi_vx: first.vertex.x,
            jpsi_vy: first.vertex.y,
            jpsi_vz: first.vertex.z,
            muon_px: [first.px(), second.px()],
            muon_py: [first.py(), second.py()],
            muon_pz: [first.pz(), second.pz()],
            muon_e: [first.e(), second.e()],
        }
    }
    
    /// Invariant mass of the decay-product pair.
    pub fn pair_mass(&self) -> f64 {
        let e = self.muon_e[0] + self.muon_e[1];
        let px = self.muon_px[0] + self.muon_px[1];
        let py = self.muon_py[0] + self.muon_py[1];
        let pz = self.muon_pz[0] + self.muon_pz[1];
        (e * e - px * px - py * py - pz * pz).max(0.0).sqrt()
    }
}

/// Why an instance could not be turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AnomalyKind {
    #[error("fewer than two decay products recorded")]
    MissingDaughter,
    
    #[error("both decay-product links point at the same particle")]
    DuplicateDaughter,
    
    #[error("decay product {daughter} is outside the event")]
    DaughterOutOfRange { daughter: usize },
    
    #[error("decay product {daughter} has unexpected code {id}")]
    UnexpectedProduct { daughter: usize, id: i32 },
    
    #[error("ancestry: {0}")]
    Ancestry(AncestryError),
}

/// A target instance with a malformed decay topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("event {event}, particle {index}: {kind}")]
pub struct TopologyAnomaly {
    pub event: u64,
    pub index: usize,
    pub kind: AnomalyKind,
}

/// Result of extracting one event. Counts are returned, not accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Well-formed instances in ascending particle index
    pub records: Vec<TargetInstance>,
    
    /// Instances that were found but could not be extracted
    pub anomalies: Vec<TopologyAnomaly>,
    
    pub prompt: usize,
    pub non_prompt: usize,
}

impl Extraction {
    /// Every target instance found, well-formed or not.
    pub fn instances(&self) -> usize {
        self.records.len() + self.anomalies.len()
    }
    
    /// True if the event held no target instance at all.
    pub fn is_empty(&self) -> bool {
        self.instances() == 0
    }
}

/// Scans events for target instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventExtractor {
    config: ExtractorConfig,
    classifier: AncestryClassifier,
}

impl EventExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            classifier: AncestryClassifier::new(config.policy),
        }
    }
    
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }
    
    /// Extracts every target instance of `event`.
    pub fn extract(&self, event: &Event) -> Extraction {
        let mut extraction = Extraction::default();
        
        for target in event.iter().filter(|p| p.id == self.config.target_code) {
            match self.extract_instance(event, target) {
                Ok(record) => {
                    match record.provenance {
                        ProvenanceClass::Prompt => extraction.prompt += 1,
                        ProvenanceClass::NonPrompt => extraction.non_prompt += 1,
                    }
                    extraction.records.push(record);
                }
                Err(kind) => extraction.anomalies.push(TopologyAnomaly {
                    event: event.number,
                    index: target.index,
                    kind,
                }),
            }
        }
        
        extraction
    }
    
    fn extract_instance(&self, event: &Event, target: &Particle) -> Result<TargetInstance, AnomalyKind> {
        let (d1, d2) = (target.daughter1, target.daughter2);
        if d1 == 0 || d2 == 0 {
            return Err(AnomalyKind::MissingDaughter);
        }
        if d1 == d2 {
            return Err(AnomalyKind::DuplicateDaughter);
        }
        
        let first = self.product(event, d1)?;
        let second = self.product(event, d2)?;
        
        let provenance = self
            .classifier
            .classify(event, target.index)
            .map_err(AnomalyKind::Ancestry)?;
        
        Ok(TargetInstance::from_products(event.number, target, provenance, first, second))
    }
    
    fn product<'e>(&self, event: &'e Event, daughter: usize) -> Result<&'e Particle, AnomalyKind> {
        let particle = event
            .get(daughter)
            .ok_or(AnomalyKind::DaughterOutOfRange { daughter })?;
        
        match self.config.product_code {
            Some(code) if particle.id_abs() != code.unsigned_abs() => Err(AnomalyKind::UnexpectedProduct {
                daughter,
                id: particle.id,
            }),
            _ => Ok(particle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Vector3, Vector4};
    
    fn particle(id: i32, mother: usize) -> Particle {
        Particle::new(id, mother, Vector4::zeros())
    }
    
    /// `[p, B0, J/psi, mu+, mu-]` with kinematics on the muons.
    fn b0_event(jpsi_mother: usize) -> Event {
        Event::from_particles(4, [
            particle(2212, 0),
            particle(511, 0),
            particle(443, jpsi_mother).with_daughters(3, 4),
            Particle::new(-13, 2, Vector4::new(1.0, 2.0, 3.0, 3.8))
                .with_vertex(Vector3::new(0.1, -0.2, 1.5)),
            Particle::new(13, 2, Vector4::new(-0.5, 0.25, 4.0, 4.1))
                .with_vertex(Vector3::new(0.1, -0.2, 1.5)),
        ])
    }
    
    #[test]
    fn test_non_prompt_b0_scenario() {
        let extraction = EventExtractor::default().extract(&b0_event(1));
        
        assert_eq!(extraction.records.len(), 1);
        assert_eq!((extraction.prompt, extraction.non_prompt), (0, 1));
        assert!(extraction.anomalies.is_empty());
        
        let record = &extraction.records[0];
        assert_eq!(record.event, 4);
        assert_eq!(record.index, 2);
        assert_eq!(record.daughters, [3, 4]);
        assert_eq!(record.provenance, ProvenanceClass::NonPrompt);
        assert_relative_eq!(record.muon_px[0], 1.0);
        assert_relative_eq!(record.muon_px[1], -0.5);
        assert_relative_eq!(record.muon_pz[1], 4.0);
        assert_relative_eq!(record.muon_e[0], 3.8);
        assert_relative_eq!(record.jpsi_vz, 1.5);
    }
    
    #[test]
    fn test_direct_jpsi_is_prompt() {
        let extraction = EventExtractor::default().extract(&b0_event(0));
        
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].provenance, ProvenanceClass::Prompt);
        assert_eq!((extraction.prompt, extraction.non_prompt), (1, 0));
    }
    
    #[test]
    fn test_event_without_target_is_empty() {
        let event = Event::from_particles(0, [particle(2212, 0), particle(211, 1), particle(-211, 1)]);
        let extraction = EventExtractor::default().extract(&event);
        
        assert!(extraction.is_empty());
        assert_eq!(extraction, Extraction::default());
    }
    
    #[test]
    fn test_records_in_ascending_index_order() {
        let event = Event::from_particles(0, [
            particle(2212, 0),
            particle(443, 0).with_daughters(3, 4),
            particle(443, 0).with_daughters(5, 6),
            particle(-13, 1),
            particle(13, 1),
            particle(-13, 2),
            particle(13, 2),
        ]);
        let extraction = EventExtractor::default().extract(&event);
        
        let indices: Vec<usize> = extraction.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(extraction.prompt, 2);
    }
    
    #[test]
    fn test_malformed_topologies_become_anomalies() {
        let event = Event::from_particles(9, [
            particle(2212, 0),
            particle(443, 0).with_daughters(5, 0),
            particle(443, 0).with_daughters(5, 5),
            particle(443, 0).with_daughters(5, 40),
            particle(443, 0).with_daughters(5, 6),
            particle(-13, 4),
            particle(22, 4),
        ]);
        let extraction = EventExtractor::default().extract(&event);
        
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.instances(), 4);
        
        let kinds: Vec<AnomalyKind> = extraction.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![
            AnomalyKind::MissingDaughter,
            AnomalyKind::DuplicateDaughter,
            AnomalyKind::DaughterOutOfRange { daughter: 40 },
            AnomalyKind::UnexpectedProduct { daughter: 6, id: 22 },
        ]);
        assert_eq!(extraction.anomalies[0].event, 9);
        assert_eq!(extraction.anomalies[3].index, 4);
    }
    
    #[test]
    fn test_broken_ancestry_becomes_anomaly() {
        let event = Event::from_particles(0, [
            particle(2212, 0),
            particle(443, 17).with_daughters(2, 3),
            particle(-13, 1),
            particle(13, 1),
        ]);
        let extraction = EventExtractor::default().extract(&event);
        
        assert_eq!(
            extraction.anomalies[0].kind,
            AnomalyKind::Ancestry(AncestryError::DanglingMother { index: 1, mother: 17 })
        );
    }
    
    #[test]
    fn test_unchecked_products_accept_electrons() {
        let event = Event::from_particles(0, [
            particle(2212, 0),
            particle(443, 0).with_daughters(2, 3),
            particle(-11, 1),
            particle(11, 1),
        ]);
        
        let strict = EventExtractor::default().extract(&event);
        let loose = EventExtractor::new(ExtractorConfig {
            product_code: None,
            ..ExtractorConfig::default()
        })
        .extract(&event);
        
        assert_eq!(strict.anomalies.len(), 1);
        assert_eq!(loose.records.len(), 1);
    }
    
    #[test]
    fn test_extreme_product_code_is_unexpected() {
        let event = Event::from_particles(0, [
            particle(2212, 0),
            particle(443, 0).with_daughters(2, 3),
            particle(i32::MIN, 1),
            particle(13, 1),
        ]);
        let extraction = EventExtractor::default().extract(&event);
        
        assert!(extraction.records.is_empty());
        assert_eq!(
            extraction.anomalies[0].kind,
            AnomalyKind::UnexpectedProduct { daughter: 2, id: i32::MIN }
        );
    }
    
    #[test]
    fn test_record_field_contract() {
        let record = EventExtractor::default().extract(&b0_event(1)).records.remove(0);
        let json = serde_json::to_value(&record).unwrap();
        
        for field in ["is_prompt_jpsi", "jpsi_vx", "jpsi_vy", "jpsi_vz", "muon_px", "muon_py", "muon_pz", "muon_e"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["provenance"], "non_prompt");
        assert_eq!(json["is_prompt_jpsi"], 0);
        assert_eq!(json["muon_px"].as_array().map(|a| a.len()), Some(2));
    }
    
    #[test]
    fn test_pair_mass() {
        let event = Event::from_particles(0, [
            particle(2212, 0),
            particle(443, 0).with_daughters(2, 3),
            Particle::new(-13, 1, Vector4::new(0.0, 0.0, 1.0, 1.5)),
            Particle::new(13, 1, Vector4::new(0.0, 0.0, -1.0, 1.5)),
        ]);
        let record = EventExtractor::default().extract(&event).records.remove(0);
        assert_relative_eq!(record.pair_mass(), 3.0, epsilon = 1e-12);
    }
}
