//! Event record types shared by generators and the extraction core.

use nalgebra::{Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Identifier of one isolated worker in a parallel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl WorkerId {
    /// Returns the zero-based worker number.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// One entry of the event record.
///
/// Mother and daughter links are indices into the owning [`Event`]; the value
/// 0 means "none". Index 0 itself is the system/beam entry, so no physical
/// particle is ever referenced through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Signed PDG identity code
    pub id: i32,
    
    /// Position inside the event record
    pub index: usize,
    
    /// Index of the mother (0 = no mother / beam)
    pub mother: usize,
    
    /// First decay product (0 = none)
    pub daughter1: usize,
    
    /// Second decay product (0 = none)
    pub daughter2: usize,
    
    /// Four-momentum (px, py, pz, e) in GeV
    pub momentum: Vector4<f64>,
    
    /// Production vertex (x, y, z) in mm
    pub vertex: Vector3<f64>,
}

impl Particle {
    /// Creates a particle with no decay products at the origin.
    ///
    /// The index is assigned when the particle is pushed into an [`Event`].
    pub fn new(id: i32, mother: usize, momentum: Vector4<f64>) -> Self {
        Self {
            id,
            index: 0,
            mother,
            daughter1: 0,
            daughter2: 0,
            momentum,
            vertex: Vector3::zeros(),
        }
    }
    
    /// Sets the production vertex.
    pub fn with_vertex(mut self, vertex: Vector3<f64>) -> Self {
        self.vertex = vertex;
        self
    }
    
    /// Sets both decay-product links.
    pub fn with_daughters(mut self, daughter1: usize, daughter2: usize) -> Self {
        self.daughter1 = daughter1;
        self.daughter2 = daughter2;
        self
    }
    
    pub fn id_abs(&self) -> u32 {
        self.id.unsigned_abs()
    }
    
    pub fn px(&self) -> f64 {
        self.momentum.x
    }
    
    pub fn py(&self) -> f64 {
        self.momentum.y
    }
    
    pub fn pz(&self) -> f64 {
        self.momentum.z
    }
    
    pub fn e(&self) -> f64 {
        self.momentum.w
    }
    
    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px().hypot(self.py())
    }
    
    /// True if the particle has no mother (attached to the beam/system entry).
    pub fn is_root(&self) -> bool {
        self.mother == 0
    }
}

/// The particle record of one simulated collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Slot number within the worker run that produced this event
    pub number: u64,
    
    particles: Vec<Particle>,
}

impl Event {
    /// Creates an empty event for the given slot.
    pub fn new(number: u64) -> Self {
        Self {
            number,
            particles: Vec::new(),
        }
    }
    
    /// Builds an event from particles, re-indexing them in order.
    pub fn from_particles(number: u64, particles: impl IntoIterator<Item = Particle>) -> Self {
        let mut event = Self::new(number);
        for particle in particles {
            event.push(particle);
        }
        event
    }
    
    /// Appends a particle and returns its index.
    pub fn push(&mut self, mut particle: Particle) -> usize {
        let index = self.particles.len();
        particle.index = index;
        self.particles.push(particle);
        index
    }
    
    /// Returns the particle at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }
    
    /// Mutable access, used by generators to link daughters after the fact.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }
    
    pub fn len(&self) -> usize {
        self.particles.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
    
    /// Iterates over particles in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }
}

impl<'a> IntoIterator for &'a Event {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;
    
    fn into_iter(self) -> Self::IntoIter {
        self.particles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_push_assigns_indices() {
        let mut event = Event::new(7);
        let a = event.push(Particle::new(2212, 0, Vector4::zeros()));
        let b = event.push(Particle::new(443, 1, Vector4::zeros()));
        
        assert_eq!((a, b), (0, 1));
        assert_eq!(event.get(1).map(|p| p.index), Some(1));
        assert_eq!(event.number, 7);
        assert!(event.get(2).is_none());
    }
    
    #[test]
    fn test_particle_accessors() {
        let p = Particle::new(-13, 2, Vector4::new(3.0, 4.0, 1.0, 5.2));
        assert_eq!(p.id_abs(), 13);
        assert_eq!(p.pt(), 5.0);
        assert_eq!(p.e(), 5.2);
        assert!(!p.is_root());
    }
    
    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId(3).to_string(), "worker-3");
    }
}
