//! Seeded toy event generator.
//!
//! Stands in for a full physics generator. It honours the same
//! `"Key = value"` settings style and produces a Pythia-like event record:
//!
//! ```text
//! 0  system (90)
//! 1  beam A        2  beam B
//! .. soft pions from the beams
//! .. per J/psi:  beam ── g ────────────── J/psi ── l-, l+      (prompt)
//!                beam ── B ── [chi_c1] ── J/psi ── l-, l+      (non-prompt, displaced)
//! ```
//!
//! All randomness comes from one ChaCha8 stream seeded by `Random:seed`,
//! so a given settings list always yields the same events.

use jpsi_core::hadrons::{B_HADRON_CODES, ELECTRON, JPSI, MUON, PROTON};
use jpsi_env::{parse_flag, parse_setting, EnvError, Event, EventGenerator, GeneratorStats, Particle};
use nalgebra::{Vector3, Vector4};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal, Poisson};
use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::str::FromStr;
use tracing::{info, warn};

/// Seed used when `Random:setSeed` is off.
pub const DEFAULT_SEED: u64 = 19_780_503;

const SYSTEM_CODE: i32 = 90;
const GLUON: i32 = 21;
const CHI_C1: i32 = 20443;
const PIONS: [i32; 3] = [211, -211, 111];

const PROTON_MASS: f64 = 0.938_272;
const PION_MASS: f64 = 0.139_570;
const JPSI_MASS: f64 = 3.096_900;
const CHI_C1_MASS: f64 = 3.510_670;
const B_MASS: f64 = 5.279_340;
const MUON_MASS: f64 = 0.105_658;
const ELECTRON_MASS: f64 = 0.000_511;

/// Mean B-hadron proper decay length (mm).
const B_CTAU_MM: f64 = 0.455;

/// Beam-spot widths (mm).
const VERTEX_SIGMA_XY: f64 = 0.015;
const VERTEX_SIGMA_Z: f64 = 50.0;

/// Fraction of J/psi reached through a chi_c1 feed-down step.
const CHI_C_FEED_DOWN: f64 = 0.25;

/// Settings understood by [`ToyGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToySettings {
    /// `Beams:idA`
    pub beam_a: i32,
    
    /// `Beams:idB`
    pub beam_b: i32,
    
    /// `Beams:eCM` (GeV)
    pub ecm: f64,
    
    /// `Beams:allowVertexSpread`
    pub vertex_spread: bool,
    
    /// `PhaseSpace:pTHatMin` (GeV), added to every J/psi pT
    pub pt_hat_min: f64,
    
    /// `Random:setSeed`
    pub set_seed: bool,
    
    /// `Random:seed`
    pub seed: u64,
    
    /// `Charmonium:all`
    pub charmonium: bool,
    
    /// `Charmonium:meanPerEvent`, Poisson mean of J/psi per event
    pub mean_per_event: f64,
    
    /// `Charmonium:nonPromptFraction`
    pub non_prompt_fraction: f64,
    
    /// `443:onIfMatch`, the two decay-product codes
    pub decay_products: (i32, i32),
    
    /// `Next:failureRate`, probability that a slot yields no event
    pub failure_rate: f64,
    
    /// `Event:extraParticles`, soft pions per event
    pub extra_particles: usize,
}

impl Default for ToySettings {
    fn default() -> Self {
        Self {
            beam_a: PROTON,
            beam_b: PROTON,
            ecm: 14_000.0,
            vertex_spread: false,
            pt_hat_min: 0.0,
            set_seed: false,
            seed: DEFAULT_SEED,
            charmonium: false,
            mean_per_event: 0.6,
            non_prompt_fraction: 0.2,
            decay_products: (MUON, -MUON),
            failure_rate: 0.0,
            extra_particles: 8,
        }
    }
}

impl ToySettings {
    /// Applies one already-split setting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        match key {
            "beams:ida" => self.beam_a = parse_value(key, value)?,
            "beams:idb" => self.beam_b = parse_value(key, value)?,
            "beams:ecm" => {
                let ecm: f64 = parse_value(key, value)?;
                if ecm <= 2.0 * B_MASS {
                    return Err(EnvError::configuration(format!("{key}: {ecm} GeV is below threshold")));
                }
                self.ecm = ecm;
            }
            "beams:allowvertexspread" => self.vertex_spread = parse_flag(key, value)?,
            "phasespace:pthatmin" => self.pt_hat_min = non_negative(key, parse_value(key, value)?)?,
            "random:setseed" => self.set_seed = parse_flag(key, value)?,
            "random:seed" => self.seed = parse_value(key, value)?,
            "charmonium:all" => self.charmonium = parse_flag(key, value)?,
            "charmonium:meanperevent" => self.mean_per_event = non_negative(key, parse_value(key, value)?)?,
            "charmonium:nonpromptfraction" => self.non_prompt_fraction = probability(key, parse_value(key, value)?)?,
            "443:onifmatch" => self.decay_products = parse_decay_products(key, value)?,
            "next:failurerate" => self.failure_rate = probability(key, parse_value(key, value)?)?,
            "event:extraparticles" => self.extra_particles = parse_value(key, value)?,
            _ => return Err(EnvError::configuration(format!("unknown setting: {key}"))),
        }
        Ok(())
    }
    
    /// The seed the random stream will actually use.
    pub fn effective_seed(&self) -> u64 {
        if self.set_seed {
            self.seed
        } else {
            DEFAULT_SEED
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, EnvError> {
    value
        .parse()
        .map_err(|_| EnvError::configuration(format!("{key}: cannot parse '{value}'")))
}

fn non_negative(key: &str, value: f64) -> Result<f64, EnvError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(EnvError::configuration(format!("{key}: {value} must be >= 0")))
    }
}

fn probability(key: &str, value: f64) -> Result<f64, EnvError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EnvError::configuration(format!("{key}: {value} is not in [0, 1]")))
    }
}

/// Accepts a charge-conjugate lepton pair such as `13 -13` or `-11 11`.
fn parse_decay_products(key: &str, value: &str) -> Result<(i32, i32), EnvError> {
    let codes = value
        .split_whitespace()
        .map(|code| parse_value::<i32>(key, code))
        .collect::<Result<Vec<_>, _>>()?;
    
    match codes.as_slice() {
        [a, b] if a.checked_neg() == Some(*b) && [MUON, ELECTRON].contains(&a.abs()) => Ok((*a, *b)),
        _ => Err(EnvError::configuration(format!("{key}: '{value}' is not a lepton pair"))),
    }
}

/// Distributions frozen at `initialize()`.
struct Sampler {
    rng: ChaCha8Rng,
    jpsi_pt: Exp<f64>,
    soft_pt: Exp<f64>,
    multiplicity: Option<Poisson<f64>>,
    vertex_xy: Normal<f64>,
    vertex_z: Normal<f64>,
}

impl Sampler {
    fn new(settings: &ToySettings) -> Result<Self, EnvError> {
        // Harder spectrum at higher energy.
        let mean_pt = (1.5 + 0.25 * (settings.ecm / 1000.0).ln()).max(0.5);
        let invalid = |e: &dyn std::fmt::Display| EnvError::configuration(e.to_string());
        
        let multiplicity = if settings.charmonium && settings.mean_per_event > 0.0 {
            Some(Poisson::new(settings.mean_per_event).map_err(|e| invalid(&e))?)
        } else {
            None
        };
        
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(settings.effective_seed()),
            jpsi_pt: Exp::new(1.0 / mean_pt).map_err(|e| invalid(&e))?,
            soft_pt: Exp::new(1.0 / 0.4).map_err(|e| invalid(&e))?,
            multiplicity,
            vertex_xy: Normal::new(0.0, VERTEX_SIGMA_XY).map_err(|e| invalid(&e))?,
            vertex_z: Normal::new(0.0, VERTEX_SIGMA_Z).map_err(|e| invalid(&e))?,
        })
    }
}

/// Seeded synthetic generator of pp events containing J/psi.
pub struct ToyGenerator {
    settings: ToySettings,
    sampler: Option<Sampler>,
    stats: GeneratorStats,
}

impl ToyGenerator {
    /// Creates a generator with default settings (charmonium off, like a
    /// freshly constructed physics generator).
    pub fn new() -> Self {
        Self {
            settings: ToySettings::default(),
            sampler: None,
            stats: GeneratorStats::default(),
        }
    }
    
    /// Creates and configures a generator from a list of settings.
    pub fn with_settings<I, S>(settings: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut generator = Self::new();
        for setting in settings {
            generator.configure(setting.as_ref())?;
        }
        Ok(generator)
    }
    
    pub fn settings(&self) -> &ToySettings {
        &self.settings
    }
    
    pub fn is_initialized(&self) -> bool {
        self.sampler.is_some()
    }
    
    fn build_event(settings: &ToySettings, sampler: &mut Sampler, number: u64) -> Event {
        let mut event = Event::new(number);
        
        let half = settings.ecm / 2.0;
        let pz = (half * half - PROTON_MASS * PROTON_MASS).max(0.0).sqrt();
        event.push(Particle::new(SYSTEM_CODE, 0, Vector4::new(0.0, 0.0, 0.0, settings.ecm)));
        let beams = [
            event.push(Particle::new(settings.beam_a, 0, Vector4::new(0.0, 0.0, pz, half))),
            event.push(Particle::new(settings.beam_b, 0, Vector4::new(0.0, 0.0, -pz, half))),
        ];
        
        let primary = if settings.vertex_spread {
            Vector3::new(
                sampler.vertex_xy.sample(&mut sampler.rng),
                sampler.vertex_xy.sample(&mut sampler.rng),
                sampler.vertex_z.sample(&mut sampler.rng),
            )
        } else {
            Vector3::zeros()
        };
        
        for i in 0..settings.extra_particles {
            let id = PIONS[sampler.rng.gen_range(0..PIONS.len())];
            let pt = sampler.soft_pt.sample(&mut sampler.rng);
            let momentum = Self::random_direction(sampler, PION_MASS, pt, 5.0);
            event.push(Particle::new(id, beams[i % 2], momentum).with_vertex(primary));
        }
        
        let count = match &sampler.multiplicity {
            Some(poisson) => {
                let n: f64 = poisson.sample(&mut sampler.rng);
                n as usize
            }
            None => 0,
        };
        for _ in 0..count {
            let beam = beams[sampler.rng.gen_range(0..beams.len())];
            Self::add_jpsi(settings, sampler, &mut event, beam, primary);
        }
        
        event
    }
    
    /// Appends one J/psi chain and its lepton pair.
    fn add_jpsi(
        settings: &ToySettings,
        sampler: &mut Sampler,
        event: &mut Event,
        beam: usize,
        primary: Vector3<f64>,
    ) {
        let pt = settings.pt_hat_min + sampler.jpsi_pt.sample(&mut sampler.rng);
        let jpsi_p = Self::random_direction(sampler, JPSI_MASS, pt, 4.0);
        let direction = jpsi_p.xyz();
        
        let non_prompt = sampler.rng.gen_bool(settings.non_prompt_fraction);
        let (mut mother, vertex) = if non_prompt {
            let code = B_HADRON_CODES[sampler.rng.gen_range(0..B_HADRON_CODES.len())];
            let code = if sampler.rng.gen_bool(0.5) { code } else { -code };
            let b_p = Self::along(direction * 1.2, B_MASS);
            let b = event.push(Particle::new(code, beam, b_p).with_vertex(primary));
            
            // Flight distance: (p / m) * c*tau * Exp(1)
            let proper: f64 = Exp1.sample(&mut sampler.rng);
            let decay = primary + b_p.xyz() * (B_CTAU_MM * proper / B_MASS);
            (b, decay)
        } else {
            let g = event.push(Particle::new(GLUON, beam, Self::along(direction, 0.0)).with_vertex(primary));
            (g, primary)
        };
        
        if sampler.rng.gen_bool(CHI_C_FEED_DOWN) {
            let chi = Particle::new(CHI_C1, mother, Self::along(direction, CHI_C1_MASS)).with_vertex(vertex);
            mother = event.push(chi);
        }
        
        let jpsi = event.push(Particle::new(JPSI, mother, jpsi_p).with_vertex(vertex));
        
        let (code1, code2) = settings.decay_products;
        let lepton_mass = if code1.abs() == ELECTRON { ELECTRON_MASS } else { MUON_MASS };
        let (p1, p2) = Self::two_body_decay(sampler, jpsi_p, lepton_mass);
        let d1 = event.push(Particle::new(code1, jpsi, p1).with_vertex(vertex));
        let d2 = event.push(Particle::new(code2, jpsi, p2).with_vertex(vertex));
        
        if let Some(particle) = event.get_mut(jpsi) {
            particle.daughter1 = d1;
            particle.daughter2 = d2;
        }
    }
    
    /// Four-momentum of a particle with given mass, pT, rapidity in
    /// `[-y_max, y_max)` and uniform azimuth.
    fn random_direction(sampler: &mut Sampler, mass: f64, pt: f64, y_max: f64) -> Vector4<f64> {
        let y = sampler.rng.gen_range(-y_max..y_max);
        let phi = sampler.rng.gen_range(0.0..TAU);
        let mt = (mass * mass + pt * pt).sqrt();
        Vector4::new(pt * phi.cos(), pt * phi.sin(), mt * y.sinh(), mt * y.cosh())
    }
    
    /// On-shell four-momentum with the given three-momentum.
    fn along(p: Vector3<f64>, mass: f64) -> Vector4<f64> {
        let e = (p.norm_squared() + mass * mass).sqrt();
        Vector4::new(p.x, p.y, p.z, e)
    }
    
    /// Isotropic decay into two equal-mass products, boosted to the lab.
    fn two_body_decay(sampler: &mut Sampler, parent: Vector4<f64>, mass: f64) -> (Vector4<f64>, Vector4<f64>) {
        let m = (parent.w * parent.w - parent.xyz().norm_squared()).max(0.0).sqrt();
        let p_star = ((m * m / 4.0) - mass * mass).max(0.0).sqrt();
        
        let cos_theta: f64 = sampler.rng.gen_range(-1.0..1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        let phi = sampler.rng.gen_range(0.0..TAU);
        let n = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
        
        let e_star = m / 2.0;
        let beta = parent.xyz() / parent.w;
        let first = boost(Vector4::new(n.x * p_star, n.y * p_star, n.z * p_star, e_star), beta);
        let second = boost(Vector4::new(-n.x * p_star, -n.y * p_star, -n.z * p_star, e_star), beta);
        (first, second)
    }
}

impl Default for ToyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lorentz boost of `p` by velocity `beta`.
fn boost(p: Vector4<f64>, beta: Vector3<f64>) -> Vector4<f64> {
    let b2 = beta.norm_squared();
    if b2 <= 0.0 {
        return p;
    }
    let gamma = 1.0 / (1.0 - b2).sqrt();
    let bp = beta.dot(&p.xyz());
    let spatial = p.xyz() + beta * ((gamma - 1.0) * bp / b2 + gamma * p.w);
    Vector4::new(spatial.x, spatial.y, spatial.z, gamma * (p.w + bp))
}

impl EventGenerator for ToyGenerator {
    fn configure(&mut self, setting: &str) -> Result<(), EnvError> {
        if self.is_initialized() {
            return Err(EnvError::configuration(format!("'{setting}' applied after initialize()")));
        }
        let (key, value) = parse_setting(setting)?;
        self.settings.apply(&key, &value)
    }
    
    fn initialize(&mut self) -> Result<(), EnvError> {
        if self.is_initialized() {
            return Ok(());
        }
        self.sampler = Some(Sampler::new(&self.settings)?);
        info!(
            seed = self.settings.effective_seed(),
            ecm = self.settings.ecm,
            charmonium = self.settings.charmonium,
            "toy generator initialized"
        );
        Ok(())
    }
    
    fn next_event(&mut self) -> Option<Event> {
        let number = self.stats.attempted;
        let Some(sampler) = self.sampler.as_mut() else {
            warn!("next_event() called before initialize()");
            self.stats.record(false);
            return None;
        };
        
        if sampler.rng.gen_bool(self.settings.failure_rate) {
            self.stats.record(false);
            return None;
        }
        
        let event = Self::build_event(&self.settings, sampler, number);
        self.stats.record(true);
        Some(event)
    }
    
    fn stats(&self) -> GeneratorStats {
        self.stats
    }
}

/// Replays a fixed list of slots; `None` entries and exhaustion are misses.
#[derive(Debug, Clone, Default)]
pub struct ReplayGenerator {
    slots: VecDeque<Option<Event>>,
    settings: Vec<String>,
    initialized: bool,
    stats: GeneratorStats,
}

impl ReplayGenerator {
    pub fn new(slots: impl IntoIterator<Item = Option<Event>>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            ..Self::default()
        }
    }
    
    /// Replays events with no misses.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self::new(events.into_iter().map(Some))
    }
    
    /// Settings received through `configure()`, in order.
    pub fn settings(&self) -> &[String] {
        &self.settings
    }
}

impl EventGenerator for ReplayGenerator {
    fn configure(&mut self, setting: &str) -> Result<(), EnvError> {
        if self.initialized {
            return Err(EnvError::configuration(format!("'{setting}' applied after initialize()")));
        }
        parse_setting(setting)?;
        self.settings.push(setting.to_string());
        Ok(())
    }
    
    fn initialize(&mut self) -> Result<(), EnvError> {
        self.initialized = true;
        Ok(())
    }
    
    fn next_event(&mut self) -> Option<Event> {
        let event = if self.initialized {
            self.slots.pop_front().flatten()
        } else {
            None
        };
        self.stats.record(event.is_some());
        event
    }
    
    fn stats(&self) -> GeneratorStats {
        self.stats
    }
}
