//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through a `DrawSource`, addressed by a decision
//! specific `StreamId` and the patient identity.
//!
//! Each (stream, patient) pair gets its own PCG stream, seeded
//! deterministically from (master_seed, stream, patient). This means:
//!   - Adding a new decision point never changes existing streams.
//!   - The n-th draw on a stream for a patient is the same across runs,
//!     regardless of how many patients ran before it or in parallel.

use crate::types::PatientId;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;
use std::collections::{HashMap, VecDeque};

/// The random draw contract every updater consumes.
pub trait DrawSource {
    /// Uniform value in [0, 1).
    fn draw(&mut self, stream: StreamId, patient: PatientId) -> f64;

    /// Normally distributed value with the given mean and standard deviation.
    fn draw_gaussian(&mut self, mean: f64, std_dev: f64, stream: StreamId, patient: PatientId) -> f64;
}

/// A single deterministic stream.
pub struct StreamRng {
    pub stream: StreamId,
    inner:      Pcg64Mcg,
}

impl StreamRng {
    pub fn new(master_seed: u64, stream: StreamId, patient: PatientId) -> Self {
        let derived_seed = splitmix(
            master_seed
                ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
                ^ splitmix(patient),
        );
        Self {
            stream,
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    pub fn next_gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        assert!(
            std_dev.is_finite() && std_dev >= 0.0,
            "invalid standard deviation {std_dev} on stream {:?}",
            self.stream
        );
        let z: f64 = self.inner.sample(StandardNormal);
        mean + std_dev * z
    }
}

fn splitmix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// The master seed for a run. Hands out per-patient stream sets.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_patient(&self, patient: PatientId) -> PatientStreams {
        PatientStreams {
            master_seed: self.master_seed,
            patient,
            streams: HashMap::new(),
        }
    }
}

/// Lazily created streams for one patient.
pub struct PatientStreams {
    master_seed: u64,
    patient:     PatientId,
    streams:     HashMap<StreamId, StreamRng>,
}

impl PatientStreams {
    fn stream(&mut self, stream: StreamId, patient: PatientId) -> &mut StreamRng {
        assert_eq!(
            patient, self.patient,
            "draw for patient {patient} from streams owned by patient {}",
            self.patient
        );
        let seed = self.master_seed;
        self.streams
            .entry(stream)
            .or_insert_with(|| StreamRng::new(seed, stream, patient))
    }
}

impl DrawSource for PatientStreams {
    fn draw(&mut self, stream: StreamId, patient: PatientId) -> f64 {
        self.stream(stream, patient).next_f64()
    }

    fn draw_gaussian(&mut self, mean: f64, std_dev: f64, stream: StreamId, patient: PatientId) -> f64 {
        self.stream(stream, patient).next_gaussian(mean, std_dev)
    }
}

/// A draw source that replays scripted values. Used by scenario tests and
/// by tooling that needs to force a specific outcome.
///
/// Lookup order for a uniform draw: the stream's own queue, then the shared
/// sequence, then `fallback`. Gaussian draws pop the stream's gaussian queue
/// and otherwise return the mean.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDraws {
    per_stream: HashMap<StreamId, VecDeque<f64>>,
    gaussians:  HashMap<StreamId, VecDeque<f64>>,
    sequence:   VecDeque<f64>,
    fallback:   f64,
    log:        Vec<(StreamId, f64)>,
}

impl ScriptedDraws {
    /// Every unscripted draw returns `fallback`.
    pub fn constant(fallback: f64) -> Self {
        Self { fallback, ..Self::default() }
    }

    /// Draws are served from `values` in call order, whatever the stream.
    pub fn sequence<I: IntoIterator<Item = f64>>(values: I, fallback: f64) -> Self {
        Self {
            sequence: values.into_iter().collect(),
            fallback,
            ..Self::default()
        }
    }

    pub fn with_stream<I: IntoIterator<Item = f64>>(mut self, stream: StreamId, values: I) -> Self {
        self.per_stream.entry(stream).or_default().extend(values);
        self
    }

    pub fn with_gaussian<I: IntoIterator<Item = f64>>(mut self, stream: StreamId, values: I) -> Self {
        self.gaussians.entry(stream).or_default().extend(values);
        self
    }

    /// Every uniform draw served so far, in order.
    pub fn log(&self) -> &[(StreamId, f64)] {
        &self.log
    }

    pub fn count(&self, stream: StreamId) -> usize {
        self.log.iter().filter(|(s, _)| *s == stream).count()
    }
}

impl DrawSource for ScriptedDraws {
    fn draw(&mut self, stream: StreamId, _patient: PatientId) -> f64 {
        let value = self
            .per_stream
            .get_mut(&stream)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.sequence.pop_front())
            .unwrap_or(self.fallback);
        self.log.push((stream, value));
        value
    }

    fn draw_gaussian(&mut self, mean: f64, _std_dev: f64, stream: StreamId, _patient: PatientId) -> f64 {
        self.gaussians
            .get_mut(&stream)
            .and_then(VecDeque::pop_front)
            .unwrap_or(mean)
    }
}

/// Stable stream assignments, one per decision point.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum StreamId {
    ComorbidityPrevalence = 0,
    ComorbidityOnset = 1,
    ComorbidityIncidence = 2,
    RiskFactorIncidence = 3,
    TbActivation = 4,
    TbActivationSite = 5,
    TbSelfCure = 6,
    TbSymptoms = 7,
    TbInfection = 8,
    TbRelapse = 9,
    TbDiagnostic = 10,
    TbDstResult = 11,
    TbTreatmentOutcome = 12,
    TbLossToFollowUp = 13,
    Mortality = 14,
    CareLossToFollowUp = 15,
    CareReturn = 16,
    Cd4Test = 17,
    CohortGender = 18,
    CohortAge = 19,
    CohortHiv = 20,
    CohortCd4 = 21,
    CohortArt = 22,
    CohortRiskFactor = 23,
    CohortTb = 24,
    ArtFailure = 25,
    // Add new decision points here, append only.
}
