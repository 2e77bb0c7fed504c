//! The simulation engine: drives one patient at a time through the
//! registered updaters.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Comorbidity updater
//!   2. TB natural-history updater
//!   3. TB clinical updater
//!   4. Mortality updater      (consumes the hazards registered by 1-3)
//!   5. Behavior updater       (care engagement)
//!   6. CD4 test updater
//!
//! RULES:
//!   - Updaters execute in registration order, once at creation and then
//!     once per month.
//!   - No updater calls another updater's functions directly.
//!   - All randomness flows through a `DrawSource`.
//!   - Every state change is recorded in the patient's event log.
//!   - Once a patient dies, no further updater runs that month.

use crate::{
    behavior_updater::BehaviorUpdater,
    cd4_test_updater::Cd4TestUpdater,
    cohort::PatientFactory,
    comorbidity_updater::ComorbidityUpdater,
    config::SimConfig,
    error::{SimError, SimResult},
    event::{PatientEvent, PatientEventKind},
    mortality_updater::MortalityUpdater,
    patient::{DeathRecord, Patient, TbNaturalState},
    rng::{DrawSource, RngBank},
    tb_clinical_updater::TbClinicalUpdater,
    tb_natural_updater::TbNaturalUpdater,
    types::{ConditionId, CostBucket, Gender, HivStatus, Month, PatientId},
    updater::{PatientUpdater, UpdateContext},
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

const ENGINE: &str = "engine";

pub struct SimEngine {
    config:   Arc<SimConfig>,
    factory:  PatientFactory,
    updaters: Vec<Box<dyn PatientUpdater>>,
}

/// End-of-run view of one patient.
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub patient:          PatientId,
    pub gender:           Gender,
    pub hiv:              HivStatus,
    pub months_simulated: Month,
    pub final_age_months: u32,
    pub death:            Option<DeathRecord>,
    pub conditions:       Vec<ConditionId>,
    pub tb_state:         TbNaturalState,
    pub costs:            Vec<(CostBucket, f64)>,
    pub total_cost:       f64,
    pub qol_modifier:     f64,
    pub event_counts:     BTreeMap<&'static str, usize>,
}

impl PatientSummary {
    fn from_run(patient: &Patient, events: &[PatientEvent]) -> Self {
        let mut event_counts = BTreeMap::new();
        for event in events {
            *event_counts.entry(event_type_name(&event.kind)).or_insert(0) += 1;
        }
        Self {
            patient:          patient.id,
            gender:           patient.general.gender,
            hiv:              patient.disease.hiv,
            months_simulated: patient.general.month,
            final_age_months: patient.general.age_months,
            death:            patient.general.death,
            conditions:       patient
                .disease
                .conditions
                .iter()
                .enumerate()
                .filter(|(_, c)| c.present)
                .map(|(i, _)| ConditionId(i))
                .collect(),
            tb_state:         patient.disease.tb.natural,
            costs:            patient.accum.costs.iter().map(|(b, c)| (*b, *c)).collect(),
            total_cost:       patient.accum.total_cost(),
            qol_modifier:     patient.accum.qol_modifier,
            event_counts,
        }
    }
}

/// One patient's complete run.
#[derive(Debug, Clone)]
pub struct PatientRun {
    pub patient: Patient,
    pub summary: PatientSummary,
    pub events:  Vec<PatientEvent>,
}

/// Aggregate outcome of a cohort run.
#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub seed:            u64,
    pub patients:        usize,
    pub deaths:          usize,
    pub deaths_by_cause: BTreeMap<String, usize>,
    pub mean_total_cost: f64,
    pub mean_qol:        f64,
    pub summaries:       Vec<PatientSummary>,
}

impl SimEngine {
    /// An engine with no updaters registered.
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self {
            factory:  PatientFactory::new(Arc::clone(&config)),
            updaters: Vec::new(),
            config,
        }
    }

    /// Build a fully wired engine with every updater registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(config: SimConfig) -> Self {
        let config = Arc::new(config);
        let mut engine = SimEngine::new(Arc::clone(&config));

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(Box::new(ComorbidityUpdater::new(Arc::clone(&config))));
        engine.register(Box::new(TbNaturalUpdater::new(Arc::clone(&config))));
        engine.register(Box::new(TbClinicalUpdater::new(Arc::clone(&config))));
        engine.register(Box::new(MortalityUpdater::new(Arc::clone(&config))));
        engine.register(Box::new(BehaviorUpdater::new(Arc::clone(&config))));
        engine.register(Box::new(Cd4TestUpdater::new(config)));
        engine
    }

    /// Register an updater. Call in the documented execution order.
    pub fn register(&mut self, updater: Box<dyn PatientUpdater>) {
        log::debug!("Registered updater {}", updater.name());
        self.updaters.push(updater);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn updater_names(&self) -> Vec<&'static str> {
        self.updaters.iter().map(|u| u.name()).collect()
    }

    pub fn factory(&self) -> &PatientFactory {
        &self.factory
    }

    /// Run every updater's creation step.
    pub fn initialize(
        &self,
        patient: &mut Patient,
        draws: &mut dyn DrawSource,
        events: &mut Vec<PatientEvent>,
    ) {
        let created = PatientEventKind::PatientCreated {
            gender:     patient.general.gender,
            age_months: patient.general.age_months,
            hiv:        patient.disease.hiv,
        };
        UpdateContext::new(patient, draws, ENGINE, events).emit(created);

        for updater in &self.updaters {
            let mut ctx = UpdateContext::new(patient, draws, updater.name(), events);
            updater.initial_update(&mut ctx);
        }
    }

    /// Advance one month. This is the core simulation step.
    pub fn step_month(
        &self,
        patient: &mut Patient,
        draws: &mut dyn DrawSource,
        events: &mut Vec<PatientEvent>,
    ) -> SimResult<()> {
        if !patient.is_alive() {
            return Err(SimError::PatientNotAlive {
                patient: patient.id,
                month:   patient.general.month,
            });
        }
        patient.advance_month();

        for updater in &self.updaters {
            let mut ctx = UpdateContext::new(patient, draws, updater.name(), events);
            updater.monthly_update(&mut ctx);
            if !patient.is_alive() {
                break;
            }
        }
        Ok(())
    }

    /// Initialize `patient` and run months until death or the horizon.
    pub fn run_patient(&self, mut patient: Patient, draws: &mut dyn DrawSource) -> SimResult<PatientRun> {
        let mut events = Vec::new();
        self.initialize(&mut patient, draws, &mut events);

        let horizon = self.config.simulation.horizon_months;
        while patient.is_alive() && patient.general.month < horizon {
            self.step_month(&mut patient, draws, &mut events)?;
        }

        let summary = PatientSummary::from_run(&patient, &events);
        log::debug!(
            "Patient {} finished at month {} ({} events)",
            patient.id,
            patient.general.month,
            events.len()
        );
        Ok(PatientRun { patient, summary, events })
    }

    /// Create and run `patients` patients from the cohort distribution.
    /// Patient ids in `trace` get per-patient narrative tracing.
    pub fn run_cohort(&self, seed: u64, patients: usize, trace: &[PatientId]) -> SimResult<CohortReport> {
        let bank = RngBank::new(seed);
        let mut summaries = Vec::with_capacity(patients);

        for id in 0..patients as PatientId {
            let mut draws = bank.for_patient(id);
            let patient = self
                .factory
                .create(id, &mut draws)
                .with_tracing(trace.contains(&id));
            summaries.push(self.run_patient(patient, &mut draws)?.summary);
        }

        let report = CohortReport::from_summaries(seed, summaries);
        log::info!(
            "Cohort run complete: seed {seed}, {} patients, {} deaths",
            report.patients,
            report.deaths
        );
        Ok(report)
    }
}

impl CohortReport {
    fn from_summaries(seed: u64, summaries: Vec<PatientSummary>) -> Self {
        let mut deaths_by_cause = BTreeMap::new();
        for death in summaries.iter().filter_map(|s| s.death) {
            *deaths_by_cause.entry(death.cause.to_string()).or_insert(0) += 1;
        }
        let n = summaries.len();
        let mean = |f: fn(&PatientSummary) -> f64| {
            if n == 0 {
                0.0
            } else {
                summaries.iter().map(f).sum::<f64>() / n as f64
            }
        };
        Self {
            seed,
            patients:        n,
            deaths:          deaths_by_cause.values().sum(),
            mean_total_cost: mean(|s| s.total_cost),
            mean_qol:        mean(|s| s.qol_modifier),
            deaths_by_cause,
            summaries,
        }
    }
}

/// Extract a stable string name from an event variant.
/// Used for per-type event counts in summaries.
pub fn event_type_name(kind: &PatientEventKind) -> &'static str {
    match kind {
        PatientEventKind::PatientCreated { .. }        => "patient_created",
        PatientEventKind::ConditionPrevalent { .. }    => "condition_prevalent",
        PatientEventKind::ConditionOnset { .. }        => "condition_onset",
        PatientEventKind::ConditionStageChanged { .. } => "condition_stage_changed",
        PatientEventKind::RiskFactorAcquired { .. }    => "risk_factor_acquired",
        PatientEventKind::TbTransition { .. }          => "tb_transition",
        PatientEventKind::TbSymptomsChanged { .. }     => "tb_symptoms_changed",
        PatientEventKind::TbDiagnosticPerformed { .. } => "tb_diagnostic_performed",
        PatientEventKind::TbTreatmentStarted { .. }    => "tb_treatment_started",
        PatientEventKind::TbDstResolved { .. }         => "tb_dst_resolved",
        PatientEventKind::TbTreatmentCompleted { .. }  => "tb_treatment_completed",
        PatientEventKind::TbEmpiricStarted             => "tb_empiric_started",
        PatientEventKind::TbEmpiricStopped             => "tb_empiric_stopped",
        PatientEventKind::TbProphylaxisStarted         => "tb_prophylaxis_started",
        PatientEventKind::TbProphylaxisStopped { .. }  => "tb_prophylaxis_stopped",
        PatientEventKind::TbCareLost                   => "tb_care_lost",
        PatientEventKind::Died { .. }                  => "died",
        PatientEventKind::LostToFollowUp               => "lost_to_follow_up",
        PatientEventKind::ReturnedToCare { .. }        => "returned_to_care",
        PatientEventKind::Cd4Tested { .. }             => "cd4_tested",
        PatientEventKind::ArtFailure { .. }            => "art_failure",
    }
}
