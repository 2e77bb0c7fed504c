//! CD4 testing updater.
//!
//! A test runs for HIV-positive patients in care when one of these fires,
//! checked in this order:
//!   - ART was started this month
//!   - the failure count reached the confirmation threshold and has not
//!     been tested yet
//!   - the testing interval has elapsed since the last test
//!
//! The observed value `max(N(true_cd4, sd), 0)` replaces the patient's
//! CD4 stratum, which every stratified table lookup then uses.

use crate::{
    config::{Cd4TestConfig, SimConfig},
    event::{Cd4TestTrigger, PatientEventKind},
    patient::Patient,
    patient_trace,
    rng::StreamId,
    types::{Cd4Stratum, CostBucket, HivStatus},
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

pub struct Cd4TestUpdater {
    config: Arc<SimConfig>,
}

impl Cd4TestUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &Cd4TestConfig {
        &self.config.cd4_test
    }

    /// Why a test is due this month, if one is.
    pub fn trigger(&self, patient: &Patient) -> Option<Cd4TestTrigger> {
        if patient.disease.hiv != HivStatus::Positive || !patient.treatment.in_care() {
            return None;
        }
        let cfg = self.cfg();
        let month = patient.general.month;
        let treatment = &patient.treatment;

        if cfg.test_at_art_start && treatment.on_art && treatment.art_start_month == Some(month) {
            return Some(Cd4TestTrigger::ArtInitiation);
        }
        if cfg.repeat_failure_threshold > 0
            && treatment.failure_count >= cfg.repeat_failure_threshold
            && !treatment.failure_tested
        {
            return Some(Cd4TestTrigger::RepeatFailure);
        }
        if cfg.interval_months > 0 {
            let due = patient
                .disease
                .last_cd4_test_month
                .map_or(true, |last| month.saturating_sub(last) >= cfg.interval_months);
            if due {
                return Some(Cd4TestTrigger::Scheduled);
            }
        }
        None
    }

    fn perform_test(&self, ctx: &mut UpdateContext<'_>, trigger: Cd4TestTrigger) {
        let true_cd4 = ctx.patient.disease.true_cd4;
        let observed = ctx
            .draw_gaussian(true_cd4, self.cfg().measurement_sd, StreamId::Cd4Test)
            .max(0.0);
        let stratum = Cd4Stratum::from_cd4(observed);

        let month = ctx.month();
        let disease = &mut ctx.patient.disease;
        disease.observed_cd4 = Some(observed);
        disease.last_cd4_test_month = Some(month);
        disease.stratum = stratum;
        if trigger == Cd4TestTrigger::RepeatFailure {
            ctx.patient.treatment.failure_tested = true;
        }

        ctx.accumulate_cost(CostBucket::Cd4Testing, self.cfg().cost);
        ctx.emit(PatientEventKind::Cd4Tested { observed, stratum, trigger });
        patient_trace!(ctx.patient, Level::Debug, "CD4 test ({trigger:?}): {observed:.0} -> {stratum:?}");
    }
}

impl PatientUpdater for Cd4TestUpdater {
    fn name(&self) -> &'static str { "cd4_test" }

    /// Baseline test at creation, when one is due.
    fn initial_update(&self, ctx: &mut UpdateContext<'_>) {
        if let Some(trigger) = self.trigger(ctx.patient) {
            self.perform_test(ctx, trigger);
        }
    }

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        if let Some(trigger) = self.trigger(ctx.patient) {
            self.perform_test(ctx, trigger);
        }
    }
}
