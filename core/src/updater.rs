//! Updater trait and the shared state-mutation primitives.
//!
//! RULE: Every disease or behaviour module implements PatientUpdater.
//! The engine calls each registered updater in registration order, once
//! at patient creation and once per simulated month.
//! Updaters only touch the patient through `UpdateContext`.

use crate::{
    config::ConditionSpec,
    event::{PatientEvent, PatientEventKind},
    patient::{MortalityHazard, Patient},
    rng::{DrawSource, StreamId},
    types::{ConditionId, CostBucket, Month, MortalityCause, RiskFactor},
};

/// The contract every updater must fulfill.
pub trait PatientUpdater: Send + Sync {
    /// Unique stable name for this updater.
    fn name(&self) -> &'static str;

    /// Called once when the patient is created.
    fn initial_update(&self, ctx: &mut UpdateContext<'_>);

    /// Called once per simulated month.
    fn monthly_update(&self, ctx: &mut UpdateContext<'_>);
}

/// One updater's view of one patient for one call.
pub struct UpdateContext<'a> {
    pub patient: &'a mut Patient,
    draws:       &'a mut dyn DrawSource,
    updater:     &'static str,
    events:      &'a mut Vec<PatientEvent>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(
        patient: &'a mut Patient,
        draws: &'a mut dyn DrawSource,
        updater: &'static str,
        events: &'a mut Vec<PatientEvent>,
    ) -> Self {
        Self { patient, draws, updater, events }
    }

    pub fn month(&self) -> Month {
        self.patient.general.month
    }

    // ── Randomness ─────────────────────────────────────────────

    /// One uniform draw on `stream`.
    pub fn draw(&mut self, stream: StreamId) -> f64 {
        self.draws.draw(stream, self.patient.id)
    }

    pub fn draw_gaussian(&mut self, mean: f64, std_dev: f64, stream: StreamId) -> f64 {
        self.draws.draw_gaussian(mean, std_dev, stream, self.patient.id)
    }

    /// Bernoulli trial: one draw on `stream`, true when it falls below `p`.
    pub fn roll(&mut self, stream: StreamId, p: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&p),
            "probability {p} outside [0, 1] on stream {stream:?}"
        );
        self.draw(stream) < p
    }

    // ── State mutation ─────────────────────────────────────────

    /// Set a condition's presence.
    ///
    /// A new onset records stage 0 at `onset` (defaulting to the current
    /// month) and every later stage at `onset + start_offset_months`.
    /// Setting an already-present condition present again changes nothing.
    /// Clearing a condition also clears its stage history.
    pub fn set_condition_state(
        &mut self,
        id: ConditionId,
        spec: &ConditionSpec,
        present: bool,
        onset: Option<Month>,
    ) {
        let month = self.month();
        let state = &mut self.patient.disease.conditions[id.index()];
        if !present {
            state.present = false;
            state.stage_start.clear();
            return;
        }
        if state.present {
            return;
        }
        let onset = onset.unwrap_or(month);
        assert!(onset <= month, "{id} onset {onset} after current month {month}");
        state.present = true;
        state.stage_start = spec
            .stages
            .iter()
            .map(|stage| Some(onset + stage.start_offset_months))
            .collect();
    }

    /// Turn a risk factor on. Risk factors never switch off mid-simulation.
    pub fn set_risk_factor(&mut self, rf: RiskFactor, present: bool) {
        let flag = &mut self.patient.general.risk_factors[rf.index()];
        assert!(
            present || !*flag,
            "risk factor {} cannot be switched off",
            rf.index()
        );
        *flag = present;
    }

    /// Register an excess mortality hazard for this month. Ratios at or
    /// below 1 carry no excess risk and are not recorded.
    pub fn register_mortality_hazard(&mut self, cause: MortalityCause, rate_ratio: f64) {
        if rate_ratio <= 1.0 {
            return;
        }
        self.patient.accum.hazards.push(MortalityHazard { cause, rate_ratio });
    }

    pub fn accumulate_cost(&mut self, bucket: CostBucket, amount: f64) {
        if amount == 0.0 {
            return;
        }
        *self.patient.accum.costs.entry(bucket).or_insert(0.0) += amount;
    }

    pub fn accumulate_qol(&mut self, amount: f64) {
        self.patient.accum.qol_modifier += amount;
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn emit(&mut self, kind: PatientEventKind) {
        self.events.push(PatientEvent {
            month: self.patient.general.month,
            updater: self.updater,
            kind,
        });
    }
}
