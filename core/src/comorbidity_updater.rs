//! Comorbidity updater: prevalence, incidence and staging of chronic
//! conditions.
//!
//! This updater:
//!   1. Rolls prevalent conditions at patient creation
//!   2. Rolls monthly incidence for every condition not yet present
//!   3. Rolls monthly incidence of generic risk factors
//!   4. Resolves each present condition's stage, registering its excess
//!      mortality and accruing its cost and QOL modifier
//!
//! Under dependent onset the conditions form a prerequisite chain: the scan
//! stops at the first condition not acquired, at most one condition starts
//! per month, and the scan waits a configured gap after the latest onset.

use crate::{
    config::{ComorbidityConfig, ConditionSpec, OnsetMode, QolMode, SimConfig},
    event::PatientEventKind,
    patient::Patient,
    patient_trace,
    prob::{effective_multiplier, scale_prob, LogOdds},
    rng::StreamId,
    tables::{DemoKey, StrataKey},
    types::{ConditionId, CostBucket, EffectCategory, HivStatus, Month, MortalityCause, RiskFactor},
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

pub struct ComorbidityUpdater {
    config: Arc<SimConfig>,
}

impl ComorbidityUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &ComorbidityConfig {
        &self.config.comorbidity
    }

    fn dependent_onset(&self) -> bool {
        matches!(self.cfg().onset_mode, OnsetMode::Dependent { .. })
    }

    fn demo_key(&self, patient: &Patient) -> DemoKey {
        DemoKey {
            gender: patient.general.gender,
            age:    self.config.age_category(patient.general.age_months),
        }
    }

    fn strata_key(&self, patient: &Patient) -> StrataKey {
        let demo = self.demo_key(patient);
        StrataKey {
            stratum: patient.disease.stratum,
            gender:  demo.gender,
            age:     demo.age,
        }
    }

    fn risk_factor_deltas<'a>(
        spec: &'a ConditionSpec,
        patient: &'a Patient,
    ) -> impl Iterator<Item = f64> + 'a {
        patient
            .active_risk_factors()
            .map(move |rf| spec.risk_factor_logit[rf.index()])
    }

    /// Logit deltas from other conditions whose onset is strictly before
    /// the current month.
    fn history_deltas<'a>(
        &'a self,
        id: ConditionId,
        spec: &'a ConditionSpec,
        patient: &'a Patient,
    ) -> impl Iterator<Item = f64> + 'a {
        let month = patient.general.month;
        self.cfg()
            .ids()
            .filter(move |other| *other != id)
            .filter(move |other| {
                let state = patient.disease.condition(*other);
                state.present && matches!(state.onset_month(), Some(onset) if onset < month)
            })
            .map(move |other| spec.history_delta(other))
    }

    fn prevalence_prob(&self, spec: &ConditionSpec, patient: &Patient) -> f64 {
        let base = match patient.disease.hiv {
            HivStatus::Negative => spec.prevalence_hiv_negative.get(self.demo_key(patient)),
            HivStatus::Positive => spec.prevalence_hiv_positive.get(self.strata_key(patient)),
        };
        LogOdds::from_prob(base)
            .shift_all(Self::risk_factor_deltas(spec, patient))
            .prob()
    }

    /// Monthly incidence after treatment, risk-factor and history effects.
    pub fn incidence_prob(&self, id: ConditionId, patient: &Patient) -> f64 {
        let spec = self.cfg().condition(id);
        let mut base = match patient.disease.hiv {
            HivStatus::Negative => spec.incidence_hiv_negative.get(self.demo_key(patient)),
            HivStatus::Positive => spec.incidence_hiv_positive.get(self.strata_key(patient)),
        };
        if patient.art_effect_applies() {
            let multiplier = effective_multiplier(
                patient.treatment.response_factor(EffectCategory::Comorbidity),
                spec.art_multiplier[patient.disease.stratum.index()],
            );
            base = scale_prob(base, multiplier);
        }
        LogOdds::from_prob(base)
            .shift_all(Self::risk_factor_deltas(spec, patient))
            .shift_all(self.history_deltas(id, spec, patient))
            .prob()
    }

    /// Months since onset for a prevalent case.
    fn prevalent_duration(&self, ctx: &mut UpdateContext<'_>, spec: &ConditionSpec) -> Month {
        match self.cfg().onset_mode {
            OnsetMode::Independent => {
                let sampled = ctx.draw_gaussian(
                    spec.onset_months_mean,
                    spec.onset_months_sd,
                    StreamId::ComorbidityOnset,
                );
                sampled.round().max(0.0) as Month
            }
            OnsetMode::Dependent { .. } => {
                let table = &spec.dependent_onset_months_by_age;
                let years = (ctx.patient.general.age_months / 12) as usize;
                table[years.min(table.len() - 1)]
            }
        }
    }

    /// Whether the chain scan may run this month.
    fn chain_gate_open(&self, patient: &Patient) -> bool {
        let OnsetMode::Dependent { min_months_between } = self.cfg().onset_mode else {
            return true;
        };
        match patient.disease.latest_onset() {
            Some(latest) => patient.general.month.saturating_sub(latest) >= min_months_between,
            None => true,
        }
    }

    fn roll_incidence(&self, ctx: &mut UpdateContext<'_>) {
        let dependent = self.dependent_onset();
        for id in self.cfg().ids() {
            if ctx.patient.disease.has_condition(id) {
                continue;
            }
            let p = self.incidence_prob(id, ctx.patient);
            if ctx.roll(StreamId::ComorbidityIncidence, p) {
                let spec = self.cfg().condition(id);
                ctx.set_condition_state(id, spec, true, None);
                ctx.emit(PatientEventKind::ConditionOnset { condition: id });
                patient_trace!(ctx.patient, Level::Debug, "{} onset (p={p:.5})", spec.name);
            }
            if dependent {
                break;
            }
        }
    }

    fn roll_risk_factors(&self, ctx: &mut UpdateContext<'_>) {
        for rf in RiskFactor::all() {
            if ctx.patient.has_risk_factor(rf) {
                continue;
            }
            let p = self.cfg().risk_factor_incidence[rf.index()];
            if ctx.roll(StreamId::RiskFactorIncidence, p) {
                ctx.set_risk_factor(rf, true);
                ctx.emit(PatientEventKind::RiskFactorAcquired { risk_factor: rf });
                patient_trace!(ctx.patient, Level::Debug, "risk factor {} acquired", rf.index());
            }
        }
    }

    fn apply_stages(&self, ctx: &mut UpdateContext<'_>) {
        let month = ctx.month();
        let demo = self.demo_key(ctx.patient);
        let mut present = 0usize;

        for id in self.cfg().ids() {
            let state = ctx.patient.disease.condition(id);
            if !state.present {
                continue;
            }
            present += 1;
            let Some(stage) = state.active_stage(month) else {
                panic!("{id} is present but no stage has started by month {month}");
            };
            let previous = month.checked_sub(1).and_then(|m| state.active_stage(m));

            let spec = self.cfg().condition(id);
            let stage_spec = spec.stage(stage);
            if matches!(previous, Some(prev) if prev != stage) {
                ctx.emit(PatientEventKind::ConditionStageChanged { condition: id, stage });
                patient_trace!(ctx.patient, Level::Debug, "{} entered stage {stage}", spec.name);
            }

            let ratio = stage_spec.death_rate_ratio.get(demo);
            if ratio > 1.0 {
                ctx.register_mortality_hazard(MortalityCause::Comorbidity(id), ratio);
            }
            ctx.accumulate_cost(CostBucket::Comorbidity(id), stage_spec.cost.get(demo));
            ctx.accumulate_qol(stage_spec.qol.get(demo));
        }

        if self.cfg().qol_mode == QolMode::Marginal && present > 1 {
            let penalty = self.cfg().marginal_qol_penalty[present - 2];
            ctx.accumulate_qol(penalty);
            patient_trace!(ctx.patient, Level::Trace, "{present} conditions, marginal qol {penalty}");
        }
    }
}

impl PatientUpdater for ComorbidityUpdater {
    fn name(&self) -> &'static str { "comorbidity" }

    fn initial_update(&self, ctx: &mut UpdateContext<'_>) {
        let dependent = self.dependent_onset();
        if dependent {
            for id in self.cfg().ids() {
                ctx.set_condition_state(id, self.cfg().condition(id), false, None);
            }
        }

        for id in self.cfg().ids() {
            if ctx.patient.disease.has_condition(id) {
                continue;
            }
            let spec = self.cfg().condition(id);
            let p = self.prevalence_prob(spec, ctx.patient);
            if !ctx.roll(StreamId::ComorbidityPrevalence, p) {
                if dependent {
                    break;
                }
                continue;
            }
            let duration = self.prevalent_duration(ctx, spec);
            let onset = ctx.month().saturating_sub(duration);
            ctx.set_condition_state(id, spec, true, Some(onset));
            ctx.emit(PatientEventKind::ConditionPrevalent { condition: id, onset_month: onset });
            patient_trace!(ctx.patient, Level::Debug, "{} prevalent since month {onset}", spec.name);
        }
    }

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        if self.chain_gate_open(ctx.patient) {
            self.roll_incidence(ctx);
        }
        self.roll_risk_factors(ctx);
        self.apply_stages(ctx);
    }
}
