//! TB natural-history updater.
//!
//! Monthly roll order (fixed):
//!   1. Activation         latent → active
//!   2. Self-cure          active → previously treated
//!   3. Symptoms           acquisition, and clearance for non-active states
//!   4. (Re)infection      uninfected / latent / treated / defaulted → latent
//!   5. Relapse            treated / defaulted → active
//!
//! At most one state transition happens per month: once a roll moves the
//! patient, the remaining transition rolls are skipped. Symptoms are always
//! evaluated against the post-transition state.

use crate::{
    config::{SimConfig, TbConfig},
    event::PatientEventKind,
    patient::{Patient, TbNaturalState},
    patient_trace,
    prob::{effective_multiplier, scale_prob, LogOdds},
    rng::StreamId,
    tables::DemoKey,
    types::{EffectCategory, MortalityCause},
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

pub struct TbNaturalUpdater {
    config: Arc<SimConfig>,
}

impl TbNaturalUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &TbConfig {
        &self.config.tb
    }

    /// Monthly activation probability for a latent infection.
    pub fn activation_prob(&self, patient: &Patient) -> f64 {
        let cfg = self.cfg();
        let tb = &patient.disease.tb;
        let stratum = patient.disease.stratum;
        let mut base = cfg.activation_prob.get(patient.disease.hiv, stratum);
        if patient.art_effect_applies() {
            let multiplier = effective_multiplier(
                patient.treatment.response_factor(EffectCategory::TbActivation),
                cfg.art_activation_multiplier[stratum.index()],
            );
            base = scale_prob(base, multiplier);
        }

        let mut odds = LogOdds::from_prob(base);
        let recent = tb
            .infection_month
            .is_some_and(|m| patient.general.month.saturating_sub(m) < cfg.recent_infection_months);
        if recent {
            odds = odds.shift(cfg.recent_infection_logit);
        }
        if tb.last_active.is_some() {
            odds = odds.shift(cfg.prior_active_logit);
        }
        if patient.treatment.tb_care.on_prophylaxis() {
            odds = odds.shift(cfg.prophylaxis_logit);
        }
        odds.prob()
    }

    fn transition(&self, ctx: &mut UpdateContext<'_>, to: TbNaturalState) {
        let month = ctx.month();
        let tb = &mut ctx.patient.disease.tb;
        let from = tb.natural;
        tb.natural = to;
        if to.is_active() {
            tb.last_active = Some(to);
            tb.activation_month = Some(month);
        }
        ctx.emit(PatientEventKind::TbTransition { from, to });
        patient_trace!(ctx.patient, Level::Debug, "TB {from:?} -> {to:?}");
    }

    fn roll_activation(&self, ctx: &mut UpdateContext<'_>) -> bool {
        if ctx.patient.disease.tb.natural != TbNaturalState::Latent {
            return false;
        }
        let p = self.activation_prob(ctx.patient);
        if !ctx.roll(StreamId::TbActivation, p) {
            return false;
        }
        let site = if ctx.roll(StreamId::TbActivationSite, self.cfg().pulmonary_fraction) {
            TbNaturalState::ActivePulmonary
        } else {
            TbNaturalState::ActiveExtrapulmonary
        };
        self.transition(ctx, site);
        true
    }

    fn roll_self_cure(&self, ctx: &mut UpdateContext<'_>) -> bool {
        let p = match ctx.patient.disease.tb.natural {
            TbNaturalState::ActivePulmonary      => self.cfg().self_cure_pulmonary,
            TbNaturalState::ActiveExtrapulmonary => self.cfg().self_cure_extrapulmonary,
            _ => return false,
        };
        if !ctx.roll(StreamId::TbSelfCure, p) {
            return false;
        }
        self.transition(ctx, TbNaturalState::PreviouslyTreated);
        true
    }

    fn roll_symptoms(&self, ctx: &mut UpdateContext<'_>) {
        let tb = &ctx.patient.disease.tb;
        let active = tb.natural.is_active();
        let symptomatic = tb.symptomatic;
        let changed = match (active, symptomatic) {
            (true, true) => false,
            (true, false) => ctx.roll(StreamId::TbSymptoms, self.cfg().symptom_onset_active),
            (false, true) => ctx.roll(StreamId::TbSymptoms, self.cfg().symptom_clearance),
            (false, false) => ctx.roll(StreamId::TbSymptoms, self.cfg().symptom_onset_inactive),
        };
        if changed {
            ctx.patient.disease.tb.symptomatic = !symptomatic;
            ctx.emit(PatientEventKind::TbSymptomsChanged { symptomatic: !symptomatic });
        }
    }

    fn roll_infection(&self, ctx: &mut UpdateContext<'_>) -> bool {
        let state = ctx.patient.disease.tb.natural;
        if state.is_active() {
            return false;
        }
        let demo = DemoKey {
            gender: ctx.patient.general.gender,
            age:    self.config.age_category(ctx.patient.general.age_months),
        };
        let mut odds = LogOdds::from_prob(self.cfg().infection_prob.get(demo));
        if state != TbNaturalState::Uninfected {
            odds = odds.shift(self.cfg().reinfection_logit);
        }
        if !ctx.roll(StreamId::TbInfection, odds.prob()) {
            return false;
        }
        ctx.patient.disease.tb.infection_month = Some(ctx.month());
        if state == TbNaturalState::Latent {
            patient_trace!(ctx.patient, Level::Debug, "TB reinfection while latent");
            return false;
        }
        self.transition(ctx, TbNaturalState::Latent);
        true
    }

    fn roll_relapse(&self, ctx: &mut UpdateContext<'_>) -> bool {
        let state = ctx.patient.disease.tb.natural;
        if !matches!(state, TbNaturalState::PreviouslyTreated | TbNaturalState::Defaulted) {
            return false;
        }
        let patient = &*ctx.patient;
        let mut odds = LogOdds::from_prob(
            self.cfg().relapse_prob.get(patient.disease.hiv, patient.disease.stratum),
        );
        if state == TbNaturalState::Defaulted {
            odds = odds.shift(self.cfg().defaulted_relapse_logit);
        }
        let site = patient.disease.tb.last_active.unwrap_or(TbNaturalState::ActivePulmonary);
        if !ctx.roll(StreamId::TbRelapse, odds.prob()) {
            return false;
        }
        self.transition(ctx, site);
        true
    }

    fn register_hazard(&self, ctx: &mut UpdateContext<'_>) {
        let patient = &*ctx.patient;
        let table = match patient.disease.tb.natural {
            TbNaturalState::ActivePulmonary      => &self.cfg().death_rate_ratio_pulmonary,
            TbNaturalState::ActiveExtrapulmonary => &self.cfg().death_rate_ratio_extrapulmonary,
            _ => return,
        };
        let ratio = table.get(patient.disease.hiv, patient.disease.stratum);
        if ratio > 1.0 {
            ctx.register_mortality_hazard(MortalityCause::Tuberculosis, ratio);
        }
    }
}

impl PatientUpdater for TbNaturalUpdater {
    fn name(&self) -> &'static str { "tb_natural" }

    fn initial_update(&self, ctx: &mut UpdateContext<'_>) {
        let tb = &ctx.patient.disease.tb;
        if tb.natural != TbNaturalState::Uninfected {
            patient_trace!(ctx.patient, Level::Debug, "TB state at creation {:?}", tb.natural);
        }
    }

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        let moved = self.roll_activation(ctx) || self.roll_self_cure(ctx);
        self.roll_symptoms(ctx);
        if !moved && !self.roll_infection(ctx) {
            self.roll_relapse(ctx);
        }
        self.register_hazard(ctx);
    }
}
