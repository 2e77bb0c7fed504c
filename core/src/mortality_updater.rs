//! Mortality updater: competing-risk resolution of this month's hazards.
//!
//! Every month the updater:
//!   1. Registers background-cause ratios (HIV stratum, risk factors)
//!   2. Takes every hazard registered this month by earlier updaters
//!   3. Combines them with the background rate into one death probability
//!   4. Draws once; on death, picks exactly one cause
//!
//! Hazards are cleared every month whatever the outcome.
//!
//! Combination: the background probability `p0` becomes a rate
//! `h0 = -ln(1 - p0)`. A hazard with ratio `r` adds an excess rate
//! `h0 * (r - 1)`. With `H` the total rate, `P(death) = 1 - exp(-H)`.
//!
//! Cause selection reuses the death draw `u`: the value `u * H / P(death)`
//! is located on the cumulative rates, walking `Background` first and then
//! the hazards sorted by `MortalityCause` order (stable for equal causes).
//! The first cause whose cumulative bound lies strictly above it is the
//! cause of death, so a cause's share of deaths equals its share of `H`.

use crate::{
    config::{MortalityConfig, SimConfig},
    event::PatientEventKind,
    patient::{DeathRecord, MortalityHazard},
    patient_trace,
    prob::{prob_to_rate, rate_to_prob},
    rng::StreamId,
    tables::DemoKey,
    types::{HivStatus, MortalityCause},
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

/// This month's combined mortality risk.
#[derive(Debug, Clone, PartialEq)]
pub struct CompetingRisks {
    /// Rate contributed by each cause, in selection order.
    pub rates:      Vec<(MortalityCause, f64)>,
    pub total_rate: f64,
    pub death_prob: f64,
}

impl CompetingRisks {
    pub fn new(background_prob: f64, hazards: &[MortalityHazard]) -> Self {
        let base = prob_to_rate(background_prob);
        let mut sorted: Vec<&MortalityHazard> = hazards.iter().collect();
        sorted.sort_by_key(|h| h.cause);

        let mut rates = Vec::with_capacity(sorted.len() + 1);
        rates.push((MortalityCause::Background, base));
        rates.extend(
            sorted
                .into_iter()
                .map(|h| (h.cause, base * (h.rate_ratio - 1.0))),
        );
        let total_rate: f64 = rates.iter().map(|(_, r)| r).sum();
        Self {
            rates,
            total_rate,
            death_prob: rate_to_prob(total_rate),
        }
    }

    /// The cause of death for uniform draw `u`, or `None` if the patient
    /// survives the month.
    pub fn select(&self, u: f64) -> Option<MortalityCause> {
        if u >= self.death_prob {
            return None;
        }
        let target = u / self.death_prob * self.total_rate;
        let mut cumulative = 0.0;
        for (cause, rate) in &self.rates {
            cumulative += rate;
            if target < cumulative {
                return Some(*cause);
            }
        }
        self.rates.last().map(|(cause, _)| *cause)
    }
}

pub struct MortalityUpdater {
    config: Arc<SimConfig>,
}

impl MortalityUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &MortalityConfig {
        &self.config.mortality
    }

    fn register_background_causes(&self, ctx: &mut UpdateContext<'_>) {
        if ctx.patient.disease.hiv == HivStatus::Positive {
            let ratio = self.cfg().hiv_death_rate_ratio[ctx.patient.disease.stratum.index()];
            if ratio > 1.0 {
                ctx.register_mortality_hazard(MortalityCause::HivRelated, ratio);
            }
        }
        let active: Vec<_> = ctx.patient.active_risk_factors().collect();
        for rf in active {
            let ratio = self.cfg().risk_factor_death_rate_ratio[rf.index()];
            if ratio > 1.0 {
                ctx.register_mortality_hazard(MortalityCause::RiskFactor(rf), ratio);
            }
        }
    }
}

impl PatientUpdater for MortalityUpdater {
    fn name(&self) -> &'static str { "mortality" }

    fn initial_update(&self, ctx: &mut UpdateContext<'_>) {
        ctx.patient.accum.hazards.clear();
    }

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        self.register_background_causes(ctx);
        let hazards = std::mem::take(&mut ctx.patient.accum.hazards);

        let demo = DemoKey {
            gender: ctx.patient.general.gender,
            age:    self.config.age_category(ctx.patient.general.age_months),
        };
        let risks = CompetingRisks::new(self.cfg().background_monthly_prob.get(demo), &hazards);
        let u = ctx.draw(StreamId::Mortality);

        let Some(cause) = risks.select(u) else {
            return;
        };
        let month = ctx.month();
        ctx.patient.general.death = Some(DeathRecord { month, cause });
        ctx.emit(PatientEventKind::Died { cause });
        patient_trace!(
            ctx.patient,
            Level::Info,
            "died of {cause} (p={:.5}, {} hazards)",
            risks.death_prob,
            hazards.len()
        );
    }
}
