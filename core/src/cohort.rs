//! Patient creation from the cohort distribution.
//!
//! Every attribute has its own stream, so changing one distribution never
//! shifts the draws behind another.

use crate::{
    config::{CohortConfig, SimConfig},
    patient::{Patient, TbNaturalState},
    rng::{DrawSource, StreamId},
    types::{EffectCategory, Gender, PatientId, RiskFactor},
};
use std::sync::Arc;

pub struct PatientFactory {
    config: Arc<SimConfig>,
}

impl PatientFactory {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &CohortConfig {
        &self.config.cohort
    }

    /// Sample a new living patient at month 0.
    pub fn create(&self, id: PatientId, draws: &mut dyn DrawSource) -> Patient {
        let cfg = self.cfg();

        let gender = if draws.draw(StreamId::CohortGender, id) < cfg.male_fraction {
            Gender::Male
        } else {
            Gender::Female
        };
        let age = draws
            .draw_gaussian(cfg.age_mean_months, cfg.age_sd_months, StreamId::CohortAge, id)
            .round()
            .max(cfg.min_age_months as f64) as u32;

        let mut patient = Patient::new(id, gender, age, self.config.comorbidity.conditions.len());

        if draws.draw(StreamId::CohortHiv, id) < cfg.hiv_positive_fraction {
            let cd4 = draws
                .draw_gaussian(cfg.cd4_mean, cfg.cd4_sd, StreamId::CohortCd4, id)
                .max(0.0);
            patient = patient.with_hiv(cd4);
            if draws.draw(StreamId::CohortArt, id) < cfg.on_art_fraction {
                patient.start_art(self.response_factors());
            }
        }

        for rf in RiskFactor::all() {
            if draws.draw(StreamId::CohortRiskFactor, id) < cfg.risk_factor_prevalence[rf.index()] {
                patient.general.risk_factors[rf.index()] = true;
            }
        }

        if draws.draw(StreamId::CohortTb, id) < cfg.latent_tb_fraction {
            patient.disease.tb.natural = TbNaturalState::Latent;
        }

        log::debug!(
            "Created patient {id}: {gender:?}, {} months, {:?}",
            patient.general.age_months,
            patient.disease.hiv
        );
        patient
    }

    fn response_factors(&self) -> [f64; EffectCategory::COUNT] {
        let mut factors = [1.0; EffectCategory::COUNT];
        factors.copy_from_slice(&self.cfg().art_response_factors);
        factors
    }
}
