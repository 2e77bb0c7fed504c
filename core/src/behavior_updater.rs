//! Care-engagement updater: loss to follow-up, return to care and ART
//! failure.
//!
//! Only HIV-positive patients are engaged in (or lost from) HIV care.
//! Losing care suspends ART; when TB care is integrated with HIV care the
//! patient also defaults from TB treatment. Returning to care resumes ART
//! for patients who had started it. Patients who stay in care on ART may
//! fail their regimen, which feeds the confirmatory CD4 test.

use crate::{
    config::{CareConfig, SimConfig},
    event::PatientEventKind,
    patient::CareState,
    patient_trace,
    prob::LogOdds,
    rng::StreamId,
    tb_clinical_updater::drop_tb_care,
    types::HivStatus,
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

pub struct BehaviorUpdater {
    config: Arc<SimConfig>,
}

impl BehaviorUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &CareConfig {
        &self.config.care
    }

    fn roll_loss(&self, ctx: &mut UpdateContext<'_>) {
        let p = LogOdds::from_prob(self.cfg().ltfu_monthly_prob)
            .shift_all(
                ctx.patient
                    .active_risk_factors()
                    .map(|rf| self.cfg().ltfu_risk_factor_logit[rf.index()]),
            )
            .prob();
        if !ctx.roll(StreamId::CareLossToFollowUp, p) {
            return;
        }
        let month = ctx.month();
        ctx.patient.treatment.care = CareState::LostToFollowUp { since: month };
        ctx.patient.treatment.on_art = false;
        ctx.emit(PatientEventKind::LostToFollowUp);
        patient_trace!(ctx.patient, Level::Debug, "lost to follow-up");

        if self.config.tb_clinical.integrated_with_hiv_care {
            drop_tb_care(ctx);
        }
    }

    fn roll_failure(&self, ctx: &mut UpdateContext<'_>) {
        if !ctx.patient.treatment.in_care() || !ctx.patient.treatment.on_art {
            return;
        }
        if !ctx.roll(StreamId::ArtFailure, self.cfg().art_failure_monthly_prob) {
            return;
        }
        ctx.patient.record_treatment_failure();
        let failure_count = ctx.patient.treatment.failure_count;
        ctx.emit(PatientEventKind::ArtFailure { failure_count });
        patient_trace!(ctx.patient, Level::Debug, "ART failure #{failure_count}");
    }

    fn roll_return(&self, ctx: &mut UpdateContext<'_>) {
        let p = self.cfg().return_monthly_prob[ctx.patient.disease.stratum.index()];
        if !ctx.roll(StreamId::CareReturn, p) {
            return;
        }
        let treatment = &mut ctx.patient.treatment;
        treatment.care = CareState::InCare;
        let art_resumed = treatment.art_start_month.is_some();
        treatment.on_art = art_resumed;
        ctx.emit(PatientEventKind::ReturnedToCare { art_resumed });
        patient_trace!(ctx.patient, Level::Debug, "returned to care, art_resumed={art_resumed}");
    }
}

impl PatientUpdater for BehaviorUpdater {
    fn name(&self) -> &'static str { "behavior" }

    fn initial_update(&self, _ctx: &mut UpdateContext<'_>) {}

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        if ctx.patient.disease.hiv != HivStatus::Positive {
            return;
        }
        match ctx.patient.treatment.care {
            CareState::InCare => {
                self.roll_loss(ctx);
                self.roll_failure(ctx);
            }
            CareState::LostToFollowUp { .. } => self.roll_return(ctx),
        }
    }
}
