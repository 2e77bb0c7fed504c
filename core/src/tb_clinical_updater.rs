//! TB clinical-management updater: diagnostics, treatment and prophylaxis.
//!
//! This updater:
//!   1. Resolves pending drug-susceptibility tests once their delay passes
//!   2. Stops empiric therapy once it exceeds its configured duration
//!   3. Completes treatment courses and rolls for cure
//!   4. Applies TB-specific loss to follow-up when TB care is not
//!      integrated with HIV care
//!   5. Runs a diagnostic for eligible symptomatic patients
//!   6. Starts and stops prophylaxis per policy
//!   7. Accrues treatment, prophylaxis and untreated-TB costs
//!
//! Therapy changes in one direction per month: a patient whose treatment or
//! empiric therapy ended this month is not tested or started again until
//! the next month.
//!
//! The clinic never sees the natural-history state directly except through
//! diagnostic accuracy; every eligibility check is a pure predicate over the
//! patient and the policy config.

use crate::{
    config::{SimConfig, TbClinicalConfig, TbRegimenConfig},
    event::PatientEventKind,
    patient::{Patient, PendingDst, TbNaturalState, TbRegimen, TbTherapy},
    patient_trace,
    rng::StreamId,
    types::{CostBucket, HivStatus},
    updater::{PatientUpdater, UpdateContext},
};
use log::Level;
use std::sync::Arc;

pub struct TbClinicalUpdater {
    config: Arc<SimConfig>,
}

/// End the patient's TB care: therapy and pending results are dropped, and
/// an active case becomes a defaulted one.
pub(crate) fn drop_tb_care(ctx: &mut UpdateContext<'_>) {
    let month = ctx.month();
    let care = &mut ctx.patient.treatment.tb_care;
    let was_treated = care.on_treatment();
    care.end_therapy(month);
    care.pending_dst = None;
    if !was_treated {
        return;
    }
    let from = ctx.patient.disease.tb.natural;
    if from.is_active() {
        ctx.patient.disease.tb.natural = TbNaturalState::Defaulted;
        ctx.emit(PatientEventKind::TbTransition { from, to: TbNaturalState::Defaulted });
    }
    ctx.emit(PatientEventKind::TbCareLost);
    patient_trace!(ctx.patient, Level::Debug, "lost to TB care");
}

impl TbClinicalUpdater {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self { config }
    }

    fn cfg(&self) -> &TbClinicalConfig {
        &self.config.tb_clinical
    }

    fn regimen(&self, regimen: TbRegimen) -> &TbRegimenConfig {
        match regimen {
            TbRegimen::FirstLine  => &self.cfg().first_line,
            TbRegimen::SecondLine => &self.cfg().second_line,
        }
    }

    // ── Predicates ─────────────────────────────────────────────

    pub fn dst_due(&self, patient: &Patient) -> bool {
        matches!(
            patient.treatment.tb_care.pending_dst,
            Some(PendingDst { result_month }) if result_month <= patient.general.month
        )
    }

    /// Empiric therapy ends once it has run longer than `empiric_max_months`.
    pub fn empiric_expired(&self, patient: &Patient) -> bool {
        match patient.treatment.tb_care.therapy {
            TbTherapy::Empiric { start } => {
                patient.general.month - start > self.cfg().empiric_max_months
            }
            _ => false,
        }
    }

    pub fn treatment_complete(&self, patient: &Patient) -> bool {
        match patient.treatment.tb_care.therapy {
            TbTherapy::Treatment { regimen, start } => {
                patient.general.month - start >= self.regimen(regimen).duration_months
            }
            _ => false,
        }
    }

    pub fn eligible_for_diagnostics(&self, patient: &Patient) -> bool {
        let care = &patient.treatment.tb_care;
        let month = patient.general.month;
        patient.treatment.in_care()
            && patient.disease.tb.symptomatic
            && care.therapy == TbTherapy::None
            && !care.therapy_ended_in(month)
            && care.pending_dst.is_none()
            && care.last_diagnostic_month.map_or(true, |last| {
                month.saturating_sub(last) >= self.cfg().min_months_between_tests
            })
    }

    pub fn eligible_for_prophylaxis(&self, patient: &Patient) -> bool {
        let cfg = self.cfg();
        let care = &patient.treatment.tb_care;
        cfg.prophylaxis_enabled
            && patient.disease.hiv == HivStatus::Positive
            && patient.disease.stratum <= cfg.prophylaxis_max_stratum
            && patient.treatment.in_care()
            && (!cfg.prophylaxis_requires_art || patient.treatment.on_art)
            && !care.prophylaxis_completed
            && !care.on_prophylaxis()
            && care.therapy == TbTherapy::None
    }

    /// `Some(completed)` when prophylaxis should stop this month.
    pub fn prophylaxis_stop(&self, patient: &Patient) -> Option<bool> {
        let care = &patient.treatment.tb_care;
        let start = care.prophylaxis_start?;
        if patient.general.month - start >= self.cfg().prophylaxis_duration_months {
            return Some(true);
        }
        if care.therapy != TbTherapy::None || !patient.treatment.in_care() {
            return Some(false);
        }
        None
    }

    // ── Steps ──────────────────────────────────────────────────

    fn resolve_dst(&self, ctx: &mut UpdateContext<'_>) {
        if !self.dst_due(ctx.patient) {
            return;
        }
        ctx.patient.treatment.tb_care.pending_dst = None;
        let resistant = ctx.roll(StreamId::TbDstResult, self.cfg().dst_resistance_prob);
        ctx.emit(PatientEventKind::TbDstResolved { resistant });
        let first_line = matches!(
            ctx.patient.treatment.tb_care.therapy,
            TbTherapy::Treatment { regimen: TbRegimen::FirstLine, .. }
        );
        if resistant && first_line {
            self.start_treatment(ctx, TbRegimen::SecondLine);
        }
    }

    fn stop_empiric(&self, ctx: &mut UpdateContext<'_>) {
        if self.empiric_expired(ctx.patient) {
            let month = ctx.month();
            ctx.patient.treatment.tb_care.end_therapy(month);
            ctx.emit(PatientEventKind::TbEmpiricStopped);
        }
    }

    fn complete_treatment(&self, ctx: &mut UpdateContext<'_>) {
        let TbTherapy::Treatment { regimen, .. } = ctx.patient.treatment.tb_care.therapy else {
            return;
        };
        if !self.treatment_complete(ctx.patient) {
            return;
        }
        let month = ctx.month();
        ctx.patient.treatment.tb_care.end_therapy(month);
        let cured = ctx.roll(StreamId::TbTreatmentOutcome, self.regimen(regimen).cure_prob);
        let from = ctx.patient.disease.tb.natural;
        if cured && (from.is_active() || from == TbNaturalState::Latent) {
            ctx.patient.disease.tb.natural = TbNaturalState::PreviouslyTreated;
            ctx.emit(PatientEventKind::TbTransition { from, to: TbNaturalState::PreviouslyTreated });
        }
        ctx.emit(PatientEventKind::TbTreatmentCompleted { cured });
        patient_trace!(ctx.patient, Level::Debug, "TB treatment {regimen:?} completed, cured={cured}");
    }

    fn roll_tb_ltfu(&self, ctx: &mut UpdateContext<'_>) {
        if self.cfg().integrated_with_hiv_care || !ctx.patient.treatment.tb_care.on_treatment() {
            return;
        }
        if ctx.roll(StreamId::TbLossToFollowUp, self.cfg().tb_ltfu_prob) {
            drop_tb_care(ctx);
        }
    }

    fn start_treatment(&self, ctx: &mut UpdateContext<'_>, regimen: TbRegimen) {
        let month = ctx.month();
        let care = &mut ctx.patient.treatment.tb_care;
        care.therapy = TbTherapy::Treatment { regimen, start: month };
        if regimen == TbRegimen::FirstLine {
            care.treatment_episodes += 1;
            care.pending_dst = Some(PendingDst {
                result_month: month + self.cfg().dst_delay_months,
            });
        }
        ctx.emit(PatientEventKind::TbTreatmentStarted { regimen });
        patient_trace!(ctx.patient, Level::Debug, "TB treatment {regimen:?} started");
    }

    fn run_diagnostics(&self, ctx: &mut UpdateContext<'_>) {
        if !self.eligible_for_diagnostics(ctx.patient) {
            return;
        }
        let cfg = self.cfg();
        ctx.patient.treatment.tb_care.last_diagnostic_month = Some(ctx.month());
        ctx.accumulate_cost(CostBucket::TbDiagnostics, cfg.diagnostic_cost);

        let p_positive = if ctx.patient.disease.tb.natural.is_active() {
            cfg.diagnostic_sensitivity
        } else {
            1.0 - cfg.diagnostic_specificity
        };
        let positive = ctx.roll(StreamId::TbDiagnostic, p_positive);
        ctx.emit(PatientEventKind::TbDiagnosticPerformed { positive });

        if positive {
            self.start_treatment(ctx, TbRegimen::FirstLine);
        } else if cfg.empiric_on_negative_test {
            ctx.patient.treatment.tb_care.therapy = TbTherapy::Empiric { start: ctx.month() };
            ctx.emit(PatientEventKind::TbEmpiricStarted);
        }
    }

    fn update_prophylaxis(&self, ctx: &mut UpdateContext<'_>) {
        if let Some(completed) = self.prophylaxis_stop(ctx.patient) {
            let care = &mut ctx.patient.treatment.tb_care;
            care.prophylaxis_start = None;
            care.prophylaxis_completed |= completed;
            ctx.emit(PatientEventKind::TbProphylaxisStopped { completed });
            return;
        }
        if self.eligible_for_prophylaxis(ctx.patient) {
            ctx.patient.treatment.tb_care.prophylaxis_start = Some(ctx.month());
            ctx.emit(PatientEventKind::TbProphylaxisStarted);
        }
    }

    fn accrue_costs(&self, ctx: &mut UpdateContext<'_>) {
        let care = &ctx.patient.treatment.tb_care;
        let on_proph = care.on_prophylaxis();
        let (bucket, cost) = match care.therapy {
            TbTherapy::Treatment { regimen, .. } => {
                (CostBucket::TbTreatment, self.regimen(regimen).monthly_cost)
            }
            TbTherapy::Empiric { .. } => (CostBucket::TbEmpiric, self.cfg().empiric_monthly_cost),
            TbTherapy::None => (CostBucket::TbTreatment, 0.0),
        };
        let untreated = ctx.patient.disease.tb.natural.is_active() && !care.on_treatment();

        ctx.accumulate_cost(bucket, cost);
        if on_proph {
            ctx.accumulate_cost(CostBucket::TbProphylaxis, self.cfg().prophylaxis_monthly_cost);
        }
        if untreated {
            ctx.accumulate_cost(CostBucket::TbUntreated, self.cfg().untreated_monthly_cost);
        }
    }
}

impl PatientUpdater for TbClinicalUpdater {
    fn name(&self) -> &'static str { "tb_clinical" }

    fn initial_update(&self, _ctx: &mut UpdateContext<'_>) {}

    fn monthly_update(&self, ctx: &mut UpdateContext<'_>) {
        self.resolve_dst(ctx);
        self.stop_empiric(ctx);
        self.complete_treatment(ctx);
        self.roll_tb_ltfu(ctx);
        self.run_diagnostics(ctx);
        self.update_prophylaxis(ctx);
        self.accrue_costs(ctx);
    }
}
