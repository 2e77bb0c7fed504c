//! The patient event log.
//!
//! RULE: Updaters never call each other. They read and write the shared
//! `Patient`, and record what changed as `PatientEvent`s.
//! The log is what determinism tests compare across runs.

use crate::{
    patient::{TbNaturalState, TbRegimen},
    types::{Cd4Stratum, ConditionId, Gender, HivStatus, Month, MortalityCause, RiskFactor},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientEvent {
    pub month:   Month,
    pub updater: &'static str,
    pub kind:    PatientEventKind,
}

/// Variants are appended as updaters grow, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatientEventKind {
    // ── Driver ─────────────────────────────────────
    PatientCreated {
        gender:     Gender,
        age_months: u32,
        hiv:        HivStatus,
    },

    // ── Comorbidities ──────────────────────────────
    ConditionPrevalent {
        condition:   ConditionId,
        onset_month: Month,
    },
    ConditionOnset {
        condition: ConditionId,
    },
    ConditionStageChanged {
        condition: ConditionId,
        stage:     usize,
    },
    RiskFactorAcquired {
        risk_factor: RiskFactor,
    },

    // ── TB natural history ─────────────────────────
    TbTransition {
        from: TbNaturalState,
        to:   TbNaturalState,
    },
    TbSymptomsChanged {
        symptomatic: bool,
    },

    // ── TB clinical management ─────────────────────
    TbDiagnosticPerformed {
        positive: bool,
    },
    TbTreatmentStarted {
        regimen: TbRegimen,
    },
    TbDstResolved {
        resistant: bool,
    },
    TbTreatmentCompleted {
        cured: bool,
    },
    TbEmpiricStarted,
    TbEmpiricStopped,
    TbProphylaxisStarted,
    TbProphylaxisStopped {
        completed: bool,
    },
    TbCareLost,

    // ── Mortality ──────────────────────────────────
    Died {
        cause: MortalityCause,
    },

    // ── Care engagement ────────────────────────────
    LostToFollowUp,
    ReturnedToCare {
        art_resumed: bool,
    },

    // ── CD4 testing ────────────────────────────────
    Cd4Tested {
        observed: f64,
        stratum:  Cd4Stratum,
        trigger:  Cd4TestTrigger,
    },

    // ── Care engagement (appended) ─────────────────
    ArtFailure {
        failure_count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cd4TestTrigger {
    Scheduled,
    ArtInitiation,
    RepeatFailure,
}
