//! The per-patient aggregate every updater reads and mutates.

use crate::types::{
    Cd4Stratum, ConditionId, CostBucket, EffectCategory, Gender, HivStatus, Month,
    MortalityCause, PatientId, RiskFactor, RISK_FACTOR_COUNT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id:        PatientId,
    pub general:   GeneralState,
    pub disease:   DiseaseState,
    pub treatment: TreatmentState,
    pub accum:     Accumulators,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralState {
    pub gender:       Gender,
    pub age_months:   u32,
    /// Current simulated month index.
    pub month:        Month,
    pub risk_factors: [bool; RISK_FACTOR_COUNT],
    /// Per-patient narrative tracing.
    pub tracing:      bool,
    pub death:        Option<DeathRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub month: Month,
    pub cause: MortalityCause,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionState {
    pub present:     bool,
    /// Month each stage started; `None` until the condition begins.
    pub stage_start: Vec<Option<Month>>,
}

impl ConditionState {
    pub fn onset_month(&self) -> Option<Month> {
        self.stage_start.first().copied().flatten()
    }

    /// Latest stage whose start month is at or before `month`.
    pub fn active_stage(&self, month: Month) -> Option<usize> {
        self.stage_start
            .iter()
            .rposition(|start| matches!(start, Some(s) if *s <= month))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TbNaturalState {
    Uninfected,
    Latent,
    ActivePulmonary,
    ActiveExtrapulmonary,
    PreviouslyTreated,
    Defaulted,
}

impl TbNaturalState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::ActivePulmonary | Self::ActiveExtrapulmonary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TbState {
    pub natural:           TbNaturalState,
    pub symptomatic:       bool,
    pub infection_month:   Option<Month>,
    /// Site of the most recent active episode; relapse returns to it.
    pub last_active:       Option<TbNaturalState>,
    pub activation_month:  Option<Month>,
}

impl Default for TbState {
    fn default() -> Self {
        Self {
            natural:          TbNaturalState::Uninfected,
            symptomatic:      false,
            infection_month:  None,
            last_active:      None,
            activation_month: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseState {
    pub hiv:                 HivStatus,
    pub stratum:             Cd4Stratum,
    pub true_cd4:            f64,
    pub observed_cd4:        Option<f64>,
    pub last_cd4_test_month: Option<Month>,
    pub conditions:          Vec<ConditionState>,
    pub tb:                  TbState,
}

impl DiseaseState {
    pub fn condition(&self, id: ConditionId) -> &ConditionState {
        &self.conditions[id.index()]
    }

    pub fn has_condition(&self, id: ConditionId) -> bool {
        self.condition(id).present
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.iter().filter(|c| c.present).count()
    }

    /// Most recent onset month among present conditions.
    pub fn latest_onset(&self) -> Option<Month> {
        self.conditions
            .iter()
            .filter(|c| c.present)
            .filter_map(ConditionState::onset_month)
            .max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareState {
    InCare,
    LostToFollowUp { since: Month },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TbRegimen {
    FirstLine,
    SecondLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TbTherapy {
    None,
    Treatment { regimen: TbRegimen, start: Month },
    Empiric { start: Month },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDst {
    pub result_month: Month,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TbCareState {
    pub therapy:               TbTherapy,
    pub pending_dst:           Option<PendingDst>,
    pub last_diagnostic_month: Option<Month>,
    pub prophylaxis_start:     Option<Month>,
    pub prophylaxis_completed: bool,
    pub treatment_episodes:    u32,
    /// Month treatment or empiric therapy last ended. No therapy starts in
    /// the month one ended.
    pub therapy_end_month:     Option<Month>,
}

impl Default for TbCareState {
    fn default() -> Self {
        Self {
            therapy:               TbTherapy::None,
            pending_dst:           None,
            last_diagnostic_month: None,
            prophylaxis_start:     None,
            prophylaxis_completed: false,
            treatment_episodes:    0,
            therapy_end_month:     None,
        }
    }
}

impl TbCareState {
    pub fn on_treatment(&self) -> bool {
        matches!(self.therapy, TbTherapy::Treatment { .. })
    }

    pub fn on_prophylaxis(&self) -> bool {
        self.prophylaxis_start.is_some()
    }

    /// Leave any current therapy at `month`.
    pub fn end_therapy(&mut self, month: Month) {
        if self.therapy != TbTherapy::None {
            self.therapy = TbTherapy::None;
            self.therapy_end_month = Some(month);
        }
    }

    pub fn therapy_ended_in(&self, month: Month) -> bool {
        self.therapy_end_month == Some(month)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentState {
    pub on_art:           bool,
    pub art_start_month:  Option<Month>,
    /// Response factor per `EffectCategory` for the current regimen.
    pub response_factors: [f64; EffectCategory::COUNT],
    pub failure_count:    u32,
    /// Whether the current failure count has already been confirmed by a CD4 test.
    pub failure_tested:   bool,
    pub care:             CareState,
    pub tb_care:          TbCareState,
}

impl TreatmentState {
    pub fn response_factor(&self, category: EffectCategory) -> f64 {
        self.response_factors[category.index()]
    }

    pub fn in_care(&self) -> bool {
        self.care == CareState::InCare
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MortalityHazard {
    pub cause:      MortalityCause,
    pub rate_ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulators {
    /// Serialized as `(bucket, amount)` pairs; buckets are not string keys.
    #[serde(with = "cost_pairs")]
    pub costs:        BTreeMap<CostBucket, f64>,
    pub qol_modifier: f64,
    /// Hazards registered this month; consumed by the mortality updater.
    pub hazards:      Vec<MortalityHazard>,
}

mod cost_pairs {
    use crate::types::CostBucket;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(costs: &BTreeMap<CostBucket, f64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(costs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<CostBucket, f64>, D::Error> {
        let pairs = Vec::<(CostBucket, f64)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl Accumulators {
    pub fn cost(&self, bucket: CostBucket) -> f64 {
        self.costs.get(&bucket).copied().unwrap_or(0.0)
    }

    pub fn total_cost(&self) -> f64 {
        self.costs.values().sum()
    }
}

impl Patient {
    /// A living, HIV-negative patient in care with no conditions.
    pub fn new(id: PatientId, gender: Gender, age_months: u32, condition_count: usize) -> Self {
        Self {
            id,
            general: GeneralState {
                gender,
                age_months,
                month:        0,
                risk_factors: [false; RISK_FACTOR_COUNT],
                tracing:      false,
                death:        None,
            },
            disease: DiseaseState {
                hiv:                 HivStatus::Negative,
                stratum:             Cd4Stratum::Above500,
                true_cd4:            800.0,
                observed_cd4:        None,
                last_cd4_test_month: None,
                conditions:          vec![ConditionState::default(); condition_count],
                tb:                  TbState::default(),
            },
            treatment: TreatmentState {
                on_art:           false,
                art_start_month:  None,
                response_factors: [1.0; EffectCategory::COUNT],
                failure_count:    0,
                failure_tested:   false,
                care:             CareState::InCare,
                tb_care:          TbCareState::default(),
            },
            accum: Accumulators::default(),
        }
    }

    pub fn with_hiv(mut self, cd4: f64) -> Self {
        self.disease.hiv = HivStatus::Positive;
        self.disease.true_cd4 = cd4;
        self.disease.stratum = Cd4Stratum::from_cd4(cd4);
        self
    }

    pub fn with_tracing(mut self, tracing: bool) -> Self {
        self.general.tracing = tracing;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.general.death.is_none()
    }

    pub fn month(&self) -> Month {
        self.general.month
    }

    pub fn has_risk_factor(&self, rf: RiskFactor) -> bool {
        self.general.risk_factors[rf.index()]
    }

    pub fn active_risk_factors(&self) -> impl Iterator<Item = RiskFactor> + '_ {
        RiskFactor::all().filter(|rf| self.has_risk_factor(*rf))
    }

    /// Whether an ART treatment effect currently applies.
    pub fn art_effect_applies(&self) -> bool {
        self.disease.hiv == HivStatus::Positive && self.treatment.on_art
    }

    /// Start ART this month with the given regimen response factors.
    pub fn start_art(&mut self, response_factors: [f64; EffectCategory::COUNT]) {
        self.treatment.on_art = true;
        self.treatment.art_start_month = Some(self.general.month);
        self.treatment.response_factors = response_factors;
    }

    /// Record a virologic treatment failure on the current regimen. Driven
    /// by the behavior updater; hosts modelling ART elsewhere call it directly.
    pub fn record_treatment_failure(&mut self) {
        self.treatment.failure_count += 1;
        self.treatment.failure_tested = false;
    }

    /// Move to the next month. Called by the driver before the updaters run.
    pub fn advance_month(&mut self) {
        self.general.month += 1;
        self.general.age_months += 1;
    }
}
