//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A simulated month index. Month 0 is the patient's creation month.
pub type Month = u32;

/// A stable patient identifier. Feeds the random stream derivation.
pub type PatientId = u64;

/// The canonical run identifier.
pub type RunId = String;

/// Number of generic risk factors tracked per patient.
pub const RISK_FACTOR_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HivStatus {
    Negative,
    Positive,
}

/// Discretized CD4 count bucket. Ordered from most to least immunosuppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cd4Stratum {
    Below50,
    From50To100,
    From100To200,
    From200To350,
    From350To500,
    Above500,
}

impl Cd4Stratum {
    pub const COUNT: usize = 6;

    pub const ALL: [Cd4Stratum; Self::COUNT] = [
        Self::Below50,
        Self::From50To100,
        Self::From100To200,
        Self::From200To350,
        Self::From350To500,
        Self::Above500,
    ];

    /// Bucket a CD4 count (cells/µL).
    pub fn from_cd4(cd4: f64) -> Self {
        match cd4 {
            c if c < 50.0  => Self::Below50,
            c if c < 100.0 => Self::From50To100,
            c if c < 200.0 => Self::From100To200,
            c if c < 350.0 => Self::From200To350,
            c if c < 500.0 => Self::From350To500,
            _              => Self::Above500,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Age bucket used as a table key. Only `AgeCategories` hands these out,
/// so an `AgeCategory` is always in range for a validated config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgeCategory(pub(crate) usize);

impl AgeCategory {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a configured comorbidity condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub usize);

impl ConditionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition#{}", self.0)
    }
}

/// Index of a generic risk factor, always `< RISK_FACTOR_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RiskFactor(usize);

impl RiskFactor {
    pub fn new(index: usize) -> Self {
        assert!(
            index < RISK_FACTOR_COUNT,
            "risk factor {index} out of range (count {RISK_FACTOR_COUNT})"
        );
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn all() -> impl Iterator<Item = RiskFactor> {
        (0..RISK_FACTOR_COUNT).map(RiskFactor)
    }
}

/// Category of a treatment regimen's effect. Each regimen carries one
/// response factor per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    Suppression,
    Comorbidity,
    TbActivation,
}

impl EffectCategory {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Where an accumulated cost is booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBucket {
    Comorbidity(ConditionId),
    TbTreatment,
    TbEmpiric,
    TbProphylaxis,
    TbDiagnostics,
    TbUntreated,
    Cd4Testing,
}

/// A cause of death. Variant order is the documented tie-break order for
/// competing mortality risks. NEVER reorder, only append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MortalityCause {
    Background,
    HivRelated,
    RiskFactor(RiskFactor),
    Comorbidity(ConditionId),
    Tuberculosis,
}

impl fmt::Display for MortalityCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background     => write!(f, "background"),
            Self::HivRelated     => write!(f, "hiv_related"),
            Self::RiskFactor(rf) => write!(f, "risk_factor_{}", rf.index()),
            Self::Comorbidity(c) => write!(f, "comorbidity_{}", c.index()),
            Self::Tuberculosis   => write!(f, "tuberculosis"),
        }
    }
}
