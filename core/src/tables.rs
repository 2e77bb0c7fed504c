//! Typed lookup tables and their composite keys.
//!
//! RULE: Tables are immutable once a config is validated.
//! Every accessor indexes with bounds checks; an out-of-range key is a
//! programming defect and panics rather than reading a neighbouring cell.

use crate::types::{AgeCategory, Cd4Stratum, Gender, HivStatus};
use serde::{Deserialize, Serialize};

/// Key for tables split by gender and age category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DemoKey {
    pub gender: Gender,
    pub age:    AgeCategory,
}

/// Key for tables split by CD4 stratum, gender and age category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrataKey {
    pub stratum: Cd4Stratum,
    pub gender:  Gender,
    pub age:     AgeCategory,
}

impl StrataKey {
    pub fn demo(&self) -> DemoKey {
        DemoKey { gender: self.gender, age: self.age }
    }
}

/// Values keyed by [gender][age category].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoTable {
    pub male:   Vec<f64>,
    pub female: Vec<f64>,
}

impl DemoTable {
    pub fn uniform(value: f64, age_categories: usize) -> Self {
        Self {
            male:   vec![value; age_categories],
            female: vec![value; age_categories],
        }
    }

    pub fn get(&self, key: DemoKey) -> f64 {
        self.row(key.gender)[key.age.index()]
    }

    fn row(&self, gender: Gender) -> &[f64] {
        match gender {
            Gender::Male   => &self.male,
            Gender::Female => &self.female,
        }
    }

    pub(crate) fn check_shape(&self, age_categories: usize, what: &str) -> Result<(), String> {
        for (label, row) in [("male", &self.male), ("female", &self.female)] {
            if row.len() != age_categories {
                return Err(format!(
                    "{what}: {label} row has {} age categories, expected {age_categories}",
                    row.len()
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.male.iter().chain(self.female.iter()).copied()
    }
}

/// Values keyed by [CD4 stratum][gender][age category].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratifiedDemoTable {
    pub strata: Vec<DemoTable>,
}

impl StratifiedDemoTable {
    pub fn uniform(value: f64, age_categories: usize) -> Self {
        Self {
            strata: vec![DemoTable::uniform(value, age_categories); Cd4Stratum::COUNT],
        }
    }

    pub fn get(&self, key: StrataKey) -> f64 {
        self.strata[key.stratum.index()].get(key.demo())
    }

    pub(crate) fn check_shape(&self, age_categories: usize, what: &str) -> Result<(), String> {
        if self.strata.len() != Cd4Stratum::COUNT {
            return Err(format!(
                "{what}: {} strata, expected {}",
                self.strata.len(),
                Cd4Stratum::COUNT
            ));
        }
        self.strata
            .iter()
            .try_for_each(|t| t.check_shape(age_categories, what))
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.strata.iter().flat_map(DemoTable::values)
    }
}

/// A value for HIV-negative patients plus one per CD4 stratum for
/// HIV-positive patients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTable {
    pub hiv_negative: f64,
    pub by_stratum:   Vec<f64>,
}

impl StatusTable {
    pub fn uniform(value: f64) -> Self {
        Self {
            hiv_negative: value,
            by_stratum:   vec![value; Cd4Stratum::COUNT],
        }
    }

    pub fn get(&self, hiv: HivStatus, stratum: Cd4Stratum) -> f64 {
        match hiv {
            HivStatus::Negative => self.hiv_negative,
            HivStatus::Positive => self.by_stratum[stratum.index()],
        }
    }

    pub(crate) fn check_shape(&self, what: &str) -> Result<(), String> {
        if self.by_stratum.len() != Cd4Stratum::COUNT {
            return Err(format!(
                "{what}: {} strata, expected {}",
                self.by_stratum.len(),
                Cd4Stratum::COUNT
            ));
        }
        Ok(())
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.hiv_negative).chain(self.by_stratum.iter().copied())
    }
}

/// Upper age bounds (in whole years, exclusive) of every age category but
/// the last, which is open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeCategories {
    pub bounds_years: Vec<u32>,
}

impl AgeCategories {
    pub fn count(&self) -> usize {
        self.bounds_years.len() + 1
    }

    pub fn categorize(&self, age_months: u32) -> AgeCategory {
        let years = age_months / 12;
        let idx = self
            .bounds_years
            .iter()
            .position(|&upper| years < upper)
            .unwrap_or(self.bounds_years.len());
        AgeCategory(idx)
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        if self.bounds_years.windows(2).any(|w| w[0] >= w[1]) {
            return Err("age category bounds must be strictly increasing".into());
        }
        Ok(())
    }
}

impl Default for AgeCategories {
    fn default() -> Self {
        Self { bounds_years: vec![20, 30, 40, 50, 60, 70] }
    }
}
