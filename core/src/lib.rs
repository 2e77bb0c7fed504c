//! Monthly per-patient disease-state engine for an HIV cohort
//! microsimulation: comorbidities, tuberculosis, mortality, care
//! engagement and CD4 testing.

pub mod behavior_updater;
pub mod cd4_test_updater;
pub mod cohort;
pub mod comorbidity_updater;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod mortality_updater;
pub mod patient;
pub mod prob;
pub mod rng;
pub mod tables;
pub mod tb_clinical_updater;
pub mod tb_natural_updater;
pub mod trace;
pub mod types;
pub mod updater;
