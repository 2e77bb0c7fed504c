//! Static input tables and policy settings for a run.
//!
//! RULE: A `SimConfig` is loaded and validated once, then shared read-only
//! (behind an `Arc`) by every updater. Nothing mutates it mid-run.

use crate::{
    error::{SimError, SimResult},
    tables::{AgeCategories, DemoTable, StatusTable, StratifiedDemoTable},
    types::{AgeCategory, Cd4Stratum, ConditionId, EffectCategory, Month, RISK_FACTOR_COUNT},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub simulation:  SimulationConfig,
    pub cohort:      CohortConfig,
    pub comorbidity: ComorbidityConfig,
    pub tb:          TbConfig,
    pub tb_clinical: TbClinicalConfig,
    pub mortality:   MortalityConfig,
    pub care:        CareConfig,
    pub cd4_test:    Cd4TestConfig,
}

// ── Simulation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Months simulated per patient when the patient survives.
    pub horizon_months: Month,
    pub age_categories: AgeCategories,
}

// ── Cohort ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    pub male_fraction:          f64,
    pub age_mean_months:        f64,
    pub age_sd_months:          f64,
    pub min_age_months:         u32,
    pub hiv_positive_fraction:  f64,
    pub cd4_mean:               f64,
    pub cd4_sd:                 f64,
    /// Fraction of HIV-positive patients already on ART at creation.
    pub on_art_fraction:        f64,
    /// Response factor per `EffectCategory` for the initial regimen.
    pub art_response_factors:   Vec<f64>,
    pub risk_factor_prevalence: Vec<f64>,
    pub latent_tb_fraction:     f64,
}

// ── Comorbidities ──────────────────────────────────────────────────

/// How comorbidity onsets are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OnsetMode {
    /// Each condition is an independent trial every month.
    Independent,
    /// Conditions form a strict prerequisite chain. Prevalent onsets come
    /// from an age-indexed table, and the monthly scan waits
    /// `min_months_between` after the latest onset.
    Dependent { min_months_between: Month },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QolMode {
    /// Stage QOL modifiers are summed.
    Additive,
    /// Stage modifiers are summed and a multi-condition penalty indexed by
    /// `condition_count - 2` is added on top.
    Marginal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Months after onset at which this stage begins. Stage 0 is always 0.
    pub start_offset_months: Month,
    pub cost:                DemoTable,
    pub qol:                 DemoTable,
    pub death_rate_ratio:    DemoTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub name:                    String,
    pub prevalence_hiv_negative: DemoTable,
    pub prevalence_hiv_positive: StratifiedDemoTable,
    pub incidence_hiv_negative:  DemoTable,
    pub incidence_hiv_positive:  StratifiedDemoTable,
    /// Months since onset for prevalent cases, sampled from N(mean, sd).
    pub onset_months_mean:       f64,
    pub onset_months_sd:         f64,
    /// Months since onset for prevalent cases under dependent onset,
    /// indexed by age in whole years (the last entry covers older ages).
    #[serde(default)]
    pub dependent_onset_months_by_age: Vec<Month>,
    /// Logit delta per risk factor.
    pub risk_factor_logit:       Vec<f64>,
    /// On-ART incidence multiplier per CD4 stratum.
    pub art_multiplier:          Vec<f64>,
    /// Logit delta per other condition already present.
    pub history_logit:           Vec<f64>,
    pub stages:                  Vec<StageSpec>,
}

impl ConditionSpec {
    pub fn stage(&self, stage: usize) -> &StageSpec {
        &self.stages[stage]
    }

    pub fn history_delta(&self, other: ConditionId) -> f64 {
        self.history_logit[other.index()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComorbidityConfig {
    pub conditions:            Vec<ConditionSpec>,
    pub onset_mode:            OnsetMode,
    pub qol_mode:              QolMode,
    #[serde(default)]
    pub marginal_qol_penalty:  Vec<f64>,
    /// Monthly incidence per risk factor.
    pub risk_factor_incidence: Vec<f64>,
}

impl ComorbidityConfig {
    pub fn condition(&self, id: ConditionId) -> &ConditionSpec {
        &self.conditions[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = ConditionId> {
        (0..self.conditions.len()).map(ConditionId)
    }
}

// ── TB natural history ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TbConfig {
    /// Monthly probability of new infection.
    pub infection_prob:          DemoTable,
    /// Logit delta on infection for latent or previously active patients.
    pub reinfection_logit:       f64,
    pub activation_prob:         StatusTable,
    pub recent_infection_months: Month,
    pub recent_infection_logit:  f64,
    pub prior_active_logit:      f64,
    pub prophylaxis_logit:       f64,
    /// On-ART activation multiplier per CD4 stratum.
    pub art_activation_multiplier: Vec<f64>,
    pub pulmonary_fraction:      f64,
    pub self_cure_pulmonary:     f64,
    pub self_cure_extrapulmonary: f64,
    pub symptom_onset_active:    f64,
    pub symptom_onset_inactive:  f64,
    pub symptom_clearance:       f64,
    pub relapse_prob:            StatusTable,
    pub defaulted_relapse_logit: f64,
    pub death_rate_ratio_pulmonary:      StatusTable,
    pub death_rate_ratio_extrapulmonary: StatusTable,
}

// ── TB clinical management ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TbRegimenConfig {
    pub duration_months: Month,
    pub monthly_cost:    f64,
    pub cure_prob:       f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TbClinicalConfig {
    /// Whether TB care shares the general HIV clinic. When false, TB
    /// treatment has its own loss-to-follow-up risk.
    pub integrated_with_hiv_care: bool,
    pub diagnostic_sensitivity:   f64,
    pub diagnostic_specificity:   f64,
    pub diagnostic_cost:          f64,
    pub min_months_between_tests: Month,
    pub dst_delay_months:         Month,
    pub dst_resistance_prob:      f64,
    pub first_line:               TbRegimenConfig,
    pub second_line:              TbRegimenConfig,
    pub empiric_on_negative_test: bool,
    /// Months of empiric therapy before it stops; it ends in the first
    /// month the elapsed time exceeds this value.
    pub empiric_max_months:       Month,
    pub empiric_monthly_cost:     f64,
    pub prophylaxis_enabled:      bool,
    /// Patients at or below this stratum are eligible for prophylaxis.
    pub prophylaxis_max_stratum:  Cd4Stratum,
    pub prophylaxis_requires_art: bool,
    pub prophylaxis_duration_months: Month,
    pub prophylaxis_monthly_cost: f64,
    pub tb_ltfu_prob:             f64,
    pub untreated_monthly_cost:   f64,
}

// ── Mortality ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityConfig {
    pub background_monthly_prob:     DemoTable,
    /// Background-cause rate ratio for HIV-positive patients per stratum.
    pub hiv_death_rate_ratio:        Vec<f64>,
    pub risk_factor_death_rate_ratio: Vec<f64>,
}

// ── Care engagement ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareConfig {
    pub ltfu_monthly_prob:      f64,
    pub ltfu_risk_factor_logit: Vec<f64>,
    /// Monthly return probability per CD4 stratum.
    pub return_monthly_prob:    Vec<f64>,
    /// Monthly probability that an in-care patient on ART fails the regimen.
    #[serde(default)]
    pub art_failure_monthly_prob: f64,
}

// ── CD4 testing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cd4TestConfig {
    pub interval_months:          Month,
    pub measurement_sd:           f64,
    pub cost:                     f64,
    pub test_at_art_start:        bool,
    /// Failure count that triggers a confirmatory test.
    pub repeat_failure_threshold: u32,
}

// ── Loading ────────────────────────────────────────────────────────

fn read_section<T: DeserializeOwned>(data_dir: &str, file: &str) -> anyhow::Result<T> {
    let path = format!("{data_dir}/{file}");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

impl SimConfig {
    /// Load every section from `data_dir`, one JSON file per section.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let config = Self {
            simulation:  read_section(data_dir, "simulation.json")?,
            cohort:      read_section(data_dir, "cohort.json")?,
            comorbidity: read_section(data_dir, "comorbidity.json")?,
            tb:          read_section(data_dir, "tb.json")?,
            tb_clinical: read_section(data_dir, "tb_clinical.json")?,
            mortality:   read_section(data_dir, "mortality.json")?,
            care:        read_section(data_dir, "care.json")?,
            cd4_test:    read_section(data_dir, "cd4_test.json")?,
        };
        config.validate()?;
        log::info!(
            "Loaded config from {data_dir}: {} conditions, horizon {} months",
            config.comorbidity.conditions.len(),
            config.simulation.horizon_months
        );
        Ok(config)
    }

    /// Parse a whole config from one JSON document.
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn age_category(&self, age_months: u32) -> AgeCategory {
        self.simulation.age_categories.categorize(age_months)
    }

    /// A valid configuration in which nothing ever happens: every
    /// probability is zero, every ratio is 1 and every cost is zero.
    /// Callers switch on the behaviour they need.
    pub fn baseline(condition_count: usize) -> Self {
        let ages = AgeCategories::default();
        let n_ages = ages.count();
        let zero = DemoTable::uniform(0.0, n_ages);
        let one = DemoTable::uniform(1.0, n_ages);
        let stage = StageSpec {
            start_offset_months: 0,
            cost:                zero.clone(),
            qol:                 zero.clone(),
            death_rate_ratio:    one,
        };
        let condition = |i: usize| ConditionSpec {
            name:                    format!("condition_{i}"),
            prevalence_hiv_negative: zero.clone(),
            prevalence_hiv_positive: StratifiedDemoTable::uniform(0.0, n_ages),
            incidence_hiv_negative:  zero.clone(),
            incidence_hiv_positive:  StratifiedDemoTable::uniform(0.0, n_ages),
            onset_months_mean:       0.0,
            onset_months_sd:         0.0,
            dependent_onset_months_by_age: vec![0],
            risk_factor_logit:       vec![0.0; RISK_FACTOR_COUNT],
            art_multiplier:          vec![1.0; Cd4Stratum::COUNT],
            history_logit:          vec![0.0; condition_count],
            stages:                  vec![stage.clone()],
        };
        let regimen = TbRegimenConfig {
            duration_months: 6,
            monthly_cost:    0.0,
            cure_prob:       0.0,
        };

        Self {
            simulation: SimulationConfig {
                horizon_months: 120,
                age_categories: ages,
            },
            cohort: CohortConfig {
                male_fraction:          0.5,
                age_mean_months:        35.0 * 12.0,
                age_sd_months:          0.0,
                min_age_months:         18 * 12,
                hiv_positive_fraction:  1.0,
                cd4_mean:               400.0,
                cd4_sd:                 0.0,
                on_art_fraction:        0.0,
                art_response_factors:   vec![1.0; EffectCategory::COUNT],
                risk_factor_prevalence: vec![0.0; RISK_FACTOR_COUNT],
                latent_tb_fraction:     0.0,
            },
            comorbidity: ComorbidityConfig {
                conditions:            (0..condition_count).map(condition).collect(),
                onset_mode:            OnsetMode::Independent,
                qol_mode:              QolMode::Additive,
                marginal_qol_penalty:  vec![0.0; condition_count.saturating_sub(1)],
                risk_factor_incidence: vec![0.0; RISK_FACTOR_COUNT],
            },
            tb: TbConfig {
                infection_prob:          zero.clone(),
                reinfection_logit:       0.0,
                activation_prob:         StatusTable::uniform(0.0),
                recent_infection_months: 24,
                recent_infection_logit:  0.0,
                prior_active_logit:      0.0,
                prophylaxis_logit:       0.0,
                art_activation_multiplier: vec![1.0; Cd4Stratum::COUNT],
                pulmonary_fraction:      1.0,
                self_cure_pulmonary:     0.0,
                self_cure_extrapulmonary: 0.0,
                symptom_onset_active:    0.0,
                symptom_onset_inactive:  0.0,
                symptom_clearance:       0.0,
                relapse_prob:            StatusTable::uniform(0.0),
                defaulted_relapse_logit: 0.0,
                death_rate_ratio_pulmonary:      StatusTable::uniform(1.0),
                death_rate_ratio_extrapulmonary: StatusTable::uniform(1.0),
            },
            tb_clinical: TbClinicalConfig {
                integrated_with_hiv_care: true,
                diagnostic_sensitivity:   0.0,
                diagnostic_specificity:   1.0,
                diagnostic_cost:          0.0,
                min_months_between_tests: 0,
                dst_delay_months:         0,
                dst_resistance_prob:      0.0,
                first_line:               regimen.clone(),
                second_line:              regimen,
                empiric_on_negative_test: false,
                empiric_max_months:       0,
                empiric_monthly_cost:     0.0,
                prophylaxis_enabled:      false,
                prophylaxis_max_stratum:  Cd4Stratum::From100To200,
                prophylaxis_requires_art: false,
                prophylaxis_duration_months: 6,
                prophylaxis_monthly_cost: 0.0,
                tb_ltfu_prob:             0.0,
                untreated_monthly_cost:   0.0,
            },
            mortality: MortalityConfig {
                background_monthly_prob:      zero,
                hiv_death_rate_ratio:         vec![1.0; Cd4Stratum::COUNT],
                risk_factor_death_rate_ratio: vec![1.0; RISK_FACTOR_COUNT],
            },
            care: CareConfig {
                ltfu_monthly_prob:      0.0,
                ltfu_risk_factor_logit: vec![0.0; RISK_FACTOR_COUNT],
                return_monthly_prob:    vec![0.0; Cd4Stratum::COUNT],
                art_failure_monthly_prob: 0.0,
            },
            cd4_test: Cd4TestConfig {
                interval_months:          0,
                measurement_sd:           0.0,
                cost:                     0.0,
                test_at_art_start:        false,
                repeat_failure_threshold: 0,
            },
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        self.validate_tables().map_err(SimError::InvalidConfig)
    }

    fn validate_tables(&self) -> Result<(), String> {
        self.simulation.age_categories.check()?;
        let n_ages = self.simulation.age_categories.count();

        let cohort = &self.cohort;
        check_probs("cohort", [
            cohort.male_fraction,
            cohort.hiv_positive_fraction,
            cohort.on_art_fraction,
            cohort.latent_tb_fraction,
        ])?;
        check_len("cohort.art_response_factors", &cohort.art_response_factors, EffectCategory::COUNT)?;
        check_len("cohort.risk_factor_prevalence", &cohort.risk_factor_prevalence, RISK_FACTOR_COUNT)?;
        check_probs("cohort.risk_factor_prevalence", cohort.risk_factor_prevalence.iter().copied())?;
        check_sd("cohort.age_sd_months", cohort.age_sd_months)?;
        check_sd("cohort.cd4_sd", cohort.cd4_sd)?;

        self.validate_comorbidity(n_ages)?;
        self.validate_tb(n_ages)?;

        let mortality = &self.mortality;
        mortality.background_monthly_prob.check_shape(n_ages, "mortality.background_monthly_prob")?;
        check_probs("mortality.background_monthly_prob", mortality.background_monthly_prob.values())?;
        if mortality.background_monthly_prob.values().any(|p| p >= 1.0) {
            return Err("mortality.background_monthly_prob must be below 1".into());
        }
        check_len("mortality.hiv_death_rate_ratio", &mortality.hiv_death_rate_ratio, Cd4Stratum::COUNT)?;
        check_len(
            "mortality.risk_factor_death_rate_ratio",
            &mortality.risk_factor_death_rate_ratio,
            RISK_FACTOR_COUNT,
        )?;
        check_ratios("mortality.hiv_death_rate_ratio", mortality.hiv_death_rate_ratio.iter().copied())?;
        check_ratios(
            "mortality.risk_factor_death_rate_ratio",
            mortality.risk_factor_death_rate_ratio.iter().copied(),
        )?;

        let care = &self.care;
        check_probs("care.ltfu_monthly_prob", [care.ltfu_monthly_prob])?;
        check_len("care.ltfu_risk_factor_logit", &care.ltfu_risk_factor_logit, RISK_FACTOR_COUNT)?;
        check_finite("care.ltfu_risk_factor_logit", care.ltfu_risk_factor_logit.iter().copied())?;
        check_len("care.return_monthly_prob", &care.return_monthly_prob, Cd4Stratum::COUNT)?;
        check_probs("care.return_monthly_prob", care.return_monthly_prob.iter().copied())?;
        check_probs("care.art_failure_monthly_prob", [care.art_failure_monthly_prob])?;

        check_sd("cd4_test.measurement_sd", self.cd4_test.measurement_sd)?;
        Ok(())
    }

    fn validate_comorbidity(&self, n_ages: usize) -> Result<(), String> {
        let cfg = &self.comorbidity;
        let n = cfg.conditions.len();
        check_len("comorbidity.risk_factor_incidence", &cfg.risk_factor_incidence, RISK_FACTOR_COUNT)?;
        check_probs("comorbidity.risk_factor_incidence", cfg.risk_factor_incidence.iter().copied())?;
        if cfg.qol_mode == QolMode::Marginal && cfg.marginal_qol_penalty.len() + 1 < n {
            return Err(format!(
                "comorbidity.marginal_qol_penalty needs {} entries for {n} conditions",
                n.saturating_sub(1)
            ));
        }

        for (i, c) in cfg.conditions.iter().enumerate() {
            let what = |field: &str| format!("comorbidity.conditions[{i}].{field}");
            c.prevalence_hiv_negative.check_shape(n_ages, &what("prevalence_hiv_negative"))?;
            c.prevalence_hiv_positive.check_shape(n_ages, &what("prevalence_hiv_positive"))?;
            c.incidence_hiv_negative.check_shape(n_ages, &what("incidence_hiv_negative"))?;
            c.incidence_hiv_positive.check_shape(n_ages, &what("incidence_hiv_positive"))?;
            check_probs(&what("prevalence_hiv_negative"), c.prevalence_hiv_negative.values())?;
            check_probs(&what("prevalence_hiv_positive"), c.prevalence_hiv_positive.values())?;
            check_probs(&what("incidence_hiv_negative"), c.incidence_hiv_negative.values())?;
            check_probs(&what("incidence_hiv_positive"), c.incidence_hiv_positive.values())?;
            check_sd(&what("onset_months_sd"), c.onset_months_sd)?;
            check_len(&what("risk_factor_logit"), &c.risk_factor_logit, RISK_FACTOR_COUNT)?;
            check_finite(&what("risk_factor_logit"), c.risk_factor_logit.iter().copied())?;
            check_len(&what("art_multiplier"), &c.art_multiplier, Cd4Stratum::COUNT)?;
            check_ratios(&what("art_multiplier"), c.art_multiplier.iter().copied())?;
            check_len(&what("history_logit"), &c.history_logit, n)?;
            check_finite(&what("history_logit"), c.history_logit.iter().copied())?;
            if matches!(cfg.onset_mode, OnsetMode::Dependent { .. })
                && c.dependent_onset_months_by_age.is_empty()
            {
                return Err(what("dependent_onset_months_by_age must not be empty"));
            }

            if c.stages.is_empty() {
                return Err(what("stages must not be empty"));
            }
            if c.stages[0].start_offset_months != 0 {
                return Err(what("stages[0].start_offset_months must be 0"));
            }
            if c.stages.windows(2).any(|w| w[0].start_offset_months > w[1].start_offset_months) {
                return Err(what("stage offsets must be non-decreasing"));
            }
            for (s, stage) in c.stages.iter().enumerate() {
                stage.cost.check_shape(n_ages, &what(&format!("stages[{s}].cost")))?;
                stage.qol.check_shape(n_ages, &what(&format!("stages[{s}].qol")))?;
                stage
                    .death_rate_ratio
                    .check_shape(n_ages, &what(&format!("stages[{s}].death_rate_ratio")))?;
                check_ratios(&what(&format!("stages[{s}].death_rate_ratio")), stage.death_rate_ratio.values())?;
            }
        }
        Ok(())
    }

    fn validate_tb(&self, n_ages: usize) -> Result<(), String> {
        let tb = &self.tb;
        tb.infection_prob.check_shape(n_ages, "tb.infection_prob")?;
        check_probs("tb.infection_prob", tb.infection_prob.values())?;
        for (what, table) in [
            ("tb.activation_prob", &tb.activation_prob),
            ("tb.relapse_prob", &tb.relapse_prob),
        ] {
            table.check_shape(what)?;
            check_probs(what, table.values())?;
        }
        for (what, table) in [
            ("tb.death_rate_ratio_pulmonary", &tb.death_rate_ratio_pulmonary),
            ("tb.death_rate_ratio_extrapulmonary", &tb.death_rate_ratio_extrapulmonary),
        ] {
            table.check_shape(what)?;
            check_ratios(what, table.values())?;
        }
        check_len("tb.art_activation_multiplier", &tb.art_activation_multiplier, Cd4Stratum::COUNT)?;
        check_ratios("tb.art_activation_multiplier", tb.art_activation_multiplier.iter().copied())?;
        check_probs("tb", [
            tb.pulmonary_fraction,
            tb.self_cure_pulmonary,
            tb.self_cure_extrapulmonary,
            tb.symptom_onset_active,
            tb.symptom_onset_inactive,
            tb.symptom_clearance,
        ])?;
        check_finite("tb logit deltas", [
            tb.reinfection_logit,
            tb.recent_infection_logit,
            tb.prior_active_logit,
            tb.prophylaxis_logit,
            tb.defaulted_relapse_logit,
        ])?;

        let clinical = &self.tb_clinical;
        check_probs("tb_clinical", [
            clinical.diagnostic_sensitivity,
            clinical.diagnostic_specificity,
            clinical.dst_resistance_prob,
            clinical.first_line.cure_prob,
            clinical.second_line.cure_prob,
            clinical.tb_ltfu_prob,
        ])?;
        Ok(())
    }
}

fn check_len<T>(what: &str, values: &[T], expected: usize) -> Result<(), String> {
    if values.len() != expected {
        return Err(format!("{what}: {} entries, expected {expected}", values.len()));
    }
    Ok(())
}

fn check_probs<I: IntoIterator<Item = f64>>(what: &str, values: I) -> Result<(), String> {
    match values.into_iter().find(|p| !(0.0..=1.0).contains(p)) {
        Some(p) => Err(format!("{what}: probability {p} outside [0, 1]")),
        None => Ok(()),
    }
}

fn check_ratios<I: IntoIterator<Item = f64>>(what: &str, values: I) -> Result<(), String> {
    match values.into_iter().find(|r| !(r.is_finite() && *r >= 0.0)) {
        Some(r) => Err(format!("{what}: ratio {r} must be finite and non-negative")),
        None => Ok(()),
    }
}

fn check_finite<I: IntoIterator<Item = f64>>(what: &str, values: I) -> Result<(), String> {
    match values.into_iter().find(|v| !v.is_finite()) {
        Some(v) => Err(format!("{what}: {v} is not finite")),
        None => Ok(()),
    }
}

fn check_sd(what: &str, sd: f64) -> Result<(), String> {
    if !(sd.is_finite() && sd >= 0.0) {
        return Err(format!("{what}: standard deviation {sd} must be finite and non-negative"));
    }
    Ok(())
}
