use approx::assert_abs_diff_eq;
use hivsim_core::{
    config::SimConfig,
    engine::SimEngine,
    error::SimError,
    event::{PatientEvent, PatientEventKind},
    mortality_updater::CompetingRisks,
    patient::{DeathRecord, MortalityHazard, Patient, TbNaturalState},
    rng::{ScriptedDraws, StreamId},
    tables::{DemoTable, StatusTable},
    types::{Gender, MortalityCause, RiskFactor},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config_with_background(p: f64) -> SimConfig {
    let mut config = SimConfig::baseline(0);
    let n = config.simulation.age_categories.count();
    config.mortality.background_monthly_prob = DemoTable::uniform(p, n);
    config
}

fn hiv_patient() -> Patient {
    Patient::new(1, Gender::Male, 40 * 12, 0).with_hiv(600.0)
}

fn step(engine: &SimEngine, patient: &mut Patient, draws: &mut ScriptedDraws) -> Vec<PatientEvent> {
    let mut events = Vec::new();
    engine.step_month(patient, draws, &mut events).unwrap();
    events
}

fn died(events: &[PatientEvent]) -> Option<MortalityCause> {
    events.iter().find_map(|e| match e.kind {
        PatientEventKind::Died { cause } => Some(cause),
        _ => None,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A death ends the month: later updaters do not run and the patient
/// cannot be stepped again.
#[test]
fn death_stops_the_patient() {
    let mut config = config_with_background(0.5);
    config.care.ltfu_monthly_prob = 1.0;
    let engine = SimEngine::build(config);
    let mut patient = hiv_patient();
    let mut draws = ScriptedDraws::constant(0.1);

    let events = step(&engine, &mut patient, &mut draws);
    assert_eq!(died(&events), Some(MortalityCause::Background));
    assert_eq!(patient.general.death, Some(DeathRecord { month: 1, cause: MortalityCause::Background }));
    assert!(!events.iter().any(|e| e.kind == PatientEventKind::LostToFollowUp));
    assert_eq!(events.last().map(|e| e.updater), Some("mortality"));

    let err = engine.step_month(&mut patient, &mut draws, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, SimError::PatientNotAlive { patient: 1, month: 1 }));
}

/// The death draw picks the cause by its share of the total rate.
#[test]
fn draw_position_selects_cause() {
    let mut config = config_with_background(0.05);
    config.tb.death_rate_ratio_pulmonary = StatusTable::uniform(3.0);
    let engine = SimEngine::build(config);
    let risks = CompetingRisks::new(0.05, &[MortalityHazard {
        cause:      MortalityCause::Tuberculosis,
        rate_ratio: 3.0,
    }]);
    let p = risks.death_prob;

    for (u, expected) in [(p * 0.2, MortalityCause::Background), (p * 0.9, MortalityCause::Tuberculosis)] {
        let mut patient = hiv_patient();
        patient.disease.tb.natural = TbNaturalState::ActivePulmonary;
        let mut draws = ScriptedDraws::constant(0.99).with_stream(StreamId::Mortality, [u]);
        let events = step(&engine, &mut patient, &mut draws);
        assert_eq!(died(&events), Some(expected));
    }

    let mut survivor = hiv_patient();
    survivor.disease.tb.natural = TbNaturalState::ActivePulmonary;
    let mut draws = ScriptedDraws::constant(0.99).with_stream(StreamId::Mortality, [p]);
    assert_eq!(died(&step(&engine, &mut survivor, &mut draws)), None);
}

/// Registered hazards live for one month only, whatever the outcome.
#[test]
fn hazards_are_consumed_every_month() {
    let mut config = config_with_background(0.01);
    config.tb.death_rate_ratio_pulmonary = StatusTable::uniform(5.0);
    let engine = SimEngine::build(config);
    let mut patient = hiv_patient();
    patient.disease.tb.natural = TbNaturalState::ActivePulmonary;
    let mut draws = ScriptedDraws::constant(0.99);

    for _ in 0..3 {
        step(&engine, &mut patient, &mut draws);
        assert!(patient.accum.hazards.is_empty());
    }
    assert!(patient.is_alive());
}

/// One mortality draw per month even when the death probability is zero.
#[test]
fn mortality_draw_is_consumed_every_month() {
    let engine = SimEngine::build(config_with_background(0.0));
    let mut patient = hiv_patient();
    let mut draws = ScriptedDraws::constant(0.0);

    for _ in 0..5 {
        step(&engine, &mut patient, &mut draws);
    }
    assert!(patient.is_alive());
    assert_eq!(draws.count(StreamId::Mortality), 5);
}

/// HIV-stratum and risk-factor ratios compete with the other causes.
#[test]
fn background_cause_ratios_compete() {
    let mut config = config_with_background(0.02);
    config.mortality.hiv_death_rate_ratio = vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
    config.mortality.risk_factor_death_rate_ratio = vec![1.0, 1.0, 2.0, 1.0, 1.0];
    let engine = SimEngine::build(config);

    let mut patient = hiv_patient().with_hiv(120.0);
    patient.general.risk_factors[2] = true;
    let risks = CompetingRisks::new(0.02, &[
        MortalityHazard { cause: MortalityCause::HivRelated, rate_ratio: 4.0 },
        MortalityHazard { cause: MortalityCause::RiskFactor(RiskFactor::new(2)), rate_ratio: 2.0 },
    ]);
    let p = risks.death_prob;

    // Rates: background h0, HIV 3*h0, risk factor h0.
    let mut draws = ScriptedDraws::constant(0.99).with_stream(StreamId::Mortality, [p * 0.5]);
    assert_eq!(died(&step(&engine, &mut patient.clone(), &mut draws)), Some(MortalityCause::HivRelated));

    let mut draws = ScriptedDraws::constant(0.99).with_stream(StreamId::Mortality, [p * 0.95]);
    assert_eq!(
        died(&step(&engine, &mut patient, &mut draws)),
        Some(MortalityCause::RiskFactor(RiskFactor::new(2)))
    );
}

/// Over a uniform grid of death draws, each cause's share of deaths
/// matches its share of the total rate.
#[test]
fn cause_shares_match_rate_shares() {
    let risks = CompetingRisks::new(0.1, &[
        MortalityHazard { cause: MortalityCause::Tuberculosis, rate_ratio: 4.0 },
        MortalityHazard { cause: MortalityCause::HivRelated, rate_ratio: 2.0 },
    ]);
    const N: usize = 10_000;
    let mut tb = 0;
    let mut hiv = 0;
    let mut background = 0;
    for i in 0..N {
        let u = (i as f64 + 0.5) / N as f64 * risks.death_prob;
        match risks.select(u) {
            Some(MortalityCause::Tuberculosis) => tb += 1,
            Some(MortalityCause::HivRelated) => hiv += 1,
            Some(MortalityCause::Background) => background += 1,
            other => panic!("unexpected selection {other:?}"),
        }
    }
    assert_abs_diff_eq!(tb as f64 / N as f64, 0.6, epsilon = 1e-3);
    assert_abs_diff_eq!(hiv as f64 / N as f64, 0.2, epsilon = 1e-3);
    assert_abs_diff_eq!(background as f64 / N as f64, 0.2, epsilon = 1e-3);
}
