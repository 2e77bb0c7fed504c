use approx::assert_abs_diff_eq;
use hivsim_core::{
    config::SimConfig,
    engine::SimEngine,
    event::{PatientEvent, PatientEventKind},
    patient::{Patient, PendingDst, TbNaturalState, TbRegimen, TbTherapy},
    prob::LogOdds,
    rng::{ScriptedDraws, StreamId},
    tables::{DemoTable, StatusTable},
    tb_natural_updater::TbNaturalUpdater,
    types::{Cd4Stratum, CostBucket, Gender, MortalityCause},
    updater::{PatientUpdater, UpdateContext},
};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn hiv_patient(tb: TbNaturalState) -> Patient {
    let mut patient = Patient::new(1, Gender::Female, 30 * 12, 0).with_hiv(300.0);
    patient.disease.tb.natural = tb;
    patient
}

fn natural_month(updater: &TbNaturalUpdater, patient: &mut Patient, draws: &mut ScriptedDraws) -> Vec<PatientEvent> {
    patient.advance_month();
    let mut events = Vec::new();
    let mut ctx = UpdateContext::new(patient, draws, updater.name(), &mut events);
    updater.monthly_update(&mut ctx);
    events
}

fn run_months(engine: &SimEngine, patient: &mut Patient, draws: &mut ScriptedDraws, months: u32) -> Vec<PatientEvent> {
    let mut events = Vec::new();
    for _ in 0..months {
        engine.step_month(patient, draws, &mut events).unwrap();
    }
    events
}

fn transitions(events: &[PatientEvent]) -> Vec<(u32, TbNaturalState)> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            PatientEventKind::TbTransition { to, .. } => Some((e.month, to)),
            _ => None,
        })
        .collect()
}

fn clinic_config() -> SimConfig {
    let mut config = SimConfig::baseline(0);
    let clinical = &mut config.tb_clinical;
    clinical.diagnostic_sensitivity = 1.0;
    clinical.diagnostic_specificity = 1.0;
    clinical.diagnostic_cost = 25.0;
    clinical.min_months_between_tests = 12;
    clinical.dst_delay_months = 2;
    clinical.first_line.duration_months = 6;
    clinical.first_line.monthly_cost = 40.0;
    clinical.first_line.cure_prob = 1.0;
    clinical.second_line.duration_months = 6;
    clinical.second_line.monthly_cost = 300.0;
    config
}

fn symptomatic(tb: TbNaturalState) -> Patient {
    let mut patient = hiv_patient(tb);
    patient.disease.tb.symptomatic = true;
    patient
}

// ── Natural history ──────────────────────────────────────────────────────────

/// Activation picks the pulmonary site when the site draw falls below the
/// pulmonary fraction, and records the episode.
#[test]
fn activation_chooses_site_and_records_episode() {
    let mut config = SimConfig::baseline(0);
    config.tb.activation_prob = StatusTable::uniform(1.0);
    config.tb.pulmonary_fraction = 0.8;
    let updater = TbNaturalUpdater::new(Arc::new(config));

    let mut pulmonary = hiv_patient(TbNaturalState::Latent);
    let mut draws = ScriptedDraws::constant(0.5);
    let events = natural_month(&updater, &mut pulmonary, &mut draws);
    assert_eq!(transitions(&events), vec![(1, TbNaturalState::ActivePulmonary)]);
    assert_eq!(pulmonary.disease.tb.last_active, Some(TbNaturalState::ActivePulmonary));
    assert_eq!(pulmonary.disease.tb.activation_month, Some(1));

    let mut extra = hiv_patient(TbNaturalState::Latent);
    let mut draws = ScriptedDraws::constant(0.5).with_stream(StreamId::TbActivationSite, [0.9]);
    natural_month(&updater, &mut extra, &mut draws);
    assert_eq!(extra.disease.tb.natural, TbNaturalState::ActiveExtrapulmonary);
}

/// Only one state transition happens per month, even when every
/// transition is certain.
#[test]
fn at_most_one_transition_per_month() {
    let mut config = SimConfig::baseline(0);
    config.tb.activation_prob = StatusTable::uniform(1.0);
    config.tb.pulmonary_fraction = 0.0;
    config.tb.self_cure_extrapulmonary = 1.0;
    config.tb.relapse_prob = StatusTable::uniform(1.0);
    let updater = TbNaturalUpdater::new(Arc::new(config));

    let mut patient = hiv_patient(TbNaturalState::Latent);
    let mut draws = ScriptedDraws::constant(0.5);
    let mut events = Vec::new();
    for _ in 0..3 {
        events.extend(natural_month(&updater, &mut patient, &mut draws));
    }
    assert_eq!(
        transitions(&events),
        vec![
            (1, TbNaturalState::ActiveExtrapulmonary),
            (2, TbNaturalState::PreviouslyTreated),
            // Relapse returns to the site of the last episode.
            (3, TbNaturalState::ActiveExtrapulmonary),
        ]
    );
}

/// Reinfection of a latent patient restarts the recent-infection clock
/// without a state change.
#[test]
fn latent_reinfection_resets_infection_month() {
    let mut config = SimConfig::baseline(0);
    config.tb.infection_prob = DemoTable::uniform(1.0, 7);
    let updater = TbNaturalUpdater::new(Arc::new(config));

    let mut patient = hiv_patient(TbNaturalState::Uninfected);
    let mut draws = ScriptedDraws::constant(0.5);
    let first = natural_month(&updater, &mut patient, &mut draws);
    assert_eq!(transitions(&first), vec![(1, TbNaturalState::Latent)]);

    let second = natural_month(&updater, &mut patient, &mut draws);
    assert!(transitions(&second).is_empty());
    assert_eq!(patient.disease.tb.natural, TbNaturalState::Latent);
    assert_eq!(patient.disease.tb.infection_month, Some(2));
}

/// Activation composes the ART multiplier with the recent-infection,
/// prior-episode and prophylaxis logit deltas.
#[test]
fn activation_probability_composes_every_adjustment() {
    let mut config = SimConfig::baseline(0);
    config.tb.activation_prob = StatusTable::uniform(0.01);
    config.tb.art_activation_multiplier = vec![0.5; 6];
    config.tb.recent_infection_months = 24;
    config.tb.recent_infection_logit = 1.0;
    config.tb.prior_active_logit = 0.5;
    config.tb.prophylaxis_logit = -2.0;
    let updater = TbNaturalUpdater::new(Arc::new(config));

    let mut patient = hiv_patient(TbNaturalState::Latent);
    assert_abs_diff_eq!(updater.activation_prob(&patient), 0.01, epsilon = 1e-12);

    patient.start_art([1.0, 1.0, 1.0]);
    patient.general.month = 5;
    patient.disease.tb.infection_month = Some(0);
    patient.disease.tb.last_active = Some(TbNaturalState::ActivePulmonary);
    patient.treatment.tb_care.prophylaxis_start = Some(4);

    let expected = LogOdds::from_prob(0.005).shift(1.0).shift(0.5).shift(-2.0).prob();
    assert_abs_diff_eq!(updater.activation_prob(&patient), expected, epsilon = 1e-12);

    // The infection is no longer recent after the window closes.
    patient.general.month = 24;
    let expected = LogOdds::from_prob(0.005).shift(0.5).shift(-2.0).prob();
    assert_abs_diff_eq!(updater.activation_prob(&patient), expected, epsilon = 1e-12);
}

/// Active disease only acquires symptoms; inactive states can clear them.
#[test]
fn symptoms_follow_disease_activity() {
    let mut config = SimConfig::baseline(0);
    config.tb.symptom_onset_active = 1.0;
    config.tb.symptom_clearance = 1.0;
    let updater = TbNaturalUpdater::new(Arc::new(config));
    let mut draws = ScriptedDraws::constant(0.5);

    let mut active = hiv_patient(TbNaturalState::ActivePulmonary);
    natural_month(&updater, &mut active, &mut draws);
    assert!(active.disease.tb.symptomatic);
    natural_month(&updater, &mut active, &mut draws);
    assert!(active.disease.tb.symptomatic);

    let mut latent = symptomatic(TbNaturalState::Latent);
    let events = natural_month(&updater, &mut latent, &mut draws);
    assert!(!latent.disease.tb.symptomatic);
    assert!(events.contains(&PatientEvent {
        month:   1,
        updater: "tb_natural",
        kind:    PatientEventKind::TbSymptomsChanged { symptomatic: false },
    }));
}

/// Active TB registers its site's death-rate ratio when it exceeds 1.
#[test]
fn active_tb_registers_mortality_hazard() {
    let mut config = SimConfig::baseline(0);
    config.tb.death_rate_ratio_pulmonary = StatusTable::uniform(6.0);
    let updater = TbNaturalUpdater::new(Arc::new(config));
    let mut draws = ScriptedDraws::constant(0.5);

    let mut active = hiv_patient(TbNaturalState::ActivePulmonary);
    natural_month(&updater, &mut active, &mut draws);
    assert_eq!(active.accum.hazards.len(), 1);
    assert_eq!(active.accum.hazards[0].cause, MortalityCause::Tuberculosis);

    // Extrapulmonary ratio stays at 1 in the baseline config.
    let mut extra = hiv_patient(TbNaturalState::ActiveExtrapulmonary);
    natural_month(&updater, &mut extra, &mut draws);
    assert!(extra.accum.hazards.is_empty());
}

// ── Clinical management ──────────────────────────────────────────────────────

/// A positive diagnostic starts first-line treatment with a pending DST;
/// completing the course cures the patient.
#[test]
fn positive_diagnostic_leads_to_treatment_and_cure() {
    let engine = SimEngine::build(clinic_config());
    let mut patient = symptomatic(TbNaturalState::ActivePulmonary);
    let mut draws = ScriptedDraws::constant(0.5);

    let events = run_months(&engine, &mut patient, &mut draws, 1);
    assert!(events.iter().any(|e| e.kind == PatientEventKind::TbDiagnosticPerformed { positive: true }));
    let care = &patient.treatment.tb_care;
    assert_eq!(care.therapy, TbTherapy::Treatment { regimen: TbRegimen::FirstLine, start: 1 });
    assert_eq!(care.pending_dst, Some(PendingDst { result_month: 3 }));
    assert_eq!(care.treatment_episodes, 1);

    let events = run_months(&engine, &mut patient, &mut draws, 6);
    assert!(events.contains(&PatientEvent {
        month:   3,
        updater: "tb_clinical",
        kind:    PatientEventKind::TbDstResolved { resistant: false },
    }));
    assert!(events.iter().any(|e| e.month == 7 && e.kind == PatientEventKind::TbTreatmentCompleted { cured: true }));
    assert_eq!(patient.disease.tb.natural, TbNaturalState::PreviouslyTreated);
    assert_eq!(patient.treatment.tb_care.therapy, TbTherapy::None);

    assert_abs_diff_eq!(patient.accum.cost(CostBucket::TbTreatment), 240.0, epsilon = 1e-9);
    assert_abs_diff_eq!(patient.accum.cost(CostBucket::TbDiagnostics), 25.0, epsilon = 1e-9);
    assert_eq!(patient.accum.cost(CostBucket::TbUntreated), 0.0);
}

/// A resistant DST result switches the patient to second line.
#[test]
fn resistant_dst_switches_to_second_line() {
    let mut config = clinic_config();
    config.tb_clinical.dst_resistance_prob = 1.0;
    let engine = SimEngine::build(config);
    let mut patient = symptomatic(TbNaturalState::ActivePulmonary);
    let mut draws = ScriptedDraws::constant(0.5);

    run_months(&engine, &mut patient, &mut draws, 3);
    let care = &patient.treatment.tb_care;
    assert_eq!(care.therapy, TbTherapy::Treatment { regimen: TbRegimen::SecondLine, start: 3 });
    assert_eq!(care.pending_dst, None);
    assert_eq!(care.treatment_episodes, 1);

    let events = run_months(&engine, &mut patient, &mut draws, 6);
    assert!(events.iter().any(|e| e.month == 9 && matches!(e.kind, PatientEventKind::TbTreatmentCompleted { .. })));
}

/// A negative test starts empiric therapy, which stops after its maximum
/// duration.
#[test]
fn negative_test_runs_bounded_empiric_therapy() {
    let mut config = clinic_config();
    config.tb_clinical.empiric_on_negative_test = true;
    config.tb_clinical.empiric_max_months = 2;
    config.tb_clinical.empiric_monthly_cost = 35.0;
    let engine = SimEngine::build(config);
    let mut patient = symptomatic(TbNaturalState::Latent);
    let mut draws = ScriptedDraws::constant(0.5);

    let events = run_months(&engine, &mut patient, &mut draws, 4);
    assert!(events.iter().any(|e| e.month == 1 && e.kind == PatientEventKind::TbDiagnosticPerformed { positive: false }));
    assert!(events.iter().any(|e| e.month == 1 && e.kind == PatientEventKind::TbEmpiricStarted));
    // Two months allowed: it runs in months 1 to 3 and stops once exceeded.
    assert!(events.iter().any(|e| e.month == 4 && e.kind == PatientEventKind::TbEmpiricStopped));
    assert_abs_diff_eq!(patient.accum.cost(CostBucket::TbEmpiric), 105.0, epsilon = 1e-9);
}

fn clinical_events(events: &[PatientEvent], month: u32) -> Vec<PatientEventKind> {
    events
        .iter()
        .filter(|e| e.month == month && e.updater == "tb_clinical")
        .map(|e| e.kind.clone())
        .collect()
}

/// An uncured patient leaving treatment is not retested and restarted in
/// the same month; the next month they are.
#[test]
fn treatment_exit_blocks_restart_until_next_month() {
    let mut config = clinic_config();
    config.tb_clinical.first_line.duration_months = 2;
    config.tb_clinical.first_line.cure_prob = 0.0;
    config.tb_clinical.min_months_between_tests = 1;
    config.tb_clinical.dst_delay_months = 0;
    let engine = SimEngine::build(config);
    let mut patient = symptomatic(TbNaturalState::ActivePulmonary);
    let mut draws = ScriptedDraws::constant(0.5);

    let events = run_months(&engine, &mut patient, &mut draws, 4);
    assert_eq!(
        clinical_events(&events, 3),
        vec![PatientEventKind::TbTreatmentCompleted { cured: false }]
    );
    assert_eq!(
        clinical_events(&events, 4),
        vec![
            PatientEventKind::TbDiagnosticPerformed { positive: true },
            PatientEventKind::TbTreatmentStarted { regimen: TbRegimen::FirstLine },
        ]
    );
    let care = &patient.treatment.tb_care;
    assert_eq!(care.therapy_end_month, Some(3));
    assert_eq!(care.therapy, TbTherapy::Treatment { regimen: TbRegimen::FirstLine, start: 4 });
    assert_eq!(care.treatment_episodes, 2);
}

/// Stopping empiric therapy also holds off a new diagnostic that month.
#[test]
fn empiric_exit_blocks_retest_until_next_month() {
    let mut config = clinic_config();
    config.tb_clinical.empiric_on_negative_test = true;
    config.tb_clinical.empiric_max_months = 1;
    config.tb_clinical.min_months_between_tests = 1;
    let engine = SimEngine::build(config);
    let mut patient = symptomatic(TbNaturalState::Latent);
    let mut draws = ScriptedDraws::constant(0.5);

    let events = run_months(&engine, &mut patient, &mut draws, 4);
    assert_eq!(clinical_events(&events, 3), vec![PatientEventKind::TbEmpiricStopped]);
    assert_eq!(
        clinical_events(&events, 4),
        vec![
            PatientEventKind::TbDiagnosticPerformed { positive: false },
            PatientEventKind::TbEmpiricStarted,
        ]
    );
    assert_eq!(patient.treatment.tb_care.therapy, TbTherapy::Empiric { start: 4 });
}

/// Outside integrated care, TB treatment can be lost on its own; the
/// active case becomes defaulted.
#[test]
fn separate_tb_care_loss_defaults_treatment() {
    let mut config = clinic_config();
    config.tb_clinical.integrated_with_hiv_care = false;
    config.tb_clinical.tb_ltfu_prob = 1.0;
    let engine = SimEngine::build(config);
    let mut patient = symptomatic(TbNaturalState::ActivePulmonary);
    let mut draws = ScriptedDraws::constant(0.5);

    let events = run_months(&engine, &mut patient, &mut draws, 2);
    assert!(events.iter().any(|e| e.month == 2 && e.kind == PatientEventKind::TbCareLost));
    assert_eq!(patient.disease.tb.natural, TbNaturalState::Defaulted);
    assert_eq!(patient.treatment.tb_care.therapy, TbTherapy::None);
    assert_eq!(patient.treatment.tb_care.pending_dst, None);
    // HIV care is unaffected.
    assert!(patient.treatment.in_care());
}

/// Prophylaxis runs its full course once for eligible patients and is
/// never restarted.
#[test]
fn prophylaxis_completes_once() {
    let mut config = clinic_config();
    config.tb_clinical.prophylaxis_enabled = true;
    config.tb_clinical.prophylaxis_max_stratum = Cd4Stratum::From350To500;
    config.tb_clinical.prophylaxis_requires_art = true;
    config.tb_clinical.prophylaxis_duration_months = 6;
    config.tb_clinical.prophylaxis_monthly_cost = 4.0;
    let engine = SimEngine::build(config);

    let mut untreated = hiv_patient(TbNaturalState::Uninfected);
    let mut draws = ScriptedDraws::constant(0.5);
    run_months(&engine, &mut untreated, &mut draws, 2);
    assert!(!untreated.treatment.tb_care.on_prophylaxis());

    let mut patient = hiv_patient(TbNaturalState::Uninfected);
    patient.start_art([1.0, 1.0, 1.0]);
    let events = run_months(&engine, &mut patient, &mut draws, 12);
    assert!(events.iter().any(|e| e.month == 1 && e.kind == PatientEventKind::TbProphylaxisStarted));
    assert!(events.iter().any(|e| e.month == 7 && e.kind == PatientEventKind::TbProphylaxisStopped { completed: true }));
    assert_eq!(
        events.iter().filter(|e| e.kind == PatientEventKind::TbProphylaxisStarted).count(),
        1
    );
    assert!(patient.treatment.tb_care.prophylaxis_completed);
    assert_abs_diff_eq!(patient.accum.cost(CostBucket::TbProphylaxis), 24.0, epsilon = 1e-9);
}

/// Untreated active TB accrues its monthly cost.
#[test]
fn untreated_active_tb_accrues_cost() {
    let mut config = SimConfig::baseline(0);
    config.tb_clinical.untreated_monthly_cost = 60.0;
    let engine = SimEngine::build(config);
    let mut patient = hiv_patient(TbNaturalState::ActivePulmonary);
    let mut draws = ScriptedDraws::constant(0.5);

    run_months(&engine, &mut patient, &mut draws, 3);
    assert_abs_diff_eq!(patient.accum.cost(CostBucket::TbUntreated), 180.0, epsilon = 1e-9);
}
