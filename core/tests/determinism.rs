//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two engines, same seed, same patients.
//! They must produce byte-identical event logs.
//! Any divergence is a blocker. Do not merge until fixed.

use hivsim_core::{
    config::SimConfig,
    engine::SimEngine,
    rng::RngBank,
};

const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");
const PATIENTS: u64 = 40;

fn build_engine() -> SimEngine {
    SimEngine::build(SimConfig::load(DATA_DIR).expect("sample data loads"))
}

fn collect_event_log(engine: &SimEngine, seed: u64) -> Vec<String> {
    let bank = RngBank::new(seed);
    (0..PATIENTS)
        .flat_map(|id| {
            let mut draws = bank.for_patient(id);
            let patient = engine.factory().create(id, &mut draws);
            engine
                .run_patient(patient, &mut draws)
                .expect("patient run")
                .events
                .into_iter()
                .map(move |e| format!("{id}:{}", serde_json::to_string(&e).expect("serialize event")))
        })
        .collect()
}

#[test]
fn same_seed_produces_identical_event_logs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let log_a = collect_event_log(&build_engine(), SEED);
    let log_b = collect_event_log(&build_engine(), SEED);

    assert_eq!(
        log_a.len(), log_b.len(),
        "Event log lengths differ: {} vs {}",
        log_a.len(), log_b.len()
    );

    for (i, (a, b)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(
            a, b,
            "Event log diverged at entry {i}:\n  A: {a}\n  B: {b}"
        );
    }
}

#[test]
fn different_seeds_produce_different_logs() {
    let engine = build_engine();
    let log_a = collect_event_log(&engine, 42);
    let log_b = collect_event_log(&engine, 99);

    let any_different = log_a.len() != log_b.len()
        || log_a.iter().zip(log_b.iter()).any(|(a, b)| a != b);
    assert!(any_different, "Different seeds produced identical logs, seed is not being used");
}

/// A patient's outcome depends only on (seed, patient id), not on how many
/// patients ran before it.
#[test]
fn patient_outcome_is_independent_of_cohort_position() {
    let engine = build_engine();
    let bank = RngBank::new(7);

    let run = |id| {
        let mut draws = bank.for_patient(id);
        let patient = engine.factory().create(id, &mut draws);
        let run = engine.run_patient(patient, &mut draws).expect("patient run");
        serde_json::to_string(&run.events).expect("serialize events")
    };

    let alone = run(25);
    for id in 0..25 {
        run(id);
    }
    assert_eq!(alone, run(25));
}

/// The cohort report aggregates the same summaries the patient runs return.
#[test]
fn cohort_report_is_reproducible() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = build_engine();
    let a = serde_json::to_string(&engine.run_cohort(11, 25, &[]).expect("cohort a")).expect("json");
    let b = serde_json::to_string(&engine.run_cohort(11, 25, &[3]).expect("cohort b")).expect("json");
    // Tracing changes logging only, never outcomes.
    assert_eq!(a, b);
}
