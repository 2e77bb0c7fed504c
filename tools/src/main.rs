//! sim-runner: headless cohort runner.
//!
//! Usage:
//!   sim-runner --seed 12345 --patients 1000 --data-dir ./data
//!   sim-runner --seed 12345 --patients 50 --trace 3 --trace 17

use anyhow::Result;
use hivsim_core::{
    config::SimConfig,
    engine::{CohortReport, SimEngine},
    types::{PatientId, RunId},
};
use std::env;

#[derive(serde::Serialize)]
struct RunReport {
    run_id:      RunId,
    started_at:  String,
    elapsed_ms:  i64,
    version:     &'static str,
    updaters:    Vec<&'static str>,
    #[serde(flatten)]
    cohort:      CohortReport,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let patients = parse_arg(&args, "--patients", 100usize);
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");
    let trace: Vec<PatientId> = args
        .windows(2)
        .filter(|w| w[0] == "--trace")
        .filter_map(|w| w[1].parse().ok())
        .collect();

    let started = chrono::Utc::now();
    let run_id = format!("run-{seed}-{}", started.format("%Y%m%dT%H%M%S"));
    eprintln!("sim-runner");
    eprintln!("  run_id:    {run_id}");
    eprintln!("  seed:      {seed}");
    eprintln!("  patients:  {patients}");
    eprintln!("  data_dir:  {data_dir}");
    if !trace.is_empty() {
        eprintln!("  tracing:   {trace:?}");
    }

    let config = SimConfig::load(data_dir)?;
    let engine = SimEngine::build(config);
    log::debug!("Updaters: {:?}", engine.updater_names());
    let cohort = engine.run_cohort(seed, patients, &trace)?;
    log::info!("Run {run_id} finished: {} deaths among {} patients", cohort.deaths, cohort.patients);

    let report = RunReport {
        run_id,
        started_at: started.to_rfc3339(),
        elapsed_ms: (chrono::Utc::now() - started).num_milliseconds(),
        version:    env!("CARGO_PKG_VERSION"),
        updaters:   engine.updater_names(),
        cohort,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
