pub mod plan;
pub mod run;

use optsweep::config::SweepParams;
use optsweep::error::SweepResult;
use optsweep::experiment::Experiment;
use optsweep::sweep::{estimate_duration, expand_units, runs_of, worker_count, ExecutionUnit};
use std::path::Path;
use tracing::info;

/// Loads the experiment and expands it into filtered units.
pub fn prepare(experiment: &Path, sweep: &SweepParams) -> SweepResult<(Vec<ExecutionUnit>, usize)> {
    sweep.validate()?;

    info!("📂 Loading experiment: {}", Experiment::resolve_path(experiment).display());
    let exp = Experiment::load_from_file(experiment)?;

    let units = expand_units(&exp, sweep.num_macroreps, sweep.parallelize_macroreps);
    let workers = worker_count(units.len(), sweep.max_parallel());
    let total_runs: usize = units.iter().map(|u| runs_of(u).len()).sum();
    info!(
        "🧮 running {} units ({} runs) using {} workers",
        units.len(),
        total_runs,
        workers
    );

    match estimate_duration(&units, sweep.time_limit, workers) {
        Some(est) => info!(
            "⏱️  disregarding startup overheads, the sweep takes at most {:.1} hours, estimated finish: {}",
            est.makespan_s / 3600.0,
            est.finish.format("%Y-%m-%d, %H:%M")
        ),
        None => info!("⏱️  no time bound on some units, duration unknown"),
    }

    Ok((units, workers))
}
