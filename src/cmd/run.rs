use super::prepare;
use crate::reports;
use clap::Args;
use optsweep::config::{resolve_out_dir, SweepParams};
use optsweep::error::SweepResult;
use optsweep::objective::ProgramObjective;
use optsweep::sweep::run_sweep;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Experiment JSON file, or a directory containing `experiment.json`.
    pub experiment: PathBuf,

    #[command(flatten)]
    pub sweep: SweepParams,

    /// Where result and checkpoint files go [default: <experiment dir>/results]
    #[arg(short = 'o', long, visible_alias = "out_dir")]
    pub out_dir: Option<PathBuf>,

    /// Directory holding the compiled estimator programs.
    #[arg(long, visible_alias = "programs_dir", default_value = "programs")]
    pub programs_dir: PathBuf,
}

/// Returns whether every unit finished without error.
pub fn run(args: RunArgs) -> SweepResult<bool> {
    let (units, _) = prepare(&args.experiment, &args.sweep)?;
    if units.is_empty() {
        warn!("⚠️  No valid optimizer/estimator combinations; nothing to do.");
        return Ok(true);
    }

    let out_dir = resolve_out_dir(&args.experiment, args.out_dir.as_deref());
    info!("💾 Writing results to {}", out_dir.display());

    let objective = ProgramObjective::new(&args.programs_dir);
    let opts = args.sweep.run_options(&out_dir);
    let report = run_sweep(&objective, units, &opts, args.sweep.max_parallel())?;

    reports::print_sweep_summary(&report);
    Ok(report.is_success())
}
