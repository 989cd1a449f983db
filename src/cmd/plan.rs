use super::prepare;
use crate::reports;
use clap::Args;
use optsweep::config::{resolve_out_dir, SweepParams};
use optsweep::error::SweepResult;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    pub experiment: PathBuf,

    #[command(flatten)]
    pub sweep: SweepParams,

    /// Checked for existing checkpoints [default: <experiment dir>/results]
    #[arg(short = 'o', long, visible_alias = "out_dir")]
    pub out_dir: Option<PathBuf>,
}

pub fn run(args: PlanArgs) -> SweepResult<bool> {
    let (units, _) = prepare(&args.experiment, &args.sweep)?;
    let out_dir = resolve_out_dir(&args.experiment, args.out_dir.as_deref());
    let opts = args.sweep.run_options(&out_dir);
    reports::print_plan(&units, &opts);
    Ok(true)
}
