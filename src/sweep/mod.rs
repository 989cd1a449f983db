//! Expansion of an experiment into execution units, the per-run control loop
//! and the worker pool that drives a whole sweep.

pub mod expand;
pub mod files;
pub mod schedule;
pub mod unit;

pub use self::expand::{expand_units, is_valid_pairing, ExecutionUnit};
pub use self::files::{read_checkpoint, RunPaths};
pub use self::schedule::{
    estimate_duration, greedy_makespan, run_sweep, worker_count, DurationEstimate, SweepReport,
};
pub use self::unit::{
    execute_run, run_unit, runs_of, RunOptions, RunOutcome, RunSpec, UnitReport, UnitStatus,
};
