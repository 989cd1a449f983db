use super::expand::ExecutionUnit;
use super::files::{file_stem, write_checkpoint, ResultRow, ResultWriter, RunPaths};
use crate::error::{SweepError, SweepResult};
use crate::experiment::{EstimatorSetting, ProgramConfig};
use crate::objective::{EvalArgs, EvalContext, Objective};
use crate::optimizer::{OptimizerSpec, OptimizerState};
use crate::rng_util;
use crate::seed::derive_seed;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use typed_builder::TypedBuilder;

/// Budgets and output settings shared by every run of a sweep.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RunOptions {
    #[builder(default)]
    pub max_steps: Option<u64>,
    /// Budget of cumulative estimation time per run, in seconds.
    #[builder(default)]
    pub time_limit_s: Option<f64>,
    #[builder(default = false)]
    pub dump_params: bool,
    #[builder(default = 0)]
    pub global_seed: u64,
    #[builder(setter(into))]
    pub out_dir: PathBuf,
}

/// One fully resolved run inside a unit.
#[derive(Debug, Clone)]
pub struct RunSpec<'a> {
    pub program: &'a ProgramConfig,
    pub setting: EstimatorSetting,
    pub optimizer: &'a OptimizerSpec,
    pub stddev: f64,
    pub seed: i64,
    pub nreps: u32,
    pub rep: u32,
}

impl RunSpec<'_> {
    pub fn stem(&self) -> String {
        file_stem(
            self.program,
            self.stddev,
            self.seed,
            self.nreps,
            &self.setting,
            self.optimizer,
            self.rep,
        )
    }

    pub fn paths(&self, opts: &RunOptions) -> RunPaths {
        RunPaths::new(&opts.out_dir, &self.stem())
    }
}

/// Runs of a unit in execution order: replication, estimator setting, stddev, seed, nreps.
pub fn runs_of(unit: &ExecutionUnit) -> Vec<RunSpec<'_>> {
    let settings = unit.estimator.settings();
    let stddevs = unit.program.stddevs.values();
    let seeds = unit.program.seeds.values();
    let nreps = unit.program.nreps.values();

    let mut runs = Vec::new();
    for &rep in &unit.replications {
        for setting in &settings {
            for &stddev in &stddevs {
                for &seed in &seeds {
                    for &n in &nreps {
                        runs.push(RunSpec {
                            program: &unit.program,
                            setting: setting.clone(),
                            optimizer: &unit.optimizer,
                            stddev,
                            seed,
                            nreps: n,
                            rep,
                        });
                    }
                }
            }
        }
    }
    runs
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Checkpoint already present; nothing was evaluated.
    Skipped,
    Completed {
        steps: u64,
        cumulative_us: f64,
        objective_calls: u64,
    },
}

/// Executes one run to completion unless its checkpoint already exists.
pub fn execute_run(
    objective: &dyn Objective,
    run: &RunSpec<'_>,
    opts: &RunOptions,
) -> SweepResult<RunOutcome> {
    let paths = run.paths(opts);
    if paths.is_complete() {
        info!("⏭️  {} exists, skipping macroreplication", paths.checkpoint.display());
        return Ok(RunOutcome::Skipped);
    }

    info!("▶️  {} started", paths.results.display());
    let started = Instant::now();

    // 1. Seed lineage
    let seed = derive_seed(run.program, run.rep, opts.global_seed);
    let mut rng = rng_util::seeded(seed as u64);
    let init = &run.program.params;
    let start = init.sample(&mut rng);
    let dim = init.dim();

    let args = EvalArgs {
        program: run.program.name.clone(),
        estimator: run.setting.clone(),
        stddev: run.stddev,
        seed: run.seed,
        nreps: run.nreps,
    };
    let mut ctx = EvalContext::new(objective, args, dim, rng);
    let mut writer = ResultWriter::create(&paths.results, dim, opts.dump_params)?;

    // 2. Initial evaluation
    let mut optimizer = run.optimizer.build();
    let step = optimizer.initialize(&mut ctx, start, init)?;
    ctx.check_dim(&step.params)?;
    let reference = if run.setting.is_reference() {
        step.output
    } else {
        ctx.evaluate_reference(&step.params)?
    };
    let mut cumulative_us = step.elapsed_us;
    writer.write_row(&ResultRow {
        step: 0,
        output: step.output,
        reference,
        params: &step.params,
        gradient: &step.gradient,
        cumulative_us,
    })?;

    // 3. Budgeted loop
    let max_steps = opts.max_steps.unwrap_or(u64::MAX);
    let budget_us = opts.time_limit_s.unwrap_or(f64::INFINITY) * 1e6;
    let program_budget_us = run.program.time_limit_secs() * 1e6;

    let mut current = step.params;
    let mut steps = 0u64;
    while steps < max_steps && cumulative_us < budget_us && cumulative_us < program_budget_us {
        steps += 1;
        let step = optimizer.update(&mut ctx, current)?;
        if step.params.len() != dim {
            return Err(SweepError::Dimension {
                expected: dim,
                found: step.params.len(),
            });
        }
        let reference = ctx.evaluate_reference(&step.params)?;
        cumulative_us += step.elapsed_us;
        writer.write_row(&ResultRow {
            step: steps,
            output: step.output,
            reference,
            params: &step.params,
            gradient: &step.gradient,
            cumulative_us,
        })?;
        current = step.params;
    }

    // 4. Publish
    write_checkpoint(&paths.checkpoint, &current)?;
    info!(
        "✅ {} took {:.2}s (cumulative estimation time was {:.2}s)",
        paths.results.display(),
        started.elapsed().as_secs_f64(),
        cumulative_us * 1e-6
    );

    Ok(RunOutcome::Completed {
        steps,
        cumulative_us,
        objective_calls: ctx.calls(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Done,
    Failed,
}

#[derive(Debug)]
pub struct UnitReport {
    pub label: String,
    pub completed: usize,
    pub skipped: usize,
    pub error: Option<SweepError>,
}

impl UnitReport {
    /// Whether this unit's failure should abort the rest of the sweep.
    pub fn is_sweep_fatal(&self) -> bool {
        self.error.as_ref().is_some_and(SweepError::is_fatal_for_sweep)
    }

    pub fn status(&self) -> UnitStatus {
        if self.error.is_some() {
            UnitStatus::Failed
        } else {
            UnitStatus::Done
        }
    }
}

/// Runs every run of a unit in order; the first failure ends the unit.
pub fn run_unit(objective: &dyn Objective, unit: &ExecutionUnit, opts: &RunOptions) -> UnitReport {
    let mut report = UnitReport {
        label: unit.label(),
        completed: 0,
        skipped: 0,
        error: None,
    };

    for run in runs_of(unit) {
        match execute_run(objective, &run, opts) {
            Ok(RunOutcome::Skipped) => report.skipped += 1,
            Ok(RunOutcome::Completed { .. }) => report.completed += 1,
            Err(e) => {
                error!("❌ {} failed: {}", run.stem(), e);
                report.error = Some(e);
                break;
            }
        }
    }
    report
}
