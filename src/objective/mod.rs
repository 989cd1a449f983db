//! The objective contract: an opaque, slow, possibly failing evaluation of a
//! parameter vector, plus the per-run context optimizers evaluate through.

pub mod process;

pub use self::process::ProgramObjective;

use crate::error::{SweepError, SweepResult};
use crate::experiment::EstimatorSetting;
use crate::rng_util::RunRng;

/// Everything except the parameter vector that an objective call depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalArgs {
    pub program: String,
    pub estimator: EstimatorSetting,
    pub stddev: f64,
    pub seed: i64,
    pub nreps: u32,
}

impl EvalArgs {
    /// The same call routed through the noise-free crisp path without AD.
    pub fn reference(&self) -> Self {
        Self {
            program: self.program.clone(),
            estimator: EstimatorSetting::crisp_reference(),
            stddev: 0.0,
            seed: self.seed,
            nreps: self.nreps,
        }
    }
}

pub struct EvalRequest<'a> {
    pub args: &'a EvalArgs,
    /// One or more parameter vectors; only crisp evaluation accepts more than one.
    pub batch: &'a [Vec<f64>],
}

/// Raw result of one objective call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// One output per parameter vector in the request.
    pub outputs: Vec<f64>,
    /// May be empty when the estimator reports no derivatives.
    pub gradient: Vec<f64>,
    pub elapsed_us: f64,
}

pub trait Objective: Send + Sync {
    fn evaluate(&self, req: &EvalRequest<'_>, rng: &mut RunRng) -> SweepResult<Evaluation>;
}

/// A single-vector evaluation as optimizers consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub output: f64,
    pub gradient: Vec<f64>,
    pub elapsed_us: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSample {
    pub outputs: Vec<f64>,
    pub elapsed_us: f64,
}

/// Owns the RNG of one run and routes every objective call of that run.
pub struct EvalContext<'a> {
    objective: &'a dyn Objective,
    args: EvalArgs,
    reference_args: EvalArgs,
    rng: RunRng,
    dim: usize,
    calls: u64,
}

impl<'a> EvalContext<'a> {
    pub fn new(objective: &'a dyn Objective, args: EvalArgs, dim: usize, rng: RunRng) -> Self {
        let reference_args = args.reference();
        Self {
            objective,
            args,
            reference_args,
            rng,
            dim,
            calls: 0,
        }
    }

    pub fn rng(&mut self) -> &mut RunRng {
        &mut self.rng
    }

    pub fn args(&self) -> &EvalArgs {
        &self.args
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of objective calls made so far, reference calls included.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn check_dim(&self, params: &[f64]) -> SweepResult<()> {
        if params.len() != self.dim {
            return Err(SweepError::Dimension {
                expected: self.dim,
                found: params.len(),
            });
        }
        Ok(())
    }

    pub fn evaluate(&mut self, params: &[f64]) -> SweepResult<Sample> {
        self.check_dim(params)?;
        let batch = [params.to_vec()];
        let eval = Self::call(self.objective, &self.args, &batch, &mut self.rng, &mut self.calls)?;
        let mut gradient = eval.gradient;
        if gradient.is_empty() {
            gradient = vec![0.0; self.dim];
        } else if gradient.len() != self.dim {
            return Err(SweepError::Dimension {
                expected: self.dim,
                found: gradient.len(),
            });
        }
        Ok(Sample {
            output: eval.outputs[0],
            gradient,
            elapsed_us: eval.elapsed_us,
        })
    }

    /// Evaluates several vectors in one call; gradients are discarded.
    pub fn evaluate_batch(&mut self, batch: &[Vec<f64>]) -> SweepResult<BatchSample> {
        for params in batch {
            self.check_dim(params)?;
        }
        let eval = Self::call(self.objective, &self.args, batch, &mut self.rng, &mut self.calls)?;
        Ok(BatchSample {
            outputs: eval.outputs,
            elapsed_us: eval.elapsed_us,
        })
    }

    /// Noise-free output at `params`. Not part of any optimizer's timing.
    pub fn evaluate_reference(&mut self, params: &[f64]) -> SweepResult<f64> {
        self.check_dim(params)?;
        let batch = [params.to_vec()];
        let eval = Self::call(
            self.objective,
            &self.reference_args,
            &batch,
            &mut self.rng,
            &mut self.calls,
        )?;
        Ok(eval.outputs[0])
    }

    fn call(
        objective: &dyn Objective,
        args: &EvalArgs,
        batch: &[Vec<f64>],
        rng: &mut RunRng,
        calls: &mut u64,
    ) -> SweepResult<Evaluation> {
        *calls += 1;
        let eval = objective.evaluate(&EvalRequest { args, batch }, rng)?;
        if eval.outputs.len() != batch.len() {
            return Err(SweepError::ObjectiveOutput {
                command: args.program.clone(),
                reason: format!(
                    "expected {} outputs, got {}",
                    batch.len(),
                    eval.outputs.len()
                ),
            });
        }
        Ok(eval)
    }
}
