use super::{OptimizerState, Step};
use crate::error::SweepResult;
use crate::experiment::ParamInit;
use crate::objective::EvalContext;
use crate::rng_util;
use rand::Rng;

/// Uniform +-lr perturbation of every coordinate per step.
pub struct RandomWalk {
    lr: f64,
}

impl RandomWalk {
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl OptimizerState for RandomWalk {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        let sample = ctx.evaluate(&start)?;
        Ok(Step {
            output: sample.output,
            gradient: sample.gradient,
            params: start,
            elapsed_us: sample.elapsed_us,
        })
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, mut current: Vec<f64>) -> SweepResult<Step> {
        for p in current.iter_mut() {
            *p += rng_util::f64_range(ctx.rng(), -self.lr, self.lr);
        }
        let sample = ctx.evaluate(&current)?;
        Ok(Step {
            output: sample.output,
            gradient: sample.gradient,
            params: current,
            elapsed_us: sample.elapsed_us,
        })
    }
}

/// Best-seen solution of the local-search variants.
#[derive(Default)]
struct Incumbent {
    params: Vec<f64>,
    output: f64,
}

impl Incumbent {
    fn initialize(&mut self, ctx: &mut EvalContext<'_>, start: Vec<f64>) -> SweepResult<Step> {
        let sample = ctx.evaluate(&start)?;
        self.params = start.clone();
        self.output = sample.output;
        Ok(Step {
            output: sample.output,
            gradient: sample.gradient,
            params: start,
            elapsed_us: sample.elapsed_us,
        })
    }

    /// Evaluates `candidate`, re-evaluates the incumbent and keeps the better.
    fn challenge(&mut self, ctx: &mut EvalContext<'_>, candidate: Vec<f64>) -> SweepResult<Step> {
        let challenger = ctx.evaluate(&candidate)?;
        let defender = ctx.evaluate(&self.params)?;
        self.output = defender.output;
        if challenger.output < defender.output {
            self.output = challenger.output;
            self.params = candidate;
        }
        Ok(Step {
            output: self.output,
            gradient: challenger.gradient,
            params: self.params.clone(),
            elapsed_us: challenger.elapsed_us + defender.elapsed_us,
        })
    }
}

/// Re-samples every coordinate each step, from a uniform range or the program's initialiser.
pub struct BlindSearch {
    range: Option<(f64, f64)>,
    init: Option<ParamInit>,
    best: Incumbent,
}

impl BlindSearch {
    pub fn new(range: Option<(f64, f64)>) -> Self {
        Self {
            range,
            init: None,
            best: Incumbent::default(),
        }
    }
}

impl OptimizerState for BlindSearch {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.init = Some(init.clone());
        self.best.initialize(ctx, start)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        ctx.check_dim(&current)?;
        let candidate = match (self.range, &self.init) {
            (Some((low, high)), _) => (0..current.len())
                .map(|_| rng_util::f64_range(ctx.rng(), low, high))
                .collect(),
            (None, Some(init)) => init.sample(ctx.rng()),
            (None, None) => current,
        };
        self.best.challenge(ctx, candidate)
    }
}

/// Re-samples exactly one coordinate of the incumbent per step.
#[derive(Default)]
pub struct RandomMutation {
    init: Option<ParamInit>,
    best: Incumbent,
}

impl OptimizerState for RandomMutation {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.init = Some(init.clone());
        self.best.initialize(ctx, start)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, mut current: Vec<f64>) -> SweepResult<Step> {
        ctx.check_dim(&current)?;
        if let Some(init) = &self.init {
            let idx = ctx.rng().gen_range(0..current.len());
            current[idx] = init.sample_coordinate(ctx.rng(), idx);
        }
        self.best.challenge(ctx, current)
    }
}
