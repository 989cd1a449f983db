use super::{OptimizerState, Step};
use crate::error::SweepResult;
use crate::experiment::ParamInit;
use crate::objective::EvalContext;
use crate::rng_util;
use rand::Rng;
use serde::{Deserialize, Serialize};

const TARGET_ACCEPTANCE: f64 = 0.44;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingParams {
    pub init_temperature: f64,
    /// Moves performed during `initialize`.
    pub init_moves: u32,
    /// Full coordinate sweeps between move-size adaptations.
    pub move_ctrl_sweep: u32,
    pub max_move: f64,
    pub init_move: f64,
    pub gain: f64,
    /// Geometric cooling rate.
    pub cooling: f64,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            init_temperature: 10000.0,
            init_moves: 0,
            move_ctrl_sweep: 100,
            max_move: 20.0,
            init_move: 0.3,
            gain: 0.3,
            cooling: 1e-5,
        }
    }
}

impl AnnealingParams {
    pub fn label(&self) -> String {
        if *self == Self::default() {
            "SA".to_string()
        } else {
            format!(
                "SA-T_{}-sweep_{}-cooling_{}",
                self.init_temperature, self.move_ctrl_sweep, self.cooling
            )
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.init_temperature > 0.0) {
            return Err("init_temperature must be positive".into());
        }
        if self.move_ctrl_sweep == 0 {
            return Err("move_ctrl_sweep must be at least 1".into());
        }
        if !(self.init_move > 0.0) || !(self.max_move >= self.init_move) {
            return Err("move sizes must satisfy 0 < init_move <= max_move".into());
        }
        if !(0.0..1.0).contains(&self.cooling) {
            return Err("cooling must lie in [0, 1)".into());
        }
        Ok(())
    }
}

/// Coordinate-wise simulated annealing with Laplace moves and adaptive move sizes.
pub struct Annealer {
    params: AnnealingParams,
    temperature: f64,
    energy: f64,
    last_output: f64,
    idx: usize,
    sweep_counter: u32,
    accept: Vec<f64>,
    move_size: Vec<f64>,
}

impl Annealer {
    pub fn new(params: AnnealingParams) -> Self {
        let temperature = params.init_temperature;
        Self {
            params,
            temperature,
            energy: f64::INFINITY,
            last_output: f64::INFINITY,
            idx: 0,
            sweep_counter: 0,
            accept: Vec::new(),
            move_size: Vec::new(),
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn move_sizes(&self) -> &[f64] {
        &self.move_size
    }

    /// One Metropolis move on the current coordinate. Returns the estimation time.
    fn generate_move(&mut self, ctx: &mut EvalContext<'_>, params: &mut [f64]) -> SweepResult<f64> {
        let prev_energy = self.energy;
        let prev_value = params[self.idx];

        params[self.idx] += rng_util::laplace(ctx.rng(), self.move_size[self.idx]);
        let sample = ctx.evaluate(params)?;
        self.energy = sample.output;
        // Reported even if the move gets rejected below.
        self.last_output = sample.output;

        let xi = ctx.rng().gen::<f64>();
        let delta = self.energy - prev_energy;
        if delta <= 0.0 || (-delta / self.temperature).exp() > xi {
            self.accept[self.idx] += 1.0;
        } else {
            params[self.idx] = prev_value;
            self.energy = prev_energy;
        }

        self.idx += 1;
        if self.idx == params.len() {
            self.idx = 0;
            self.sweep_counter += 1;
        }
        if self.sweep_counter == self.params.move_ctrl_sweep {
            self.move_control();
            self.sweep_counter = 0;
        }
        Ok(sample.elapsed_us)
    }

    /// Log-domain step of every move size toward the target acceptance ratio.
    fn move_control(&mut self) {
        let sweeps = self.params.move_ctrl_sweep as f64;
        for (size, accepted) in self.move_size.iter_mut().zip(self.accept.iter_mut()) {
            let log_size = size.ln() + self.params.gain * (*accepted / sweeps - TARGET_ACCEPTANCE);
            *size = log_size.exp().min(self.params.max_move);
            *accepted = 0.0;
        }
    }
}

impl OptimizerState for Annealer {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        mut start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        let n = start.len();
        self.accept = vec![0.0; n];
        self.move_size = vec![self.params.init_move; n];
        self.idx = 0;
        self.sweep_counter = 0;

        let sample = ctx.evaluate(&start)?;
        self.energy = sample.output;
        self.last_output = sample.output;
        let mut elapsed_us = sample.elapsed_us;

        for _ in 0..self.params.init_moves {
            elapsed_us += self.generate_move(ctx, &mut start)?;
        }

        Ok(Step {
            output: self.energy,
            gradient: vec![0.0; n],
            params: start,
            elapsed_us,
        })
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, mut current: Vec<f64>) -> SweepResult<Step> {
        ctx.check_dim(&current)?;
        let elapsed_us = self.generate_move(ctx, &mut current)?;
        self.temperature *= 1.0 - self.params.cooling;
        Ok(Step {
            output: self.last_output,
            gradient: vec![0.0; current.len()],
            params: current,
            elapsed_us,
        })
    }
}
