//! Gradient-descent family: plain descent, windowed Adam restarts and two
//! variants that inject randomness where the gradient vanishes.

use super::rules::{Stepper, UpdateRule};
use super::{OptimizerState, Step};
use crate::error::SweepResult;
use crate::experiment::ParamInit;
use crate::objective::EvalContext;
use crate::rng_util;

/// Update rule plus the output and gradient of the last evaluation.
struct Descent {
    stepper: Stepper,
    output: f64,
    gradient: Vec<f64>,
}

impl Descent {
    fn new(rule: &UpdateRule) -> Self {
        Self {
            stepper: rule.stepper(),
            output: f64::INFINITY,
            gradient: Vec::new(),
        }
    }

    fn initialize(&mut self, ctx: &mut EvalContext<'_>, start: Vec<f64>) -> SweepResult<Step> {
        let sample = ctx.evaluate(&start)?;
        self.output = sample.output;
        self.gradient = sample.gradient.clone();
        Ok(Step {
            output: sample.output,
            gradient: sample.gradient,
            params: start,
            elapsed_us: sample.elapsed_us,
        })
    }

    /// Applies the rule with `gradient` and evaluates the new point once.
    fn step_with(
        &mut self,
        ctx: &mut EvalContext<'_>,
        current: &[f64],
        gradient: &[f64],
    ) -> SweepResult<Step> {
        ctx.check_dim(current)?;
        let next = self.stepper.step(current, gradient);
        let sample = ctx.evaluate(&next)?;
        self.output = sample.output;
        self.gradient = sample.gradient.clone();
        Ok(Step {
            output: sample.output,
            gradient: sample.gradient,
            params: next,
            elapsed_us: sample.elapsed_us,
        })
    }

    /// Gradient from the last evaluation, zeros before the first one.
    fn cached_gradient(&self, dim: usize) -> Vec<f64> {
        if self.gradient.len() == dim {
            self.gradient.clone()
        } else {
            vec![0.0; dim]
        }
    }
}

pub struct GradientDescent {
    core: Descent,
}

impl GradientDescent {
    pub fn new(rule: &UpdateRule) -> Self {
        Self {
            core: Descent::new(rule),
        }
    }
}

impl OptimizerState for GradientDescent {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        self.core.initialize(ctx, start)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let gradient = self.core.cached_gradient(current.len());
        self.core.step_with(ctx, &current, &gradient)
    }
}

/// Adam that forgets its moments when a window of estimation time brings no
/// improvement of the mean output over the window before it.
pub struct AdamRestart {
    core: Descent,
    period_us: f64,
    window_elapsed_us: f64,
    window_sum: f64,
    window_count: u64,
    prev_mean: f64,
    restarts: u32,
}

impl AdamRestart {
    pub fn new(lr: f64, period_s: f64) -> Self {
        Self {
            core: Descent::new(&UpdateRule::adam(lr)),
            period_us: period_s * 1e6,
            window_elapsed_us: 0.0,
            window_sum: 0.0,
            window_count: 0,
            prev_mean: f64::INFINITY,
            restarts: 0,
        }
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn close_window_if_due(&mut self) {
        if self.window_elapsed_us <= self.period_us {
            return;
        }
        let mean = if self.window_count == 0 {
            f64::INFINITY
        } else {
            self.window_sum / self.window_count as f64
        };
        if mean >= self.prev_mean {
            self.core.stepper.reset();
            self.restarts += 1;
        }
        self.prev_mean = mean;
        self.window_sum = 0.0;
        self.window_count = 0;
        self.window_elapsed_us = 0.0;
    }
}

impl OptimizerState for AdamRestart {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        let step = self.core.initialize(ctx, start)?;
        self.window_elapsed_us += step.elapsed_us;
        Ok(step)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        self.close_window_if_due();
        self.window_sum += self.core.output;
        self.window_count += 1;

        let gradient = self.core.cached_gradient(current.len());
        let step = self.core.step_with(ctx, &current, &gradient)?;
        self.window_elapsed_us += step.elapsed_us;
        Ok(step)
    }
}

/// Descent that replaces a vanishing gradient with a uniform random direction.
pub struct GradientFallback {
    core: Descent,
    low: f64,
    high: f64,
    min_grad_norm: f64,
}

impl GradientFallback {
    pub fn new(low: f64, high: f64, min_grad_norm: f64, rule: &UpdateRule) -> Self {
        Self {
            core: Descent::new(rule),
            low,
            high,
            min_grad_norm,
        }
    }
}

impl OptimizerState for GradientFallback {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        self.core.initialize(ctx, start)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let mut gradient = self.core.cached_gradient(current.len());
        let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
        if norm < self.min_grad_norm {
            for g in gradient.iter_mut() {
                *g = rng_util::f64_range(ctx.rng(), -self.low, self.high);
            }
        }
        self.core.step_with(ctx, &current, &gradient)
    }
}

/// Descent that adds Gaussian noise to each near-zero derivative.
pub struct PerDimNoise {
    core: Descent,
    noise_stddev: f64,
    min_deriv: f64,
}

impl PerDimNoise {
    pub fn new(noise_stddev: f64, min_deriv: f64, rule: &UpdateRule) -> Self {
        Self {
            core: Descent::new(rule),
            noise_stddev,
            min_deriv,
        }
    }
}

impl OptimizerState for PerDimNoise {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        _init: &ParamInit,
    ) -> SweepResult<Step> {
        self.core.initialize(ctx, start)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let mut gradient = self.core.cached_gradient(current.len());
        for g in gradient.iter_mut() {
            if g.abs() < self.min_deriv {
                *g += rng_util::normal(ctx.rng(), 0.0, self.noise_stddev);
            }
        }
        self.core.step_with(ctx, &current, &gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepResult;
    use crate::experiment::EstimatorSetting;
    use crate::objective::{EvalArgs, EvalRequest, Evaluation, Objective};
    use crate::rng_util::RunRng;

    /// Output |p|^2, gradient 2p, 1000us per call.
    struct Bowl;

    impl Objective for Bowl {
        fn evaluate(&self, req: &EvalRequest<'_>, _rng: &mut RunRng) -> SweepResult<Evaluation> {
            let p = &req.batch[0];
            Ok(Evaluation {
                outputs: vec![p.iter().map(|x| x * x).sum()],
                gradient: p.iter().map(|x| 2.0 * x).collect(),
                elapsed_us: 1000.0,
            })
        }
    }

    /// Constant output, no gradient.
    struct Plateau;

    impl Objective for Plateau {
        fn evaluate(&self, _req: &EvalRequest<'_>, _rng: &mut RunRng) -> SweepResult<Evaluation> {
            Ok(Evaluation {
                outputs: vec![1.0],
                gradient: Vec::new(),
                elapsed_us: 1000.0,
            })
        }
    }

    fn ctx(objective: &'static dyn Objective) -> EvalContext<'static> {
        let args = EvalArgs {
            program: "bowl".into(),
            estimator: EstimatorSetting::crisp_reference(),
            stddev: 0.0,
            seed: 0,
            nreps: 1,
        };
        EvalContext::new(objective, args, 2, rng_util::seeded(17))
    }

    fn init() -> ParamInit {
        ParamInit::Constant { values: vec![1.0, -2.0] }
    }

    #[test]
    fn test_sgd_trajectory_halves_each_step() {
        let mut ctx = ctx(&Bowl);
        let mut gd = GradientDescent::new(&UpdateRule::Sgd { lr: 0.25, momentum: 0.0 });
        let mut step = gd.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        for _ in 0..3 {
            step = gd.update(&mut ctx, step.params).unwrap();
        }
        assert_eq!(step.params, vec![0.125, -0.25]);
        assert_eq!(step.gradient, vec![0.25, -0.5]);
        assert_eq!(ctx.calls(), 4);
    }

    #[test]
    fn test_fallback_kicks_in_on_flat_gradient() {
        let mut ctx = ctx(&Plateau);
        let rule = UpdateRule::Sgd { lr: 1.0, momentum: 0.0 };
        let mut opt = GradientFallback::new(0.0, 1.0, 1e-2, &rule);
        let step = opt.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        let step = opt.update(&mut ctx, step.params).unwrap();
        // Direction drawn from [0, 1) per coordinate, lr 1.
        assert!(step.params[0] <= 1.0 && step.params[0] > 0.0);
        assert!(step.params[1] <= -2.0 && step.params[1] > -3.0);
    }

    #[test]
    fn test_plain_descent_stalls_on_flat_gradient() {
        let mut ctx = ctx(&Plateau);
        let mut gd = GradientDescent::new(&UpdateRule::Sgd { lr: 1.0, momentum: 0.0 });
        let step = gd.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        let step = gd.update(&mut ctx, step.params).unwrap();
        assert_eq!(step.params, vec![1.0, -2.0]);
    }

    #[test]
    fn test_per_dim_noise_only_touches_small_derivatives() {
        let mut ctx = ctx(&Plateau);
        let rule = UpdateRule::Sgd { lr: 1.0, momentum: 0.0 };
        let mut opt = PerDimNoise::new(1.0, 1e-2, &rule);
        let step = opt.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        let step = opt.update(&mut ctx, step.params).unwrap();
        assert_ne!(step.params, vec![1.0, -2.0]);
    }

    #[test]
    fn test_adam_restart_resets_on_stagnation() {
        let mut ctx = ctx(&Plateau);
        // Windows of 2.5ms with 1ms per call.
        let mut opt = AdamRestart::new(0.1, 0.0025);
        let mut step = opt.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        for _ in 0..12 {
            step = opt.update(&mut ctx, step.params).unwrap();
        }
        assert!(opt.restarts() >= 1);
    }

    #[test]
    fn test_adam_restart_keeps_moments_while_improving() {
        let mut ctx = ctx(&Bowl);
        let mut opt = AdamRestart::new(0.1, 0.0025);
        let mut step = opt.initialize(&mut ctx, vec![1.0, -2.0], &init()).unwrap();
        for _ in 0..6 {
            step = opt.update(&mut ctx, step.params).unwrap();
        }
        assert_eq!(opt.restarts(), 0);
    }
}
