use super::{Optimizer, OptimizerState, Step};
use crate::error::SweepResult;
use crate::experiment::ParamInit;
use crate::objective::EvalContext;

/// Clamps every derivative returned by `update` to `[-max_deriv, max_deriv]`.
pub struct Clip {
    max_deriv: f64,
    inner: Box<Optimizer>,
}

impl Clip {
    pub fn new(max_deriv: f64, inner: Optimizer) -> Self {
        Self {
            max_deriv,
            inner: Box::new(inner),
        }
    }

    /// A NaN derivative carries no direction and is zeroed.
    pub fn clip(&self, g: f64) -> f64 {
        if g.is_nan() {
            0.0
        } else {
            g.clamp(-self.max_deriv, self.max_deriv)
        }
    }
}

impl OptimizerState for Clip {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.inner.initialize(ctx, start, init)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let mut step = self.inner.update(ctx, current)?;
        for g in step.gradient.iter_mut() {
            *g = self.clip(*g);
        }
        Ok(step)
    }
}

/// Wraps parameters leaving `[lower, upper)` back into the interval.
pub struct Constrain {
    lower: f64,
    upper: f64,
    inner: Box<Optimizer>,
}

impl Constrain {
    pub fn new(lower: f64, upper: f64, inner: Optimizer) -> Self {
        Self {
            lower,
            upper,
            inner: Box::new(inner),
        }
    }

    pub fn wrap(&self, p: f64) -> f64 {
        if p >= self.lower && p < self.upper {
            return p;
        }
        let wrapped = self.lower + (p - self.lower).rem_euclid(self.upper - self.lower);
        // rem_euclid can round up to the width itself for tiny negative offsets
        if wrapped >= self.upper {
            self.lower
        } else {
            wrapped
        }
    }
}

impl OptimizerState for Constrain {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.inner.initialize(ctx, start, init)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let mut step = self.inner.update(ctx, current)?;
        for p in step.params.iter_mut() {
            *p = self.wrap(*p);
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::random::RandomWalk;

    #[test]
    fn test_wrap_is_periodic() {
        let c = Constrain::new(0.0, 10.0, Optimizer::RandomWalk(RandomWalk::new(1.0)));
        assert_eq!(c.wrap(3.0), 3.0);
        assert_eq!(c.wrap(12.5), 2.5);
        assert_eq!(c.wrap(-1.0), 9.0);
        assert_eq!(c.wrap(10.0), 0.0);
        assert_eq!(c.wrap(-20.0), 0.0);
    }

    #[test]
    fn test_clip_bounds_and_zeroes_nan() {
        let c = Clip::new(2.0, Optimizer::RandomWalk(RandomWalk::new(1.0)));
        assert_eq!(c.clip(1.5), 1.5);
        assert_eq!(c.clip(-7.0), -2.0);
        assert_eq!(c.clip(f64::INFINITY), 2.0);
        assert_eq!(c.clip(f64::NAN), 0.0);
    }
}
