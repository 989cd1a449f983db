//! Optimizer variants behind a single `initialize` / `update` contract.
//!
//! `OptimizerSpec` is the immutable, serialisable description that lives in the
//! experiment file; `Optimizer` is the stateful instance built from it, owned by
//! exactly one run.

pub mod annealing;
pub mod decorators;
pub mod descent;
pub mod genetic;
pub mod random;
pub mod rules;

use self::annealing::{Annealer, AnnealingParams};
use self::decorators::{Clip, Constrain};
use self::descent::{AdamRestart, GradientDescent, GradientFallback, PerDimNoise};
use self::genetic::{GeneticParams, GeneticSearch};
use self::random::{BlindSearch, RandomMutation, RandomWalk};
use self::rules::UpdateRule;
use crate::error::{SweepError, SweepResult};
use crate::experiment::ParamInit;
use crate::objective::EvalContext;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What one `initialize` or `update` call reports back to the run loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub output: f64,
    pub gradient: Vec<f64>,
    /// Parameters to carry into the next update.
    pub params: Vec<f64>,
    /// Estimation time spent by the objective during this call.
    pub elapsed_us: f64,
}

pub trait OptimizerState {
    /// Evaluates `start` and primes internal state. `update` may never follow.
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step>;

    /// Exactly one optimisation step starting from `current`.
    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step>;
}

fn default_lr() -> f64 {
    1e-3
}
fn default_period() -> f64 {
    100.0
}
fn default_fallback_low() -> f64 {
    0.0
}
fn default_fallback_high() -> f64 {
    1.0
}
fn default_min_grad_norm() -> f64 {
    1e-2
}
fn default_noise_stddev() -> f64 {
    1.0
}
fn default_min_deriv() -> f64 {
    1e-2
}
fn default_walk_lr() -> f64 {
    1e-2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerSpec {
    SimulatedAnnealing(AnnealingParams),
    Genetic(GeneticParams),
    GradientDescent {
        #[serde(default)]
        rule: UpdateRule,
    },
    AdamRestart {
        #[serde(default = "default_lr")]
        lr: f64,
        /// Window length in seconds of estimation time.
        #[serde(default = "default_period")]
        period_s: f64,
    },
    RandomGrad {
        #[serde(default = "default_fallback_low")]
        low: f64,
        #[serde(default = "default_fallback_high")]
        high: f64,
        #[serde(default = "default_min_grad_norm")]
        min_grad_norm: f64,
        #[serde(default)]
        rule: UpdateRule,
    },
    RandomGradPerDim {
        #[serde(default = "default_noise_stddev")]
        noise_stddev: f64,
        #[serde(default = "default_min_deriv")]
        min_deriv: f64,
        #[serde(default)]
        rule: UpdateRule,
    },
    RandomWalk {
        #[serde(default = "default_walk_lr")]
        lr: f64,
    },
    Blind {
        /// Uniform sampling range; the program's initialiser when absent.
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
    RandomMutation,
    Clip {
        max_deriv: f64,
        inner: Box<OptimizerSpec>,
    },
    Constrain {
        lower: f64,
        upper: f64,
        inner: Box<OptimizerSpec>,
    },
}

impl OptimizerSpec {
    /// Global search only makes sense against the noise-free objective.
    /// Blind search over an explicit range is a local method.
    pub fn is_global_search(&self) -> bool {
        match self {
            OptimizerSpec::SimulatedAnnealing(_)
            | OptimizerSpec::Genetic(_)
            | OptimizerSpec::Blind { range: None }
            | OptimizerSpec::RandomMutation => true,
            OptimizerSpec::Clip { inner, .. } | OptimizerSpec::Constrain { inner, .. } => {
                inner.is_global_search()
            }
            _ => false,
        }
    }

    /// The random-gradient fallback variant wants AD without smoothing.
    pub fn is_gradient_fallback(&self) -> bool {
        match self {
            OptimizerSpec::RandomGrad { .. } => true,
            OptimizerSpec::Clip { inner, .. } | OptimizerSpec::Constrain { inner, .. } => {
                inner.is_gradient_fallback()
            }
            _ => false,
        }
    }

    /// Filename-safe description naming the headline hyper-parameters.
    /// Use `fingerprint` to tell apart configurations the label abbreviates.
    pub fn label(&self) -> String {
        match self {
            OptimizerSpec::SimulatedAnnealing(p) => p.label(),
            OptimizerSpec::Genetic(p) => p.label(),
            OptimizerSpec::GradientDescent { rule } => rule.label(),
            OptimizerSpec::AdamRestart { lr, period_s } => {
                format!("AdamRestart-lr_{}-period_{}", lr, period_s)
            }
            OptimizerSpec::RandomGrad {
                low,
                high,
                min_grad_norm,
                rule,
            } => format!(
                "RandomGrad-range_{}_{}-min_grad_norm_{}-{}",
                low,
                high,
                min_grad_norm,
                rule.label()
            ),
            OptimizerSpec::RandomGradPerDim {
                noise_stddev,
                min_deriv,
                rule,
            } => format!(
                "RGPerDim-n_std_{}-m_d_{}-{}",
                noise_stddev,
                min_deriv,
                rule.label()
            ),
            OptimizerSpec::RandomWalk { lr } => format!("RandomWalk-lr_{}", lr),
            OptimizerSpec::Blind { range: None } => "Rand".to_string(),
            OptimizerSpec::Blind {
                range: Some((low, high)),
            } => format!("Random-range_{}_{}", low, high),
            OptimizerSpec::RandomMutation => "RandMut".to_string(),
            OptimizerSpec::Clip { max_deriv, inner } => {
                format!("ClipOpt-max_deriv_{}-{}", max_deriv, inner.label())
            }
            OptimizerSpec::Constrain {
                lower,
                upper,
                inner,
            } => format!("COpt-lower_{}-upper_{}-{}", lower, upper, inner.label()),
        }
    }

    /// First 4 bytes of the SHA-256 of the canonical JSON, hex encoded.
    /// Covers every field, including nested decorators.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..4])
    }

    pub fn validate(&self) -> SweepResult<()> {
        let invalid = |msg: String| Err(SweepError::Config(format!("{}: {}", self.label(), msg)));
        match self {
            OptimizerSpec::SimulatedAnnealing(p) => p.validate().or_else(invalid),
            OptimizerSpec::Genetic(p) => p.validate().or_else(invalid),
            OptimizerSpec::GradientDescent { rule }
            | OptimizerSpec::RandomGradPerDim { rule, .. } => rule.validate().or_else(invalid),
            OptimizerSpec::RandomGrad {
                low,
                high,
                min_grad_norm,
                rule,
            } => {
                if -low > *high || *min_grad_norm < 0.0 {
                    return invalid("fallback range is empty or threshold negative".into());
                }
                rule.validate().or_else(invalid)
            }
            OptimizerSpec::AdamRestart { lr, period_s } => {
                if *lr <= 0.0 || *period_s <= 0.0 {
                    return invalid("lr and period_s must be positive".into());
                }
                Ok(())
            }
            OptimizerSpec::RandomWalk { lr } => {
                if *lr <= 0.0 {
                    return invalid("lr must be positive".into());
                }
                Ok(())
            }
            OptimizerSpec::Blind {
                range: Some((low, high)),
            } if !(low < high) => invalid("range needs low < high".into()),
            OptimizerSpec::Blind { .. } | OptimizerSpec::RandomMutation => Ok(()),
            OptimizerSpec::Clip { max_deriv, inner } => {
                if !(*max_deriv >= 0.0) {
                    return invalid("max_deriv must be non-negative".into());
                }
                inner.validate()
            }
            OptimizerSpec::Constrain {
                lower,
                upper,
                inner,
            } => {
                if !(lower < upper) || !lower.is_finite() || !upper.is_finite() {
                    return invalid("needs finite lower < upper".into());
                }
                inner.validate()
            }
        }
    }

    /// A fresh, stateful instance. Never shared between runs.
    pub fn build(&self) -> Optimizer {
        match self {
            OptimizerSpec::SimulatedAnnealing(p) => Optimizer::Annealing(Annealer::new(p.clone())),
            OptimizerSpec::Genetic(p) => Optimizer::Genetic(GeneticSearch::new(p.clone())),
            OptimizerSpec::GradientDescent { rule } => {
                Optimizer::GradientDescent(GradientDescent::new(rule))
            }
            OptimizerSpec::AdamRestart { lr, period_s } => {
                Optimizer::AdamRestart(AdamRestart::new(*lr, *period_s))
            }
            OptimizerSpec::RandomGrad {
                low,
                high,
                min_grad_norm,
                rule,
            } => Optimizer::RandomGrad(GradientFallback::new(*low, *high, *min_grad_norm, rule)),
            OptimizerSpec::RandomGradPerDim {
                noise_stddev,
                min_deriv,
                rule,
            } => Optimizer::RandomGradPerDim(PerDimNoise::new(*noise_stddev, *min_deriv, rule)),
            OptimizerSpec::RandomWalk { lr } => Optimizer::RandomWalk(RandomWalk::new(*lr)),
            OptimizerSpec::Blind { range } => Optimizer::Blind(BlindSearch::new(*range)),
            OptimizerSpec::RandomMutation => Optimizer::RandomMutation(RandomMutation::default()),
            OptimizerSpec::Clip { max_deriv, inner } => {
                Optimizer::Clip(Clip::new(*max_deriv, inner.build()))
            }
            OptimizerSpec::Constrain {
                lower,
                upper,
                inner,
            } => Optimizer::Constrain(Constrain::new(*lower, *upper, inner.build())),
        }
    }
}

/// Closed set of stateful optimizers; decorators own their inner instance.
pub enum Optimizer {
    Annealing(Annealer),
    Genetic(GeneticSearch),
    GradientDescent(GradientDescent),
    AdamRestart(AdamRestart),
    RandomGrad(GradientFallback),
    RandomGradPerDim(PerDimNoise),
    RandomWalk(RandomWalk),
    Blind(BlindSearch),
    RandomMutation(RandomMutation),
    Clip(Clip),
    Constrain(Constrain),
}

impl Optimizer {
    fn state(&mut self) -> &mut dyn OptimizerState {
        match self {
            Optimizer::Annealing(o) => o,
            Optimizer::Genetic(o) => o,
            Optimizer::GradientDescent(o) => o,
            Optimizer::AdamRestart(o) => o,
            Optimizer::RandomGrad(o) => o,
            Optimizer::RandomGradPerDim(o) => o,
            Optimizer::RandomWalk(o) => o,
            Optimizer::Blind(o) => o,
            Optimizer::RandomMutation(o) => o,
            Optimizer::Clip(o) => o,
            Optimizer::Constrain(o) => o,
        }
    }
}

impl OptimizerState for Optimizer {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.state().initialize(ctx, start, init)
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        self.state().update(ctx, current)
    }
}
