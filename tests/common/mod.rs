#![allow(dead_code)]

use optsweep::error::{SweepError, SweepResult};
use optsweep::experiment::{EstimatorKind, Experiment};
use optsweep::objective::{EvalRequest, Evaluation, Objective};
use optsweep::rng_util::RunRng;
use optsweep::sweep::RunOptions;
use rand::Rng;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub const CALL_US: f64 = 1000.0;

fn gradient_for(req: &EvalRequest<'_>) -> Vec<f64> {
    let differentiated =
        req.args.estimator.kind != EstimatorKind::Crisp || req.args.estimator.enable_ad();
    if differentiated {
        req.batch[0].iter().map(|x| 2.0 * x).collect()
    } else {
        Vec::new()
    }
}

/// ‖p‖² with gradient 2p; every call costs a fixed 1000µs of estimation time.
#[derive(Default)]
pub struct Bowl {
    calls: AtomicU64,
}

impl Bowl {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Objective for Bowl {
    fn evaluate(&self, req: &EvalRequest<'_>, _rng: &mut RunRng) -> SweepResult<Evaluation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Evaluation {
            outputs: req
                .batch
                .iter()
                .map(|p| p.iter().map(|x| x * x).sum())
                .collect(),
            gradient: gradient_for(req),
            elapsed_us: CALL_US,
        })
    }
}

/// Bowl plus uniform noise scaled by the requested stddev, drawn from the run's RNG.
#[derive(Default)]
pub struct NoisyBowl;

impl Objective for NoisyBowl {
    fn evaluate(&self, req: &EvalRequest<'_>, rng: &mut RunRng) -> SweepResult<Evaluation> {
        let outputs = req
            .batch
            .iter()
            .map(|p| p.iter().map(|x| x * x).sum::<f64>() + req.args.stddev * (rng.gen::<f64>() - 0.5))
            .collect();
        Ok(Evaluation {
            outputs,
            gradient: gradient_for(req),
            elapsed_us: CALL_US,
        })
    }
}

/// Succeeds for the first `ok_calls` calls, then fails like a crashing program would.
pub struct Failing {
    ok_calls: u64,
    calls: AtomicU64,
}

impl Failing {
    pub fn after(ok_calls: u64) -> Self {
        Self {
            ok_calls,
            calls: AtomicU64::new(0),
        }
    }
}

impl Objective for Failing {
    fn evaluate(&self, req: &EvalRequest<'_>, rng: &mut RunRng) -> SweepResult<Evaluation> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.ok_calls {
            return Err(SweepError::Objective {
                command: format!("{} -s {}", req.args.program, req.args.seed),
                reason: "exit status: 1".into(),
            });
        }
        NoisyBowl.evaluate(req, rng)
    }
}

/// Rejects every call with a configuration error, as a missing estimator parameter would.
#[derive(Default)]
pub struct Misconfigured {
    calls: AtomicU64,
}

impl Misconfigured {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Objective for Misconfigured {
    fn evaluate(&self, req: &EvalRequest<'_>, _rng: &mut RunRng) -> SweepResult<Evaluation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SweepError::Config(format!(
            "estimator '{}' is missing parameter 'num_samples'",
            req.args.estimator.kind
        )))
    }
}

pub fn experiment_json(params: &str, estimators: &str, optimizers: &str) -> String {
    format!(
        r#"{{
            "programs": [
                {{ "name": "bowl/bowl", "stddevs": 0.5, "seeds": 1, "nreps": 10,
                   "params": {} }}
            ],
            "estimators": [{}],
            "optimizers": [{}]
        }}"#,
        params, estimators, optimizers
    )
}

pub fn experiment(params: &str, estimators: &str, optimizers: &str) -> Experiment {
    Experiment::from_json(&experiment_json(params, estimators, optimizers))
        .expect("test experiment must parse")
}

pub fn opts(out_dir: &Path, max_steps: Option<u64>) -> RunOptions {
    RunOptions::builder()
        .max_steps(max_steps)
        .out_dir(out_dir)
        .build()
}

pub const CRISP: &str = r#"{ "name": "crisp" }"#;
pub const CRISP_AD: &str = r#"{ "name": "crisp", "params": { "enable_ad": true } }"#;
pub const PGO: &str = r#"{ "name": "pgo", "params": { "num_samples": 10 } }"#;
pub const UNIFORM_2D: &str = r#"{ "kind": "uniform", "low": -1, "high": 1, "dim": 2 }"#;
