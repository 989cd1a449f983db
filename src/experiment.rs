use crate::error::{SweepError, SweepResult};
use crate::optimizer::OptimizerSpec;
use crate::rng_util::{self, RunRng};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use strum::Display;
use tracing::debug;

/// Separates fields in hashed identities so adjacent fields cannot run together.
pub const FIELD_SEPARATOR: &str = "\x1f";

/// A configuration value that is either a single entry or an axis to sweep over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Axis<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> Axis<T> {
    pub fn values(&self) -> Vec<T> {
        match self {
            Axis::One(v) => vec![v.clone()],
            Axis::Many(vs) => vs.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Axis::One(_) => 1,
            Axis::Many(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for Axis<T> {
    fn from(v: T) -> Self {
        Axis::One(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Int(0) => Some(false),
            Scalar::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Maps a random source to the initial parameter vector of a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamInit {
    Uniform { low: f64, high: f64, dim: usize },
    Normal { mean: f64, std: f64, dim: usize },
    Constant { values: Vec<f64> },
}

impl ParamInit {
    pub fn dim(&self) -> usize {
        match self {
            ParamInit::Uniform { dim, .. } | ParamInit::Normal { dim, .. } => *dim,
            ParamInit::Constant { values } => values.len(),
        }
    }

    pub fn sample(&self, rng: &mut RunRng) -> Vec<f64> {
        (0..self.dim())
            .map(|i| self.sample_coordinate(rng, i))
            .collect()
    }

    /// Draws a single gene; used by mutation operators.
    pub fn sample_coordinate(&self, rng: &mut RunRng, index: usize) -> f64 {
        match self {
            ParamInit::Uniform { low, high, .. } => rng_util::f64_range(rng, *low, *high),
            ParamInit::Normal { mean, std, .. } => rng_util::normal(rng, *mean, *std),
            ParamInit::Constant { values } => values.get(index).copied().unwrap_or(0.0),
        }
    }

    fn validate(&self, program: &str) -> SweepResult<()> {
        if self.dim() == 0 {
            return Err(SweepError::Config(format!(
                "program '{}' has a zero-dimensional parameter space",
                program
            )));
        }
        match self {
            ParamInit::Uniform { low, high, .. } if !(low < high) => Err(SweepError::Config(
                format!("program '{}': uniform init needs low < high", program),
            )),
            ParamInit::Normal { std, .. } if !(*std >= 0.0) => Err(SweepError::Config(format!(
                "program '{}': normal init needs std >= 0",
                program
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    pub stddevs: Axis<f64>,
    #[serde(alias = "seed")]
    pub seeds: Axis<i64>,
    pub nreps: Axis<u32>,
    #[serde(default)]
    pub time_limit: Option<f64>,
    pub params: ParamInit,
}

impl ProgramConfig {
    /// Time limit in seconds; unbounded when absent.
    pub fn time_limit_secs(&self) -> f64 {
        self.time_limit.unwrap_or(f64::INFINITY)
    }

    pub fn clean_name(&self) -> String {
        self.name.replace('/', "_")
    }

    /// Canonical encoding of every field except the parameter initialiser,
    /// one field per `\x1f`-separated slot.
    pub fn canonical_identity(&self) -> String {
        let limit = match self.time_limit {
            Some(t) => t.to_string(),
            None => "inf".to_string(),
        };
        [
            self.name.clone(),
            format!("{:?}", self.stddevs.values()),
            format!("{:?}", self.seeds.values()),
            format!("{:?}", self.nreps.values()),
            limit,
        ]
        .join(FIELD_SEPARATOR)
    }

    fn validate(&self) -> SweepResult<()> {
        if self.name.trim().is_empty() {
            return Err(SweepError::Config("program with empty name".into()));
        }
        if self.stddevs.is_empty() || self.seeds.is_empty() || self.nreps.is_empty() {
            return Err(SweepError::Config(format!(
                "program '{}': stddevs, seeds and nreps must not be empty",
                self.name
            )));
        }
        if self.stddevs.values().iter().any(|s| !(*s >= 0.0) || !s.is_finite()) {
            return Err(SweepError::Config(format!(
                "program '{}': stddevs must be finite and non-negative",
                self.name
            )));
        }
        if let Some(t) = self.time_limit {
            if !(t >= 0.0) {
                return Err(SweepError::Config(format!(
                    "program '{}': time_limit must be non-negative",
                    self.name
                )));
            }
        }
        self.params.validate(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EstimatorKind {
    Crisp,
    Dgo,
    Pgo,
    Reinforce,
    Dgsi,
}

impl EstimatorKind {
    fn required_params(&self) -> &'static [&'static str] {
        match self {
            EstimatorKind::Crisp => &[],
            EstimatorKind::Dgo | EstimatorKind::Pgo | EstimatorKind::Reinforce => &["num_samples"],
            EstimatorKind::Dgsi => &["num_samples", "num_paths", "restrict_mode", "use_dea"],
        }
    }
}

/// How an estimator evaluates the objective, as far as pairing rules are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Plain program, no smoothing and no gradient.
    NoiseFree,
    /// Plain program with automatic differentiation.
    Differentiated,
    /// A smoothing gradient estimator.
    Smoothed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub name: EstimatorKind,
    #[serde(default)]
    pub params: BTreeMap<String, Axis<Scalar>>,
}

impl EstimatorConfig {
    pub fn enable_ad(&self) -> bool {
        self.params
            .get("enable_ad")
            .and_then(|axis| axis.values().first().and_then(Scalar::as_bool))
            .unwrap_or(false)
    }

    pub fn mode(&self) -> EvalMode {
        match (self.name, self.enable_ad()) {
            (EstimatorKind::Crisp, false) => EvalMode::NoiseFree,
            (EstimatorKind::Crisp, true) => EvalMode::Differentiated,
            _ => EvalMode::Smoothed,
        }
    }

    /// Cross product of all list-valued parameters.
    pub fn settings(&self) -> Vec<EstimatorSetting> {
        if self.params.is_empty() {
            return vec![EstimatorSetting::new(self.name, BTreeMap::new())];
        }
        let names: Vec<&String> = self.params.keys().collect();
        self.params
            .values()
            .map(|axis| axis.values())
            .multi_cartesian_product()
            .map(|combo| {
                let params = names
                    .iter()
                    .map(|k| (*k).clone())
                    .zip(combo)
                    .collect::<BTreeMap<_, _>>();
                EstimatorSetting::new(self.name, params)
            })
            .collect()
    }

    fn validate(&self) -> SweepResult<()> {
        for (key, axis) in &self.params {
            if axis.is_empty() {
                return Err(SweepError::Config(format!(
                    "estimator '{}': parameter '{}' has no values",
                    self.name, key
                )));
            }
        }
        if let Some(axis) = self.params.get("enable_ad") {
            let vals = axis.values();
            if vals.len() != 1 || vals[0].as_bool().is_none() {
                return Err(SweepError::Config(format!(
                    "estimator '{}': enable_ad must be a single boolean",
                    self.name
                )));
            }
        }
        for required in self.name.required_params() {
            if !self.params.contains_key(*required) {
                return Err(SweepError::Config(format!(
                    "estimator '{}' requires parameter '{}'",
                    self.name, required
                )));
            }
        }
        Ok(())
    }
}

/// One concrete point of an estimator's parameter grid.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSetting {
    pub kind: EstimatorKind,
    pub params: BTreeMap<String, Scalar>,
}

impl EstimatorSetting {
    pub fn new(kind: EstimatorKind, params: BTreeMap<String, Scalar>) -> Self {
        Self { kind, params }
    }

    /// The noise-free, non-differentiated evaluation path.
    pub fn crisp_reference() -> Self {
        Self::new(EstimatorKind::Crisp, BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.params.get(key)
    }

    pub fn enable_ad(&self) -> bool {
        self.get("enable_ad")
            .and_then(Scalar::as_bool)
            .unwrap_or(false)
    }

    pub fn num_samples(&self) -> u64 {
        self.get("num_samples").and_then(Scalar::as_u64).unwrap_or(1)
    }

    /// True when evaluating through this setting is identical to the reference path.
    pub fn is_reference(&self) -> bool {
        self.kind == EstimatorKind::Crisp && !self.enable_ad() && self.num_samples() == 1
    }

    pub fn label(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .join("-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub programs: Vec<ProgramConfig>,
    pub estimators: Vec<EstimatorConfig>,
    pub optimizers: Vec<OptimizerSpec>,
}

impl Experiment {
    /// Accepts the JSON file itself or a directory holding `experiment.json`.
    pub fn resolve_path<P: AsRef<Path>>(path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_dir() {
            path.join("experiment.json")
        } else {
            path.to_path_buf()
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SweepResult<Self> {
        let file = Self::resolve_path(path);
        debug!("Loading experiment from {:?}", file);
        let content = fs::read_to_string(&file)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> SweepResult<Self> {
        let experiment: Experiment = serde_json::from_str(content)?;
        experiment.validate()?;
        Ok(experiment)
    }

    pub fn validate(&self) -> SweepResult<()> {
        if self.programs.is_empty() || self.estimators.is_empty() || self.optimizers.is_empty() {
            return Err(SweepError::Config(
                "experiment needs at least one program, estimator and optimizer".into(),
            ));
        }
        for p in &self.programs {
            p.validate()?;
        }
        for e in &self.estimators {
            e.validate()?;
        }
        for o in &self.optimizers {
            o.validate()?;
        }
        Ok(())
    }
}
