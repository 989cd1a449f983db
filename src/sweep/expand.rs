use crate::experiment::{EstimatorConfig, EvalMode, Experiment, ProgramConfig};
use crate::optimizer::OptimizerSpec;
use itertools::iproduct;
use std::sync::Arc;
use tracing::debug;

/// One schedulable piece of work: a resolved combination plus the macro-replications it runs.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    pub program: Arc<ProgramConfig>,
    pub estimator: Arc<EstimatorConfig>,
    pub optimizer: Arc<OptimizerSpec>,
    pub replications: Vec<u32>,
}

impl ExecutionUnit {
    pub fn label(&self) -> String {
        let reps = match self.replications.as_slice() {
            [] => "no reps".to_string(),
            [single] => format!("rep {}", single),
            [first, .., last] => format!("reps {}..={}", first, last),
        };
        format!(
            "{} / {} / {} / {}",
            self.program.name,
            self.estimator.name,
            self.optimizer.label(),
            reps
        )
    }

    /// Upper bound on wall-clock seconds, infinite when nothing bounds it.
    pub fn worst_case_secs(&self, global_limit_s: Option<f64>) -> f64 {
        let global = global_limit_s.unwrap_or(f64::INFINITY);
        let per_rep = global.min(self.program.time_limit_secs());
        per_rep * self.replications.len() as f64
    }
}

/// Whether an optimizer is meaningful against an estimator evaluated in `mode`.
pub fn is_valid_pairing(optimizer: &OptimizerSpec, mode: EvalMode) -> bool {
    if optimizer.is_global_search() {
        if mode != EvalMode::NoiseFree {
            return false;
        }
    } else if mode == EvalMode::NoiseFree {
        return false;
    }

    if optimizer.is_gradient_fallback() && mode != EvalMode::Differentiated {
        return false;
    }
    true
}

/// Cartesian product of the experiment axes with invalid pairings dropped.
///
/// With `parallelize` every macro-replication becomes its own unit and units are
/// ordered replication-major, so every combination starts before any gets a second rep.
pub fn expand_units(exp: &Experiment, num_macroreps: u32, parallelize: bool) -> Vec<ExecutionUnit> {
    let programs: Vec<Arc<ProgramConfig>> = exp.programs.iter().cloned().map(Arc::new).collect();
    let estimators: Vec<Arc<EstimatorConfig>> =
        exp.estimators.iter().cloned().map(Arc::new).collect();
    let optimizers: Vec<Arc<OptimizerSpec>> =
        exp.optimizers.iter().cloned().map(Arc::new).collect();

    let combos: Vec<_> = iproduct!(&programs, &estimators, &optimizers)
        .filter(|(_, estim, opt)| {
            let keep = is_valid_pairing(opt, estim.mode());
            if !keep {
                debug!("dropping {} with {}", opt.label(), estim.name);
            }
            keep
        })
        .collect();

    if num_macroreps == 0 {
        return Vec::new();
    }

    let unit = |(p, e, o): &(&Arc<ProgramConfig>, &Arc<EstimatorConfig>, &Arc<OptimizerSpec>),
                replications: Vec<u32>| ExecutionUnit {
        program: Arc::clone(p),
        estimator: Arc::clone(e),
        optimizer: Arc::clone(o),
        replications,
    };

    if parallelize {
        (0..num_macroreps)
            .flat_map(|rep| combos.iter().map(move |c| (rep, c)))
            .map(|(rep, c)| unit(c, vec![rep]))
            .collect()
    } else {
        combos
            .iter()
            .map(|c| unit(c, (0..num_macroreps).collect()))
            .collect()
    }
}
