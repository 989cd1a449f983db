use super::{OptimizerState, Step};
use crate::error::SweepResult;
use crate::experiment::ParamInit;
use crate::objective::EvalContext;
use crate::rng_util::RunRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticParams {
    pub pop_size: usize,
    pub crossover_probability: f64,
    pub mutation_probability: f64,
    pub elitism: bool,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            pop_size: 50,
            crossover_probability: 0.8,
            mutation_probability: 0.2,
            elitism: true,
        }
    }
}

impl GeneticParams {
    pub fn label(&self) -> String {
        format!("GA-pop_{}", self.pop_size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pop_size < 2 {
            return Err("pop_size must be at least 2".into());
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.crossover_probability) || !unit.contains(&self.mutation_probability) {
            return Err("probabilities must lie in [0, 1]".into());
        }
        Ok(())
    }

    fn tournament_size(&self) -> usize {
        match self.pop_size / 10 {
            0 => 2,
            n => n,
        }
        .min(self.pop_size)
    }
}

#[derive(Debug, Clone)]
struct Individual {
    genes: Vec<f64>,
    fitness: f64,
}

/// Generational GA minimising the objective; one batched call per generation.
pub struct GeneticSearch {
    params: GeneticParams,
    init: Option<ParamInit>,
    population: Vec<Individual>,
}

impl GeneticSearch {
    pub fn new(params: GeneticParams) -> Self {
        Self {
            params,
            init: None,
            population: Vec::new(),
        }
    }

    pub fn population_size(&self) -> usize {
        self.population.len()
    }

    /// Replaces the population and sorts it best-first.
    fn rank(&mut self, genes: Vec<Vec<f64>>, fitness: Vec<f64>) {
        self.population = genes
            .into_iter()
            .zip(fitness)
            .map(|(genes, fitness)| Individual { genes, fitness })
            .collect();
        self.population
            .sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
    }

    fn tournament(&self, rng: &mut RunRng) -> &Individual {
        let n = self.population.len();
        let k = self.params.tournament_size();
        // Partial Fisher-Yates: k distinct contestants.
        let mut idx: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = rng.gen_range(i..n);
            idx.swap(i, j);
        }
        let winner = idx[..k]
            .iter()
            .copied()
            .min_by(|a, b| {
                self.population[*a]
                    .fitness
                    .total_cmp(&self.population[*b].fitness)
            })
            .unwrap_or(0);
        &self.population[winner]
    }

    fn crossover(rng: &mut RunRng, a: &mut Vec<f64>, b: &mut Vec<f64>) {
        let index = rng.gen_range(1..=a.len());
        for i in index..a.len() {
            std::mem::swap(&mut a[i], &mut b[i]);
        }
    }

    fn mutate(rng: &mut RunRng, init: &ParamInit, genes: &mut [f64]) {
        let i = rng.gen_range(0..genes.len());
        genes[i] = init.sample_coordinate(rng, i);
    }

    fn next_generation(&self, rng: &mut RunRng, init: &ParamInit) -> Vec<Vec<f64>> {
        let size = self.params.pop_size;
        let mut next: Vec<Vec<f64>> = Vec::with_capacity(size);

        while next.len() < size {
            let mut child_1 = self.tournament(rng).genes.clone();
            let mut child_2 = self.tournament(rng).genes.clone();

            let can_crossover = rng.gen::<f64>() < self.params.crossover_probability;
            let can_mutate = rng.gen::<f64>() < self.params.mutation_probability;
            if can_crossover {
                Self::crossover(rng, &mut child_1, &mut child_2);
            }
            if can_mutate {
                Self::mutate(rng, init, &mut child_1);
                Self::mutate(rng, init, &mut child_2);
            }

            next.push(child_1);
            if next.len() < size {
                next.push(child_2);
            }
        }

        if self.params.elitism {
            if let Some(elite) = self.population.first() {
                next[0] = elite.genes.clone();
            }
        }
        next
    }

    fn best(&self) -> Option<&Individual> {
        self.population.first()
    }
}

impl OptimizerState for GeneticSearch {
    fn initialize(
        &mut self,
        ctx: &mut EvalContext<'_>,
        start: Vec<f64>,
        init: &ParamInit,
    ) -> SweepResult<Step> {
        self.init = Some(init.clone());

        // The starting point is the first member of the initial population.
        let mut genes = Vec::with_capacity(self.params.pop_size);
        genes.push(start.clone());
        while genes.len() < self.params.pop_size {
            genes.push(init.sample(ctx.rng()));
        }

        let batch = ctx.evaluate_batch(&genes)?;
        let output = batch.outputs[0];
        self.rank(genes, batch.outputs);

        Ok(Step {
            output,
            gradient: vec![0.0; start.len()],
            params: start,
            elapsed_us: batch.elapsed_us,
        })
    }

    fn update(&mut self, ctx: &mut EvalContext<'_>, current: Vec<f64>) -> SweepResult<Step> {
        let init = match &self.init {
            Some(init) => init.clone(),
            None => {
                let fallback = ParamInit::Constant {
                    values: current.clone(),
                };
                return self.initialize(ctx, current, &fallback);
            }
        };
        let genes = self.next_generation(ctx.rng(), &init);
        let batch = ctx.evaluate_batch(&genes)?;
        self.rank(genes, batch.outputs);
        let elapsed_us = batch.elapsed_us;

        let (output, params) = match self.best() {
            Some(best) => (best.fitness, best.genes.clone()),
            None => (f64::INFINITY, Vec::new()),
        };
        Ok(Step {
            output,
            gradient: vec![0.0; params.len()],
            params,
            elapsed_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::EstimatorSetting;
    use crate::objective::{EvalArgs, EvalRequest, Evaluation, Objective};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct CountingSphere {
        batch_sizes: std::sync::Mutex<Vec<usize>>,
        calls: AtomicUsize,
    }

    impl Objective for CountingSphere {
        fn evaluate(&self, req: &EvalRequest<'_>, _rng: &mut RunRng) -> SweepResult<Evaluation> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.batch_sizes.lock().unwrap().push(req.batch.len());
            Ok(Evaluation {
                outputs: req
                    .batch
                    .iter()
                    .map(|p| p.iter().map(|x| x * x).sum())
                    .collect(),
                gradient: Vec::new(),
                elapsed_us: 7.0,
            })
        }
    }

    fn args() -> EvalArgs {
        EvalArgs {
            program: "sphere".into(),
            estimator: EstimatorSetting::crisp_reference(),
            stddev: 0.0,
            seed: 0,
            nreps: 1,
        }
    }

    #[test]
    fn test_one_batched_call_per_generation() {
        let objective = CountingSphere {
            batch_sizes: Default::default(),
            calls: AtomicUsize::new(0),
        };
        let mut ctx = EvalContext::new(&objective, args(), 3, crate::rng_util::seeded(5));
        let params = GeneticParams {
            pop_size: 12,
            ..GeneticParams::default()
        };
        let mut ga = GeneticSearch::new(params);
        let init = ParamInit::Uniform { low: -5.0, high: 5.0, dim: 3 };

        let step = ga.initialize(&mut ctx, vec![1.0, 1.0, 1.0], &init).unwrap();
        assert_eq!(step.output, 3.0);
        assert_eq!(step.params, vec![1.0, 1.0, 1.0]);
        assert_eq!(ga.population_size(), 12);

        let mut best = f64::INFINITY;
        let mut current = step.params;
        for _ in 0..5 {
            let step = ga.update(&mut ctx, current).unwrap();
            assert_eq!(step.elapsed_us, 7.0);
            // Elitism keeps the best fitness monotone.
            assert!(step.output <= best.min(3.0));
            best = step.output;
            current = step.params;
        }
        assert_eq!(objective.calls.load(AtomicOrdering::SeqCst), 6);
        assert!(objective.batch_sizes.lock().unwrap().iter().all(|n| *n == 12));
    }

    #[test]
    fn test_tournament_size_floor() {
        let p = GeneticParams {
            pop_size: 5,
            ..GeneticParams::default()
        };
        assert_eq!(p.tournament_size(), 2);
        assert_eq!(GeneticParams::default().tournament_size(), 5);
    }

    #[test]
    fn test_crossover_swaps_tail() {
        let mut rng = crate::rng_util::seeded(1);
        for _ in 0..20 {
            let mut a = vec![0.0; 4];
            let mut b = vec![1.0; 4];
            GeneticSearch::crossover(&mut rng, &mut a, &mut b);
            let cut = a.iter().position(|x| *x == 1.0).unwrap_or(4);
            assert!(cut >= 1);
            assert!(a[cut..].iter().all(|x| *x == 1.0));
            assert!(b[cut..].iter().all(|x| *x == 0.0));
        }
    }
}
