//! The per-run random stream and the distributions drawn from it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp1, StandardNormal};

/// Random stream owned by a single run.
pub type RunRng = StdRng;

pub fn seeded(seed: u64) -> RunRng {
    StdRng::seed_from_u64(seed)
}

/// Generate a random `f64` in the range `[low, high)`. An empty range yields `low`.
#[inline]
pub fn f64_range(rng: &mut RunRng, low: f64, high: f64) -> f64 {
    if low < high {
        rng.gen_range(low..high)
    } else {
        low
    }
}

#[inline]
pub fn normal(rng: &mut RunRng, mean: f64, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + std * z
}

/// Laplace variate with location 0: an exponential magnitude with a random sign.
pub fn laplace(rng: &mut RunRng, scale: f64) -> f64 {
    let magnitude: f64 = rng.sample(Exp1);
    if rng.gen::<bool>() {
        scale * magnitude
    } else {
        -scale * magnitude
    }
}
