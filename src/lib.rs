pub mod config;
pub mod error;
pub mod experiment;
pub mod objective;
pub mod optimizer;
pub mod rng_util;
pub mod seed;
pub mod sweep;
