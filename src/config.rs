use crate::error::{SweepError, SweepResult};
use crate::sweep::RunOptions;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sweep-wide budgets and scheduling knobs.
#[derive(Args, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepParams {
    /// Optimizer steps per run; unbounded when omitted.
    #[arg(short = 's', long, visible_alias = "num_steps")]
    pub num_steps: Option<u64>,

    #[arg(short = 'r', long, visible_alias = "num_macroreps", default_value_t = 1)]
    pub num_macroreps: u32,

    /// Schedule every macro-replication as its own unit.
    #[arg(long, visible_alias = "parallelize_macroreps", default_value_t = false)]
    pub parallelize_macroreps: bool,

    /// Worker count; defaults to the available parallelism.
    #[arg(short = 'p', long, visible_alias = "max_processes")]
    pub max_processes: Option<usize>,

    /// Cumulative estimation time per run, in seconds.
    #[arg(short = 't', long, visible_alias = "time_limit")]
    pub time_limit: Option<f64>,

    /// Also record parameters, gradient and gradient norm per step.
    #[arg(long, visible_alias = "dump_params", default_value_t = false)]
    pub dump_params: bool,

    #[arg(long, visible_alias = "global_seed", default_value_t = 0)]
    pub global_seed: u64,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            num_steps: None,
            num_macroreps: 1,
            parallelize_macroreps: false,
            max_processes: None,
            time_limit: None,
            dump_params: false,
            global_seed: 0,
        }
    }
}

impl SweepParams {
    pub fn max_parallel(&self) -> usize {
        self.max_processes.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn validate(&self) -> SweepResult<()> {
        if let Some(t) = self.time_limit {
            if !(t >= 0.0) {
                return Err(SweepError::Config(format!(
                    "--time-limit must be non-negative, got {}",
                    t
                )));
            }
        }
        if self.max_processes == Some(0) {
            return Err(SweepError::Config(
                "--max-processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn run_options<P: AsRef<Path>>(&self, out_dir: P) -> RunOptions {
        RunOptions::builder()
            .max_steps(self.num_steps)
            .time_limit_s(self.time_limit)
            .dump_params(self.dump_params)
            .global_seed(self.global_seed)
            .out_dir(out_dir.as_ref())
            .build()
    }
}

/// Results live next to the experiment unless redirected.
pub fn resolve_out_dir(experiment: &Path, out_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = out_dir {
        return dir.to_path_buf();
    }
    let base = if experiment.is_dir() {
        experiment
    } else {
        experiment.parent().unwrap_or_else(|| Path::new("."))
    };
    base.join("results")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        sweep: SweepParams,
    }

    #[test]
    fn test_underscore_aliases_parse() {
        let cli = TestCli::parse_from([
            "test",
            "--num_steps",
            "5",
            "--num-macroreps",
            "3",
            "--parallelize_macroreps",
            "--global_seed",
            "9",
            "-t",
            "1.5",
        ]);
        assert_eq!(cli.sweep.num_steps, Some(5));
        assert_eq!(cli.sweep.num_macroreps, 3);
        assert!(cli.sweep.parallelize_macroreps);
        assert_eq!(cli.sweep.global_seed, 9);
        assert_eq!(cli.sweep.time_limit, Some(1.5));
    }

    #[test]
    fn test_defaults_are_unbounded() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.sweep, SweepParams::default());
        let opts = cli.sweep.run_options("out");
        assert_eq!(opts.max_steps, None);
        assert_eq!(opts.time_limit_s, None);
        assert_eq!(opts.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_validation() {
        let bad = SweepParams {
            max_processes: Some(0),
            ..SweepParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = SweepParams {
            time_limit: Some(-1.0),
            ..SweepParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_out_dir_defaults_next_to_experiment_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("experiment.json");
        assert_eq!(resolve_out_dir(&file, None), dir.path().join("results"));
        assert_eq!(resolve_out_dir(dir.path(), None), dir.path().join("results"));
        assert_eq!(
            resolve_out_dir(&file, Some(Path::new("/tmp/x"))),
            PathBuf::from("/tmp/x")
        );
    }
}
