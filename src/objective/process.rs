//! Objective backed by compiled estimator programs, one executable per
//! program and estimator (`<program>_crisp`, `<program>_dgo`, ...).

use super::{EvalArgs, EvalRequest, Evaluation, Objective};
use crate::error::{SweepError, SweepResult};
use crate::experiment::{EstimatorKind, Scalar};
use crate::rng_util::{self, RunRng};
use itertools::Itertools;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProgramObjective {
    programs_dir: PathBuf,
}

/// Lines of interest in an estimator program's stdout.
#[derive(Debug, Default, Clone, PartialEq)]
struct ProgramOutput {
    expectations: Vec<f64>,
    /// Derivatives grouped by the expectation line they follow.
    derivatives: Vec<Vec<f64>>,
    durations: Vec<f64>,
}

impl ProgramOutput {
    fn parse(stdout: &str) -> Result<Self, String> {
        let mut out = ProgramOutput::default();
        for line in stdout.lines() {
            let line = line.trim();
            if let Some(v) = line.strip_prefix("expectation:") {
                out.expectations.push(parse_number(v)?);
                out.derivatives.push(Vec::new());
            } else if let Some(v) = line.strip_prefix("derivative:") {
                let d = parse_number(v)?;
                match out.derivatives.last_mut() {
                    Some(group) => group.push(d),
                    None => out.derivatives.push(vec![d]),
                }
            } else if let Some(v) = line.strip_prefix("estimation_duration:") {
                let v = v.trim();
                let v = v.strip_suffix("us").unwrap_or(v);
                out.durations.push(parse_number(v)?);
            }
        }
        if out.expectations.is_empty() {
            return Err("no expectation line".to_string());
        }
        Ok(out)
    }

    fn all_derivatives(&self) -> Vec<f64> {
        self.derivatives.iter().flatten().copied().collect()
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let v = s.parse::<f64>().map_err(|e| format!("'{}': {}", s, e))?;
    if v.is_nan() {
        return Err(format!("'{}': not a number", s));
    }
    Ok(v)
}

fn required<'a>(args: &'a EvalArgs, key: &str) -> SweepResult<&'a Scalar> {
    args.estimator.get(key).ok_or_else(|| {
        SweepError::Config(format!(
            "estimator '{}' is missing parameter '{}'",
            args.estimator.kind, key
        ))
    })
}

impl ProgramObjective {
    pub fn new<P: AsRef<Path>>(programs_dir: P) -> Self {
        Self {
            programs_dir: programs_dir.as_ref().to_path_buf(),
        }
    }

    pub fn executable(&self, program: &str, suffix: &str) -> PathBuf {
        self.programs_dir.join(format!("{}_{}", program, suffix))
    }

    /// Runs one program invocation and parses its stdout.
    fn run(&self, exe: &Path, flags: &[String], stdin: &str) -> SweepResult<ProgramOutput> {
        let command = format!(
            "echo \"{}\" | {} {}",
            stdin,
            exe.display(),
            flags.join(" ")
        );
        debug!("objective call: {} {}", exe.display(), flags.join(" "));

        let objective_err = |reason: String| SweepError::Objective {
            command: command.clone(),
            reason,
        };

        let mut child = Command::new(exe)
            .args(flags)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| objective_err(format!("could not start: {}", e)))?;

        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin.as_bytes())
                .map_err(|e| objective_err(format!("could not write parameters: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| objective_err(format!("could not wait for exit: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(objective_err(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        ProgramOutput::parse(&stdout).map_err(|reason| SweepError::ObjectiveOutput {
            command: command.clone(),
            reason,
        })
    }

    fn base_flags(args: &EvalArgs, configs: usize, variance: f64) -> Vec<String> {
        vec![
            "-s".into(),
            args.seed.to_string(),
            "--nc".into(),
            configs.to_string(),
            "--nr".into(),
            args.nreps.to_string(),
            "--var".into(),
            variance.to_string(),
        ]
    }

    fn crisp(&self, args: &EvalArgs, batch: &[Vec<f64>]) -> SweepResult<Evaluation> {
        let num_samples = args.estimator.num_samples();
        // A single sample means no perturbation.
        let stddev = if num_samples == 1 { 0.0 } else { args.stddev };
        let enable_ad = args.estimator.enable_ad();
        let suffix = if enable_ad { "crisp_ad" } else { "crisp" };

        let mut flags = Self::base_flags(args, batch.len(), stddev * stddev);
        flags.push("--ns".into());
        flags.push(num_samples.to_string());

        let stdin = batch.iter().flatten().join("\n");
        let out = self.run(&self.executable(&args.program, suffix), &flags, &stdin)?;

        Ok(Evaluation {
            outputs: out.expectations.clone(),
            gradient: if enable_ad {
                out.all_derivatives()
            } else {
                Vec::new()
            },
            elapsed_us: out.durations.iter().sum(),
        })
    }

    /// dgo, pgo and reinforce: a single configuration per call.
    fn smoothed(&self, args: &EvalArgs, params: &[f64]) -> SweepResult<Evaluation> {
        let mut flags = Self::base_flags(args, 1, args.stddev * args.stddev);
        flags.push("--ns".into());
        flags.push(args.estimator.num_samples().to_string());

        let suffix = args.estimator.kind.to_string();
        let stdin = params.iter().join("\n");
        let out = self.run(&self.executable(&args.program, &suffix), &flags, &stdin)?;

        let gradient = match args.estimator.kind {
            // dgo restarts its derivative list on every expectation line
            EstimatorKind::Dgo => out.derivatives.last().cloned().unwrap_or_default(),
            _ => out.all_derivatives(),
        };

        Ok(Evaluation {
            outputs: vec![out.expectations[0]],
            gradient,
            elapsed_us: out.durations.last().copied().unwrap_or(0.0),
        })
    }

    fn dgsi(
        &self,
        args: &EvalArgs,
        params: &[f64],
        rng: &mut RunRng,
    ) -> SweepResult<Evaluation> {
        let proportion = args
            .estimator
            .get("si_stddev_proportion")
            .and_then(Scalar::as_f64)
            .unwrap_or(1.0);
        let si_stddev = args.stddev * proportion;
        let sampling_stddev = (args.stddev * args.stddev - si_stddev * si_stddev)
            .max(0.0)
            .sqrt();

        let mut flags = Self::base_flags(args, 1, si_stddev * si_stddev);
        for (flag, key) in [("--np", "num_paths"), ("--rm", "restrict_mode"), ("--up_var", "use_dea")] {
            flags.push(flag.into());
            flags.push(required(args, key)?.to_string());
        }

        let exe = self.executable(&args.program, "dgsi");
        let num_samples = args.estimator.num_samples().max(1);

        let mut expectations = Vec::new();
        let mut gradient_sums = vec![0.0; params.len()];
        let mut gradient_counts = vec![0usize; params.len()];
        let mut elapsed_us = 0.0;

        for _ in 0..num_samples {
            let stdin = params
                .iter()
                .map(|p| p + rng_util::normal(rng, 0.0, sampling_stddev))
                .join(" ");
            let out = self.run(&exe, &flags, &stdin)?;

            expectations.extend_from_slice(&out.expectations);
            for group in &out.derivatives {
                for (i, d) in group.iter().enumerate().take(params.len()) {
                    gradient_sums[i] += d;
                    gradient_counts[i] += 1;
                }
            }
            elapsed_us += out.durations.iter().sum::<f64>();
        }

        let mean = expectations.iter().sum::<f64>() / expectations.len() as f64;
        let gradient = gradient_sums
            .iter()
            .zip(&gradient_counts)
            .map(|(s, &n)| if n == 0 { 0.0 } else { s / n as f64 })
            .collect();

        Ok(Evaluation {
            outputs: vec![mean],
            gradient,
            elapsed_us,
        })
    }
}

impl Objective for ProgramObjective {
    fn evaluate(&self, req: &EvalRequest<'_>, rng: &mut RunRng) -> SweepResult<Evaluation> {
        let args = req.args;
        if args.estimator.kind == EstimatorKind::Crisp {
            return self.crisp(args, req.batch);
        }

        let params = match req.batch {
            [single] => single,
            _ => {
                return Err(SweepError::Config(format!(
                    "estimator '{}' evaluates one parameter vector per call, got {}",
                    args.estimator.kind,
                    req.batch.len()
                )))
            }
        };

        match args.estimator.kind {
            EstimatorKind::Dgsi => self.dgsi(args, params, rng),
            _ => self.smoothed(args, params),
        }
    }
}
