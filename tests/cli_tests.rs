use assert_cmd::Command;
use regex::Regex;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

struct TestContext {
    _dir: TempDir,
    experiment_dir: PathBuf,
}

impl TestContext {
    fn new(experiment: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let experiment_dir = dir.path().join("bowl_sweep");
        fs::create_dir_all(&experiment_dir).unwrap();
        let mut f = File::create(experiment_dir.join("experiment.json")).unwrap();
        writeln!(f, "{}", experiment).unwrap();
        Self {
            _dir: dir,
            experiment_dir,
        }
    }

    fn results_dir(&self) -> PathBuf {
        self.experiment_dir.join("results")
    }
}

const EXPERIMENT: &str = r#"{
    "programs": [
        { "name": "bowl/bowl", "stddevs": [0.1, 0.5], "seeds": 1, "nreps": 10, "time_limit": 30,
          "params": { "kind": "uniform", "low": -1, "high": 1, "dim": 2 } }
    ],
    "estimators": [
        { "name": "crisp" },
        { "name": "pgo", "params": { "num_samples": [10, 100] } }
    ],
    "optimizers": [
        { "kind": "simulated_annealing" },
        { "kind": "gradient_descent", "rule": { "rule": "adam", "lr": 0.01 } }
    ]
}"#;

fn optsweep() -> Command {
    Command::new(env!("CARGO_BIN_EXE_optsweep"))
}

#[test]
fn test_plan_lists_filtered_units() {
    let ctx = TestContext::new(EXPERIMENT);
    let output = optsweep()
        .args(["plan", ctx.experiment_dir.to_str().unwrap(), "-r", "2", "-t", "10"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bowl/bowl"), "stdout: {}", stdout);
    assert!(stdout.contains("SA"));
    assert!(stdout.contains("Adam-lr_0.01"));
    // SA pairs with crisp, Adam with pgo; each has two stddevs, pgo two sample sizes.
    let summary = Regex::new(r"(\d+) units, (\d+) runs, (\d+) already checkpointed").unwrap();
    let caps = summary.captures(&stdout).expect("plan summary line");
    assert_eq!(&caps[1], "2");
    assert_eq!(&caps[2], "12");
    assert_eq!(&caps[3], "0");
    // Planning never writes anything.
    assert!(!ctx.results_dir().exists());
}

#[test]
fn test_run_fails_when_programs_are_missing() {
    let ctx = TestContext::new(EXPERIMENT);
    let missing = ctx.experiment_dir.join("no_such_programs");

    optsweep()
        .args([
            "run",
            ctx.experiment_dir.to_str().unwrap(),
            "--programs-dir",
            missing.to_str().unwrap(),
            "--num-steps",
            "1",
            "-p",
            "2",
        ])
        .assert()
        .failure();

    // Result files are opened before the first call; checkpoints never appear.
    let leftovers: Vec<_> = fs::read_dir(ctx.results_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_final_params.txt"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_invalid_experiment_is_rejected() {
    let bad = EXPERIMENT.replace(r#""num_samples": [10, 100]"#, r#""wrong": 1"#);
    let ctx = TestContext::new(&bad);
    optsweep()
        .args(["plan", ctx.experiment_dir.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_missing_experiment_is_rejected() {
    let ctx = TestContext::new(EXPERIMENT);
    optsweep()
        .args(["run", ctx.experiment_dir.join("nope.json").to_str().unwrap()])
        .assert()
        .failure();
}
