mod common;

use common::*;
use optsweep::error::SweepError;
use optsweep::experiment::Experiment;
use optsweep::seed::derive_seed;
use optsweep::sweep::{expand_units, run_sweep, runs_of, RunOptions, UnitStatus};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const TWO_OPTIMIZERS: &str = r#"{ "kind": "simulated_annealing" },
    { "kind": "genetic", "pop_size": 4 }"#;

fn sweep_experiment() -> Experiment {
    experiment(UNIFORM_2D, CRISP, TWO_OPTIMIZERS)
}

fn checkpoints(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with("_final_params.txt"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_second_sweep_makes_no_objective_calls() {
    let dir = tempdir().unwrap();
    let exp = sweep_experiment();
    let opts = opts(dir.path(), Some(4));

    let first = Bowl::default();
    let report = run_sweep(&first, expand_units(&exp, 3, false), &opts, 2).unwrap();
    assert!(report.is_success());
    assert_eq!(report.completed_runs(), 6);
    assert!(first.calls() > 0);
    assert_eq!(checkpoints(dir.path()).len(), 6);

    let second = Bowl::default();
    let report = run_sweep(&second, expand_units(&exp, 3, true), &opts, 4).unwrap();
    assert!(report.is_success());
    assert_eq!(report.completed_runs(), 0);
    assert_eq!(report.skipped_runs(), 6);
    assert_eq!(second.calls(), 0);
}

#[test]
fn test_rerun_after_deleting_checkpoint_is_identical() {
    let dir = tempdir().unwrap();
    let exp = sweep_experiment();
    let opts = opts(dir.path(), Some(10));

    run_sweep(&NoisyBowl, expand_units(&exp, 2, true), &opts, 3).unwrap();

    let units = expand_units(&exp, 2, false);
    let run = &runs_of(&units[0])[1];
    let paths = run.paths(&opts);
    let checkpoint = fs::read_to_string(&paths.checkpoint).unwrap();
    let results = fs::read_to_string(&paths.results).unwrap();

    fs::remove_file(&paths.checkpoint).unwrap();
    let report = run_sweep(&NoisyBowl, units, &opts, 1).unwrap();
    assert_eq!(report.completed_runs(), 1);
    assert_eq!(report.skipped_runs(), 3);

    assert_eq!(fs::read_to_string(&paths.checkpoint).unwrap(), checkpoint);
    assert_eq!(fs::read_to_string(&paths.results).unwrap(), results);
}

#[test]
fn test_failed_run_leaves_no_checkpoint_and_fails_its_unit() {
    let dir = tempdir().unwrap();
    let exp = experiment(UNIFORM_2D, CRISP, r#"{ "kind": "simulated_annealing" }"#);
    let opts = opts(dir.path(), Some(10));

    // Initial evaluation plus three (update, reference) pairs succeed; the fourth update fails.
    let report = run_sweep(&Failing::after(7), expand_units(&exp, 2, false), &opts, 1).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.units.len(), 1);
    let unit = &report.units[0];
    assert_eq!(unit.status(), UnitStatus::Failed);
    assert_eq!(unit.completed, 0);
    let err = unit.error.as_ref().unwrap().to_string();
    assert!(err.contains("Command to reproduce"));
    assert!(err.contains("bowl/bowl -s 1"));

    assert!(checkpoints(dir.path()).is_empty());
    // The partial result file of the failed run survives for inspection.
    let units = expand_units(&exp, 2, false);
    let first = &runs_of(&units[0])[0];
    let partial = fs::read_to_string(first.paths(&opts).results).unwrap();
    assert_eq!(partial.lines().count(), 5);
    // The unit stopped at its first failure.
    assert!(!runs_of(&units[0])[1].paths(&opts).results.exists());
}

#[test]
fn test_failing_unit_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let exp = sweep_experiment();
    let opts = RunOptions::builder()
        .max_steps(Some(0))
        .out_dir(dir.path())
        .build();

    // One worker, so units run in order: annealing takes the only good call, GA's batch fails.
    let report = run_sweep(&Failing::after(1), expand_units(&exp, 1, false), &opts, 1).unwrap();
    assert_eq!(report.units.len(), 2);
    assert_eq!(report.completed_runs(), 1);
    assert_eq!(report.failed_units().count(), 1);
    assert_eq!(checkpoints(dir.path()).len(), 1);
}

#[test]
fn test_configuration_error_aborts_the_sweep() {
    let dir = tempdir().unwrap();
    let exp = sweep_experiment();
    let opts = opts(dir.path(), Some(2));
    let objective = Misconfigured::default();

    // One worker: the first unit fails on its first call and the second never starts.
    let err = run_sweep(&objective, expand_units(&exp, 1, false), &opts, 1).unwrap_err();
    assert!(matches!(err, SweepError::Config(_)), "{}", err);
    assert!(err.is_fatal_for_sweep());
    assert_eq!(objective.calls(), 1);
    assert!(checkpoints(dir.path()).is_empty());
}

#[test]
fn test_distinct_hyper_parameters_get_their_own_files() {
    let dir = tempdir().unwrap();
    let exp = experiment(
        UNIFORM_2D,
        CRISP_AD,
        r#"{ "kind": "gradient_descent", "rule": { "rule": "adam", "lr": 0.01, "beta1": 0.9 } },
           { "kind": "gradient_descent", "rule": { "rule": "adam", "lr": 0.01, "beta1": 0.5 } },
           { "kind": "gradient_descent", "rule": { "rule": "sgd", "lr": 0.01 } },
           { "kind": "gradient_descent", "rule": { "rule": "sgd", "lr": 0.01, "momentum": 0.9 } }"#,
    );
    let opts = opts(dir.path(), Some(2));

    let report = run_sweep(&Bowl::default(), expand_units(&exp, 1, false), &opts, 2).unwrap();
    assert!(report.is_success());
    assert_eq!(report.completed_runs(), 4);
    assert_eq!(report.skipped_runs(), 0);
    assert_eq!(checkpoints(dir.path()).len(), 4);
}

#[test]
fn test_global_seed_changes_every_run() {
    let exp = sweep_experiment();
    let program = &exp.programs[0];
    assert_ne!(derive_seed(program, 0, 0), derive_seed(program, 0, 1));

    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    let opts_a = RunOptions::builder()
        .max_steps(Some(3))
        .global_seed(0)
        .out_dir(a.path())
        .build();
    let opts_b = RunOptions::builder()
        .max_steps(Some(3))
        .global_seed(1)
        .out_dir(b.path())
        .build();

    run_sweep(&NoisyBowl, expand_units(&exp, 1, false), &opts_a, 2).unwrap();
    run_sweep(&NoisyBowl, expand_units(&exp, 1, false), &opts_b, 2).unwrap();

    let names = checkpoints(a.path());
    assert_eq!(names, checkpoints(b.path()));
    for name in names {
        let results = name.replace("_final_params.txt", ".txt");
        assert_ne!(
            fs::read_to_string(a.path().join(&results)).unwrap(),
            fs::read_to_string(b.path().join(&results)).unwrap()
        );
    }
}
