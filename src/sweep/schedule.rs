use super::expand::ExecutionUnit;
use super::unit::{run_unit, RunOptions, UnitReport, UnitStatus};
use crate::error::{SweepError, SweepResult};
use crate::objective::Objective;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use tracing::{error, info};

/// Busy time of one simulated worker, ordered with `total_cmp`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Busy(f64);

impl Eq for Busy {}

impl PartialOrd for Busy {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Busy {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub fn worker_count(units: usize, max_parallel: usize) -> usize {
    units.min(max_parallel)
}

/// Makespan of assigning `durations` in order, each to the least busy of `workers`.
pub fn greedy_makespan(durations: &[f64], workers: usize) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    if workers == 0 {
        return f64::INFINITY;
    }
    let mut heap: BinaryHeap<Reverse<Busy>> = (0..workers).map(|_| Reverse(Busy(0.0))).collect();
    for &d in durations {
        if let Some(Reverse(Busy(least))) = heap.pop() {
            heap.push(Reverse(Busy(least + d)));
        }
    }
    heap.into_iter()
        .map(|Reverse(Busy(t))| t)
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurationEstimate {
    pub makespan_s: f64,
    pub finish: DateTime<Local>,
}

/// Advisory worst-case duration of a sweep; `None` when some unit is unbounded.
pub fn estimate_duration(
    units: &[ExecutionUnit],
    global_limit_s: Option<f64>,
    workers: usize,
) -> Option<DurationEstimate> {
    let durations: Vec<f64> = units
        .iter()
        .map(|u| u.worst_case_secs(global_limit_s))
        .collect();
    let makespan_s = greedy_makespan(&durations, workers);
    if !makespan_s.is_finite() {
        return None;
    }
    let millis = (makespan_s * 1000.0).round() as i64;
    let finish = ChronoDuration::try_milliseconds(millis)
        .and_then(|d| Local::now().checked_add_signed(d))?;
    Some(DurationEstimate { makespan_s, finish })
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub units: Vec<UnitReport>,
}

impl SweepReport {
    pub fn completed_runs(&self) -> usize {
        self.units.iter().map(|u| u.completed).sum()
    }

    pub fn skipped_runs(&self) -> usize {
        self.units.iter().map(|u| u.skipped).sum()
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| u.status() == UnitStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failed_units().next().is_none()
    }
}

/// Drives every unit to completion on a fixed pool of workers pulling from a shared queue.
///
/// A sweep-fatal error in any unit stops workers from taking further units and is
/// returned once the units already in flight have finished.
pub fn run_sweep(
    objective: &dyn Objective,
    units: Vec<ExecutionUnit>,
    opts: &RunOptions,
    max_parallel: usize,
) -> SweepResult<SweepReport> {
    let total = units.len();
    let workers = worker_count(total, max_parallel);
    if workers == 0 {
        return Ok(SweepReport::default());
    }
    fs::create_dir_all(&opts.out_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sweep-worker-{}", i))
        .build()
        .map_err(|e| SweepError::Pool(e.to_string()))?;

    let (work_tx, work_rx) = crossbeam_channel::unbounded::<ExecutionUnit>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<UnitReport>();
    for unit in units {
        work_tx
            .send(unit)
            .map_err(|e| SweepError::Pool(e.to_string()))?;
    }
    drop(work_tx);

    info!("⚙️  running {} units on {} workers", total, workers);
    let finished = AtomicUsize::new(0);
    let aborted = AtomicBool::new(false);

    pool.scope(|s| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let finished = &finished;
            let aborted = &aborted;
            s.spawn(move |_| {
                for unit in work_rx.iter() {
                    if aborted.load(AtomicOrdering::SeqCst) {
                        break;
                    }
                    let report = run_unit(objective, &unit, opts);
                    if report.is_sweep_fatal() {
                        aborted.store(true, AtomicOrdering::SeqCst);
                    }
                    let n = finished.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                    info!("📦 [{}/{}] {}", n, total, report.label);
                    if done_tx.send(report).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut units: Vec<UnitReport> = done_rx.iter().collect();
    if let Some(pos) = units.iter().position(UnitReport::is_sweep_fatal) {
        let report = units.swap_remove(pos);
        if let Some(e) = report.error {
            error!(
                "🛑 sweep aborted by {} after {}/{} units",
                report.label,
                finished.load(AtomicOrdering::SeqCst),
                total
            );
            return Err(e);
        }
    }

    Ok(SweepReport { units })
}
