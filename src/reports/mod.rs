use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use optsweep::sweep::{runs_of, ExecutionUnit, RunOptions, SweepReport};

pub fn print_plan(units: &[ExecutionUnit], opts: &RunOptions) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Program").add_attribute(Attribute::Bold),
        Cell::new("Estimator"),
        Cell::new("Optimizer").fg(Color::Cyan),
        Cell::new("Reps"),
        Cell::new("Runs"),
        Cell::new("Done").fg(Color::Green),
        Cell::new("Worst case (s)"),
    ]);

    for i in [0, 4, 5, 6, 7] {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }

    let mut total_runs = 0;
    let mut total_done = 0;
    for (i, unit) in units.iter().enumerate() {
        let runs = runs_of(unit);
        let done = runs.iter().filter(|r| r.paths(opts).is_complete()).count();
        total_runs += runs.len();
        total_done += done;

        let reps = unit
            .replications
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let worst = unit.worst_case_secs(opts.time_limit_s);
        let done_cell = if done == runs.len() {
            Cell::new(format!("{}/{}", done, runs.len())).fg(Color::Green)
        } else {
            Cell::new(format!("{}/{}", done, runs.len()))
        };

        table.add_row(vec![
            Cell::new(i),
            Cell::new(&unit.program.name).add_attribute(Attribute::Bold),
            Cell::new(unit.estimator.name),
            Cell::new(unit.optimizer.label()).fg(Color::Cyan),
            Cell::new(reps),
            Cell::new(runs.len()),
            done_cell,
            Cell::new(if worst.is_finite() {
                format!("{:.0}", worst)
            } else {
                "∞".to_string()
            }),
        ]);
    }

    println!("\n{}", table);
    println!(
        "{} units, {} runs, {} already checkpointed",
        units.len(),
        total_runs,
        total_done
    );
}

pub fn print_sweep_summary(report: &SweepReport) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("Sweep Summary").add_attribute(Attribute::Bold),
        Cell::new("Count"),
    ]);
    if let Some(col) = table.column_mut(1) {
        col.set_cell_alignment(CellAlignment::Right);
    }

    let failed: Vec<_> = report.failed_units().collect();
    table.add_row(vec![Cell::new("Units"), Cell::new(report.units.len())]);
    table.add_row(vec![
        Cell::new("Runs completed").fg(Color::Green),
        Cell::new(report.completed_runs()),
    ]);
    table.add_row(vec![
        Cell::new("Runs skipped (checkpointed)"),
        Cell::new(report.skipped_runs()),
    ]);
    table.add_row(vec![
        Cell::new("Units failed").fg(Color::Red),
        Cell::new(failed.len()),
    ]);
    println!("\n{}", table);

    for unit in failed {
        if let Some(e) = &unit.error {
            println!("❌ {}\n   {}", unit.label, e);
        }
    }
}
