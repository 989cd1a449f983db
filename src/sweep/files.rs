//! Per-run output files: the incremental result table and the final-parameters checkpoint.

use crate::error::{SweepError, SweepResult};
use crate::experiment::{EstimatorSetting, ProgramConfig};
use crate::optimizer::OptimizerSpec;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Filename stem unique to one fully resolved run.
pub fn file_stem(
    program: &ProgramConfig,
    stddev: f64,
    seed: i64,
    nreps: u32,
    setting: &EstimatorSetting,
    optimizer: &OptimizerSpec,
    rep: u32,
) -> String {
    format!(
        "{}_stddev={}_seed={}_nreps={}-{}_{}_{}-{}-rep_{:04}",
        program.clean_name(),
        stddev,
        seed,
        nreps,
        setting.kind,
        setting.label(),
        optimizer.label(),
        optimizer.fingerprint(),
        rep
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub results: PathBuf,
    pub checkpoint: PathBuf,
}

impl RunPaths {
    pub fn new<P: AsRef<Path>>(out_dir: P, stem: &str) -> Self {
        let dir = out_dir.as_ref();
        Self {
            results: dir.join(format!("{}.txt", stem)),
            checkpoint: dir.join(format!("{}_final_params.txt", stem)),
        }
    }

    /// The checkpoint alone decides whether a run is complete.
    pub fn is_complete(&self) -> bool {
        self.checkpoint.exists()
    }
}

fn param_header(dim: usize) -> impl Iterator<Item = String> {
    (0..dim).map(|i| format!("x{}", i))
}

/// One row of the result table.
pub struct ResultRow<'a> {
    pub step: u64,
    pub output: f64,
    pub reference: f64,
    pub params: &'a [f64],
    pub gradient: &'a [f64],
    pub cumulative_us: f64,
}

/// Appends rows to a result file, flushing after each so a killed run leaves a parseable prefix.
pub struct ResultWriter {
    writer: csv::Writer<File>,
    dim: usize,
    dump_params: bool,
}

impl ResultWriter {
    pub fn create<P: AsRef<Path>>(path: P, dim: usize, dump_params: bool) -> SweepResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        let mut header = vec!["step".to_string(), "y".to_string(), "y_crisp".to_string()];
        if dump_params {
            header.extend(param_header(dim));
            header.extend((0..dim).map(|i| format!("dydx{}", i)));
            header.push("deriv_norm".to_string());
        }
        header.push("cumulative_time".to_string());
        writer.write_record(&header)?;
        writer.flush()?;

        Ok(Self {
            writer,
            dim,
            dump_params,
        })
    }

    pub fn write_row(&mut self, row: &ResultRow<'_>) -> SweepResult<()> {
        let mut record = vec![
            row.step.to_string(),
            row.output.to_string(),
            row.reference.to_string(),
        ];
        if self.dump_params {
            if row.params.len() != self.dim || row.gradient.len() != self.dim {
                return Err(SweepError::Dimension {
                    expected: self.dim,
                    found: row.params.len().max(row.gradient.len()),
                });
            }
            record.extend(row.params.iter().map(f64::to_string));
            record.extend(row.gradient.iter().map(f64::to_string));
            let norm = row.gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            record.push(norm.to_string());
        }
        record.push(row.cumulative_us.to_string());
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Publishes the final parameters via a temporary sibling and a rename.
pub fn write_checkpoint<P: AsRef<Path>>(path: P, params: &[f64]) -> SweepResult<()> {
    let path = path.as_ref();
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(param_header(params.len()))?;
        writer.write_record(params.iter().map(f64::to_string))?;
        writer.flush()?;
    }
    File::open(&tmp)?.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> SweepResult<Vec<f64>> {
    let mut reader = csv::Reader::from_path(path)?;
    let record = match reader.records().next() {
        Some(record) => record?,
        None => return Err(SweepError::Config("checkpoint holds no parameter row".into())),
    };
    record
        .iter()
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| SweepError::Config(format!("bad checkpoint value '{}': {}", v, e)))
        })
        .collect()
}
