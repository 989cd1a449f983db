use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Objective call failed: {reason}\nCommand to reproduce:\n{command}")]
    Objective { command: String, reason: String },

    #[error("Unparseable objective output ({reason})\nCommand to reproduce:\n{command}")]
    ObjectiveOutput { command: String, reason: String },

    #[error("Parameter dimension mismatch: expected {expected}, found {found}")]
    Dimension { expected: usize, found: usize },

    #[error("Worker Pool Error: {0}")]
    Pool(String),
}

impl SweepError {
    /// Configuration errors abort the whole sweep; everything else only the owning unit.
    pub fn is_fatal_for_sweep(&self) -> bool {
        matches!(self, SweepError::Config(_) | SweepError::Pool(_))
    }
}

pub type SweepResult<T> = Result<T, SweepError>;
