use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a sweep.
///
/// Threshold misses and size-window exclusions are not errors: they surface as
/// `None` aggregates and silently filtered candidates respectively.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Malformed or inconsistent sweep specification
    #[error("invalid sweep configuration: {0}")]
    Config(String),

    /// A combined predictor slot asked for prior results that were never saved
    #[error("no saved best set for {kind} predictor at {}; run its sweep first or mark the slot exhaustive", .path.display())]
    MissingPrior { kind: String, path: PathBuf },

    /// Workload binary listed in the catalog does not exist
    #[error("workload binary {} does not exist", .0.display())]
    MissingBinary(PathBuf),

    /// Simulator ran but did not print the pass marker
    #[error(
        "simulator failed for configuration {config} on {}\n--- command ---\n{command}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}",
        .workload.display()
    )]
    SimulatorFailed {
        config: String,
        workload: PathBuf,
        command: String,
        stdout: String,
        stderr: String,
    },

    /// Output directory or hw_stats.json missing or malformed
    #[error("missing or invalid statistics artifact {}: {reason}", .path.display())]
    MissingArtifact { path: PathBuf, reason: String },

    /// Workload logged zero cache references or zero branches
    #[error("workload {} logged no {counter} for configuration {config}", .workload.display())]
    EmptyWorkload {
        config: String,
        workload: PathBuf,
        counter: &'static str,
    },

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
