use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a step pipeline (or the evidence copy standing in for one) stopped.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("step {index} ({name}) exited with status {}", exit_label(*code))]
    Exit {
        index: usize,
        name: String,
        /// `None` when the child was terminated by a signal.
        code: Option<i32>,
    },
    #[error("step {index} ({name}) could not launch {program}: {source}")]
    Launch {
        index: usize,
        name: String,
        program: String,
        source: io::Error,
    },
    #[error("log sink {} is not writable: {source}", path.display())]
    Log { path: PathBuf, source: io::Error },
    #[error("copying evidence from {} failed: {source}", from.display())]
    Copy { from: PathBuf, source: io::Error },
}

impl StepFailure {
    /// Index of the failing step, when the failure belongs to one.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Exit { index, .. } | Self::Launch { index, .. } => Some(*index),
            Self::Log { .. } | Self::Copy { .. } => None,
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Every way an analyzer execution can end in `Failed`.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Evidence metadata missing, or no capability shared with the evidence.
    /// Raised before any storage is touched.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("failed to stage scratch directory {}: {source}", path.display())]
    Staging { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Step(#[from] StepFailure),

    /// Processing succeeded but the scratch directory could not be packaged.
    #[error("failed to archive into {}: {source}", path.display())]
    Archival { path: PathBuf, source: io::Error },
}

impl AnalyzerError {
    /// Short machine-friendly label, used in logs and completion reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Staging { .. } => "staging",
            Self::Step(_) => "step",
            Self::Archival { .. } => "archival",
        }
    }
}
