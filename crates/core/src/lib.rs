#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared execution contract for evidence analyzers: storage staging, applicability,
//! step pipelines, archival and the task runner every analyzer plugin goes through.

pub mod api;
pub mod applicability;
pub mod archive;
pub mod copy;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod storage;

pub use error::{AnalyzerError, StepFailure};
pub use runner::{Analyzer, Processing, TaskContext};
pub use storage::Storage;
