//! Ordered, fail-fast execution of external programs against staged evidence.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::StepFailure;
use crate::model::{LogChannel, StepSpec};

/// Separator written around each step header.
pub const HRULE: &str = "-----------------------------------------------------------------\n";

/// Execution log shared by every step of a pipeline.
///
/// Children with [`LogChannel::Redirect`] get duplicated handles of the same open
/// file, so their stdout and stderr land interleaved, in real time, right after
/// the step header.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: tokio::fs::File,
}

impl LogSink {
    /// Create (or truncate) the log file at `path`. Opened in append mode, so
    /// programs writing the same file themselves are never overwritten.
    pub async fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.set_len(0).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await
    }

    async fn write_header(&mut self, index: usize, total: usize, step: &StepSpec) -> io::Result<()> {
        let header = format!(
            "{HRULE}[{}/{}] {}\n{:?}\n{HRULE}",
            index + 1,
            total,
            step.name,
            step.argv()
        );
        self.file.write_all(header.as_bytes()).await?;
        self.file.flush().await
    }

    async fn child_stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let out = self.file.try_clone().await?.into_std().await;
        let err = out.try_clone()?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }
}

/// Wall-clock milliseconds since the epoch; 0 if the clock is before it.
fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Per-step record, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub name: String,
    pub argv: Vec<String>,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    /// `None` if the program never launched or was killed by a signal.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

/// What a pipeline run did. Only executed steps appear in `steps`.
#[derive(Debug)]
pub struct PipelineResult {
    pub steps: Vec<StepResult>,
    pub failure: Option<StepFailure>,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<Vec<StepResult>, StepFailure> {
        match self.failure {
            None => Ok(self.steps),
            Some(failure) => Err(failure),
        }
    }
}

/// Run `steps` strictly in order, stopping at the first one that does not exit 0.
pub async fn run_steps(steps: &[StepSpec], log: &mut LogSink) -> PipelineResult {
    let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let started_at_ms = epoch_ms();
        info!(step = %step.name, index, total = steps.len(), "running step");

        let outcome = run_step(index, steps.len(), step, log).await;
        let exit_code = match &outcome {
            Ok(code) => *code,
            Err(StepFailure::Exit { code, .. }) => *code,
            Err(_) => None,
        };

        results.push(StepResult {
            index,
            name: step.name.clone(),
            argv: step.argv(),
            started_at_ms,
            finished_at_ms: epoch_ms(),
            exit_code,
            succeeded: outcome.is_ok(),
        });

        if let Err(failure) = outcome {
            warn!(step = %step.name, index, error = %failure, "step failed; aborting pipeline");
            return PipelineResult {
                steps: results,
                failure: Some(failure),
            };
        }
    }

    PipelineResult {
        steps: results,
        failure: None,
    }
}

async fn run_step(
    index: usize,
    total: usize,
    step: &StepSpec,
    log: &mut LogSink,
) -> Result<Option<i32>, StepFailure> {
    let log_path = log.path().to_path_buf();
    let log_failure = |source: io::Error| StepFailure::Log {
        path: log_path.clone(),
        source,
    };

    log.write_header(index, total, step).await.map_err(log_failure)?;

    let mut command = tokio::process::Command::new(&step.program);
    command
        .args(&step.args)
        .envs(step.env.iter())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(cwd) = &step.cwd {
        command.current_dir(cwd);
    }
    match &step.log {
        LogChannel::Redirect => {
            let (out, err) = log.child_stdio().await.map_err(log_failure)?;
            command.stdout(out).stderr(err);
        }
        LogChannel::Env(var) => {
            command.env(var, log.path());
        }
        LogChannel::Argv => {}
    }

    let status = match command.spawn() {
        Ok(mut child) => child.wait().await,
        Err(e) => Err(e),
    };

    match status {
        Ok(status) if status.success() => Ok(status.code()),
        Ok(status) => {
            let _ = log
                .write_line(&format!("step {} exited with {status}", step.name))
                .await;
            Err(StepFailure::Exit {
                index,
                name: step.name.clone(),
                code: status.code(),
            })
        }
        Err(source) => {
            let _ = log
                .write_line(&format!("step {} could not be launched: {source}", step.name))
                .await;
            Err(StepFailure::Launch {
                index,
                name: step.name.clone(),
                program: step.program.display().to_string(),
                source,
            })
        }
    }
}
