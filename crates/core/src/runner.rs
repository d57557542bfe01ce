//! The execution contract every analyzer goes through:
//! Validating → Staging → Processing → Finalizing.

use async_trait::async_trait;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::applicability::{applies, Applicability};
use crate::archive::{archive_dir, CancelFlag, ScratchGuard};
use crate::copy::copy_evidence;
use crate::error::{AnalyzerError, StepFailure};
use crate::model::{AnalyzerDescriptor, AnalyzerTask, ExecutionResult, StagedPaths, StepSpec};
use crate::pipeline::{run_steps, LogSink};
use crate::storage::Storage;

/// How an analyzer turns staged evidence into output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processing {
    /// Run external programs in order, stopping at the first failure.
    Pipeline(Vec<StepSpec>),
    /// Copy the evidence as-is into the scratch directory.
    CopyEvidence,
}

/// Everything an analyzer may look at when planning its processing.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub task: &'a AnalyzerTask,
    pub paths: &'a StagedPaths,
    /// Capabilities matched against the evidence; empty for universal analyzers.
    pub applicability: &'a Applicability,
}

/// A plugin. Implementors describe themselves and plan their processing; staging,
/// archiving and cleanup are shared.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Static identity and capabilities.
    fn descriptor(&self) -> &AnalyzerDescriptor;

    /// Check task preconditions. Runs before any storage is touched.
    ///
    /// By default, analyzers without declared capabilities (and no host
    /// requirement) apply to everything; the rest go through [`applies`].
    fn validate(&self, task: &AnalyzerTask) -> Result<Applicability, AnalyzerError> {
        let descriptor = self.descriptor();
        if descriptor.tags.is_empty() && !descriptor.requires_host {
            return Ok(Applicability::default());
        }
        applies(descriptor, &task.collection)
    }

    fn processing(&self, ctx: &TaskContext<'_>) -> Processing;

    async fn execute(&self, storage: &Storage, task: &AnalyzerTask) -> ExecutionResult {
        execute(self, storage, task).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerState {
    Validating,
    Staging,
    Processing,
    Finalizing,
}

/// Run `task` through `analyzer`. Never returns an error: every failure is folded
/// into [`ExecutionResult::Failed`].
pub async fn execute<A>(analyzer: &A, storage: &Storage, task: &AnalyzerTask) -> ExecutionResult
where
    A: Analyzer + ?Sized,
{
    let descriptor = analyzer.descriptor();
    let span = info_span!(
        "analysis",
        analyzer = %descriptor.name,
        case = %task.case_id(),
        collection = %task.collection_id(),
        exec_id = %Ulid::new(),
    );

    async {
        let result = run(analyzer, storage, task).await;
        match &result {
            ExecutionResult::Succeeded { archive_path } => {
                info!(archive = %archive_path.display(), "analysis succeeded");
            }
            ExecutionResult::Failed { error } => {
                warn!(kind = error.kind(), error = %error, "analysis failed");
            }
        }
        result
    }
    .instrument(span)
    .await
}

async fn run<A>(analyzer: &A, storage: &Storage, task: &AnalyzerTask) -> ExecutionResult
where
    A: Analyzer + ?Sized,
{
    let descriptor = analyzer.descriptor();

    debug!(state = ?RunnerState::Validating);
    if task.analysis.analyzer != descriptor.name {
        return failed(AnalyzerError::Precondition(format!(
            "task targets analyzer {}, not {}",
            task.analysis.analyzer, descriptor.name
        )));
    }
    let applicability = match analyzer.validate(task) {
        Ok(applicability) => applicability,
        Err(error) => return failed(error),
    };

    debug!(state = ?RunnerState::Staging);
    let paths = storage.resolve(task.case_id(), task.collection_id(), &descriptor.name);
    if let Err(e) = tokio::fs::remove_file(&paths.archive_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(archive = %paths.archive_path.display(), error = %e, "could not remove previous archive");
        }
    }
    let scratch = match ScratchGuard::stage(paths.scratch_dir.clone()).await {
        Ok(scratch) => scratch.covering(paths.archive_path.clone()),
        Err(source) => {
            return failed(AnalyzerError::Staging {
                path: paths.scratch_dir,
                source,
            })
        }
    };

    debug!(state = ?RunnerState::Processing, scratch = %scratch.path().display());
    let ctx = TaskContext {
        task,
        paths: &paths,
        applicability: &applicability,
    };
    let cancel = scratch.cancel_flag();
    let processed = process(analyzer.processing(&ctx), &paths, &cancel).await;

    debug!(state = ?RunnerState::Finalizing);
    let outcome = match processed {
        Ok(()) => archive_dir(&paths.scratch_dir, &paths.archive_path, &cancel)
            .await
            .map_err(|source| AnalyzerError::Archival {
                path: paths.archive_path.clone(),
                source,
            }),
        Err(error) => Err(error),
    };
    if let Err(e) = scratch.reclaim().await {
        warn!(scratch = %paths.scratch_dir.display(), error = %e, "failed to reclaim scratch directory");
    }

    match outcome {
        Ok(archive_path) => ExecutionResult::Succeeded { archive_path },
        Err(error) => failed(error),
    }
}

async fn process(
    processing: Processing,
    paths: &StagedPaths,
    cancel: &CancelFlag,
) -> Result<(), AnalyzerError> {
    let mut log = LogSink::create(&paths.log_path)
        .await
        .map_err(|source| StepFailure::Log {
            path: paths.log_path.clone(),
            source,
        })?;

    match processing {
        Processing::Pipeline(steps) => {
            let steps = run_steps(&steps, &mut log).await.into_result()?;
            debug!(steps = steps.len(), "pipeline completed");
        }
        Processing::CopyEvidence => {
            let line = format!(
                "copying {} -> {}",
                paths.input_dir.display(),
                paths.scratch_dir.display()
            );
            log.write_line(&line).await.map_err(|source| StepFailure::Log {
                path: paths.log_path.clone(),
                source,
            })?;
            let bytes = copy_evidence(&paths.input_dir, &paths.scratch_dir, cancel).await?;
            debug!(bytes, "evidence copied");
        }
    }
    Ok(())
}

fn failed(error: AnalyzerError) -> ExecutionResult {
    ExecutionResult::Failed { error }
}
