//! Local execution of task files, several analyses at once.

use std::collections::HashSet;
use std::path::PathBuf;

use analyzer_core::api::CompleteRequest;
use analyzer_core::model::{AnalyzerTask, ExecutionResult};
use analyzer_core::{Analyzer, AnalyzerError, Storage};
use analyzer_plugins::Registry;
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::task::JoinSet;

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    One(AnalyzerTask),
    Many(Vec<AnalyzerTask>),
}

/// Read every task file. Each holds a single task document or an array of them.
pub async fn load_tasks(paths: &[PathBuf]) -> Result<Vec<AnalyzerTask>> {
    let mut tasks = Vec::new();
    for path in paths {
        let s = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let file: TaskFile = serde_json::from_str(&s)
            .with_context(|| format!("parse task file {}", path.display()))?;
        match file {
            TaskFile::One(task) => tasks.push(task),
            TaskFile::Many(many) => tasks.extend(many),
        }
    }
    Ok(tasks)
}

/// Execute `tasks` concurrently, highest priority first, and return one completion
/// report per task in input order.
///
/// A repeated (case, collection, analyzer) triple would share its scratch directory
/// with the first one, so repeats are reported as failed without running. Ctrl-C
/// aborts every in-flight analysis; their scratch directories are reclaimed as the
/// executions are dropped.
pub async fn run_tasks(
    registry: &Registry,
    storage: &Storage,
    tasks: Vec<AnalyzerTask>,
) -> Result<Vec<CompleteRequest>> {
    let mut order: Vec<usize> = (0..tasks.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(tasks[i].analysis.priority));

    let mut reports: Vec<Option<CompleteRequest>> = vec![None; tasks.len()];
    let mut seen = HashSet::new();
    let mut set = JoinSet::new();

    for i in order {
        let task = &tasks[i];
        let triple = (task.case_id(), task.collection_id(), task.analysis.analyzer.clone());
        if !seen.insert(triple) {
            tracing::warn!(
                analyzer = %task.analysis.analyzer,
                case = %task.case_id(),
                collection = %task.collection_id(),
                "duplicate task skipped"
            );
            reports[i] = Some(rejected(task, "duplicate task"));
            continue;
        }
        let Some(analyzer) = registry.get(&task.analysis.analyzer) else {
            tracing::error!(analyzer = %task.analysis.analyzer, "unknown analyzer");
            reports[i] = Some(rejected(task, "analyzer not registered"));
            continue;
        };

        let task = task.clone();
        let storage = storage.clone();
        set.spawn(async move {
            let result = analyzer.execute(&storage, &task).await;
            (i, CompleteRequest::from_result(&task, &result))
        });
    }

    loop {
        tokio::select! {
            joined = set.join_next() => {
                let Some(joined) = joined else { break };
                let (i, report) = joined.context("analysis task panicked")?;
                reports[i] = Some(report);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(in_flight = set.len(), "interrupted, aborting analyses");
                set.abort_all();
                while set.join_next().await.is_some() {}
                anyhow::bail!("interrupted");
            }
        }
    }

    Ok(reports.into_iter().flatten().collect())
}

fn rejected(task: &AnalyzerTask, reason: &str) -> CompleteRequest {
    let result = ExecutionResult::Failed {
        error: AnalyzerError::Precondition(reason.to_string()),
    };
    CompleteRequest::from_result(task, &result)
}
