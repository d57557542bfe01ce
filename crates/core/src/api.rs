use serde::{Deserialize, Serialize};

use crate::model::{AnalyzerTask, ExecutionResult, Guid};

/// Agent claim request: ask the scheduler for the next task of one analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub analyzer: String,
}

/// Agent claim response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub task: Option<AnalyzerTask>,
}

/// Agent complete request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompleteRequest {
    pub analyzer: String,
    pub case_id: Guid,
    pub collection_id: Guid,
    pub success: bool,
    /// Failure kind and message, for operator diagnostics only.
    #[serde(default)]
    pub error: Option<String>,
}

impl CompleteRequest {
    pub fn from_result(task: &AnalyzerTask, result: &ExecutionResult) -> Self {
        Self {
            analyzer: task.analysis.analyzer.clone(),
            case_id: task.case_id(),
            collection_id: task.collection_id(),
            success: result.is_success(),
            error: result.error().map(|e| format!("{}: {e}", e.kind())),
        }
    }
}

/// Agent complete response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub ok: bool,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyzerError;
    use crate::model::{AnalysisRef, EvidenceRef, Priority};

    fn task() -> AnalyzerTask {
        AnalyzerTask {
            collection: EvidenceRef {
                case_id: Guid::new_v4(),
                collection_id: Guid::new_v4(),
                hostname: Some("ws-01".into()),
                opsystem: None,
                tags: Default::default(),
                collected_at_ms: None,
            },
            analysis: AnalysisRef {
                analyzer: "plaso".into(),
                priority: Priority::High,
            },
        }
    }

    #[test]
    fn task_documents_use_snake_case_enums_and_defaults() {
        let case_id = Guid::new_v4();
        let collection_id = Guid::new_v4();
        let json = serde_json::json!({
            "collection": {
                "case_id": case_id,
                "collection_id": collection_id,
                "opsystem": "windows",
                "tags": ["evtx"]
            },
            "analysis": { "analyzer": "hayabusa", "priority": "high" }
        });

        let task: AnalyzerTask = serde_json::from_value(json).unwrap();
        assert_eq!(task.case_id(), case_id);
        assert_eq!(task.collection.hostname, None);
        assert_eq!(task.analysis.priority, Priority::High);
        assert!(task.collection.tags.contains("evtx"));

        let missing_priority: AnalysisRef =
            serde_json::from_value(serde_json::json!({ "analyzer": "plaso" })).unwrap();
        assert_eq!(missing_priority.priority, Priority::Medium);
    }

    #[test]
    fn completion_carries_boolean_and_failure_kind() {
        let task = task();
        let ok = CompleteRequest::from_result(
            &task,
            &ExecutionResult::Succeeded {
                archive_path: "/tmp/analysis.zip".into(),
            },
        );
        assert!(ok.success);
        assert_eq!(ok.error, None);

        let failed = CompleteRequest::from_result(
            &task,
            &ExecutionResult::Failed {
                error: AnalyzerError::Precondition("collection tags are empty".into()),
            },
        );
        assert!(!failed.success);
        assert_eq!(
            failed.error.as_deref(),
            Some("precondition: precondition failed: collection tags are empty")
        );
        assert_eq!(failed.case_id, task.case_id());
    }
}
