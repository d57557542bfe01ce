use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalyzerError;

/// Identifier of a case or a collection.
pub type Guid = Uuid;

/// Operating system a collection was taken from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperatingSystem {
    Windows,
    Linux,
    Darwin,
}

impl OperatingSystem {
    /// Tag value the operating system contributes to applicability matching.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Darwin => "darwin",
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finalized evidence collection. Read-only from the analyzer's point of view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceRef {
    pub case_id: Guid,
    pub collection_id: Guid,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub opsystem: Option<OperatingSystem>,
    /// Free-form tags attached when the collection was finalized.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Collection timestamp (ms).
    #[serde(default)]
    pub collected_at_ms: Option<i64>,
}

/// Static identity of an analyzer plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerDescriptor {
    /// Unique registry key.
    pub name: String,
    /// Capability tags matched against evidence tags. Empty means the analyzer
    /// applies to any evidence.
    pub tags: BTreeSet<String>,
    pub version: String,
    /// If true, evidence must carry a hostname and at least one tag.
    #[serde(default)]
    pub requires_host: bool,
}

impl AnalyzerDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            version: version.into(),
            requires_host: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn requiring_host(mut self) -> Self {
        self.requires_host = true;
        self
    }
}

/// Scheduling priority of an analysis.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Which analyzer must run, and how urgently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisRef {
    pub analyzer: String,
    #[serde(default)]
    pub priority: Priority,
}

/// A unit of work handed over by the scheduler. Consumed by exactly one execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerTask {
    pub collection: EvidenceRef,
    pub analysis: AnalysisRef,
}

impl AnalyzerTask {
    pub fn case_id(&self) -> Guid {
        self.collection.case_id
    }

    pub fn collection_id(&self) -> Guid {
        self.collection.collection_id
    }
}

/// Filesystem locations for one (case, collection, analyzer) execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPaths {
    /// Collected evidence. Never written to.
    pub input_dir: PathBuf,
    /// Exclusively owned working directory, created fresh and removed at the end.
    pub scratch_dir: PathBuf,
    /// Execution log. Survives failures for operator diagnosis.
    pub log_path: PathBuf,
    pub archive_path: PathBuf,
}

/// Where a step's diagnostic output ends up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "var", rename_all = "snake_case")]
pub enum LogChannel {
    /// stdout and stderr are appended to the log sink.
    #[default]
    Redirect,
    /// The program writes the log itself; its path is passed in this env var.
    Env(String),
    /// The program writes the log itself; its path is already on the command line.
    Argv,
}

/// One external program invocation in a pipeline. No implicit shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSpec {
    /// Label used in logs and separators.
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, defaults to the agent's.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Files the program is expected to produce. Informational only.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    #[serde(default)]
    pub log: LogChannel,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            outputs: Vec::new(),
            log: LogChannel::Redirect,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn log_channel(mut self, log: LogChannel) -> Self {
        self.log = log;
        self
    }

    /// Fully rendered argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Terminal outcome of an analyzer execution. There is no partial success.
#[derive(Debug)]
pub enum ExecutionResult {
    Succeeded { archive_path: PathBuf },
    Failed { error: AnalyzerError },
}

impl ExecutionResult {
    /// The signal handed back to the scheduler.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&AnalyzerError> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}
