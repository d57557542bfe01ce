//! Artifact dissection with plasma. Needs the collection's hostname and tags.

use std::path::PathBuf;

use analyzer_core::model::{AnalyzerDescriptor, LogChannel, StepSpec};
use analyzer_core::{Analyzer, Processing, TaskContext};

use crate::config::PlasmaConfig;

pub const NAME: &str = "plasma";

/// Environment variable plasma reads its log file path from.
pub const LOGFILE_ENV: &str = "PLASMA_LOGFILE";

#[derive(Debug, Clone)]
pub struct Plasma {
    descriptor: AnalyzerDescriptor,
    program: PathBuf,
    parallel_surgeons: u32,
    parallel_dissectors: u32,
}

impl Plasma {
    pub fn new(config: &PlasmaConfig) -> Self {
        Self {
            descriptor: AnalyzerDescriptor::new(NAME, env!("CARGO_PKG_VERSION"))
                .with_tags(config.tags.iter().cloned())
                .requiring_host(),
            program: config.program.clone(),
            parallel_surgeons: config.parallel_surgeons.max(1),
            parallel_dissectors: config.parallel_dissectors.max(1),
        }
    }
}

impl Analyzer for Plasma {
    fn descriptor(&self) -> &AnalyzerDescriptor {
        &self.descriptor
    }

    fn processing(&self, ctx: &TaskContext<'_>) -> Processing {
        let paths = ctx.paths;
        // validated non-empty before processing is planned
        let hostname = ctx
            .task
            .collection
            .hostname
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        let step = StepSpec::new("dissect", self.program.as_path())
            .args(["dissect", "--file-format", "csv", "--prefix", "--hostname"])
            .arg(hostname)
            .arg("--filter")
            .arg(format!("tags:{}", ctx.applicability.filter()))
            .arg("--parallel-surgeons")
            .arg(self.parallel_surgeons.to_string())
            .arg("--parallel-dissectors")
            .arg(self.parallel_dissectors.to_string())
            .arg(".")
            .path_arg(&paths.scratch_dir)
            .cwd(&paths.input_dir)
            .log_channel(LogChannel::Env(LOGFILE_ENV.to_string()));
        Processing::Pipeline(vec![step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, Fixture};
    use analyzer_core::model::OperatingSystem;
    use analyzer_core::AnalyzerError;

    fn plasma(tags: &[&str]) -> Plasma {
        Plasma::new(&PlasmaConfig {
            program: "/opt/plasma/bin/plasma".into(),
            parallel_surgeons: 4,
            parallel_dissectors: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
    }

    #[test]
    fn filter_is_derived_from_matched_tags() {
        let mut fx = Fixture::new(NAME, &["prefetch", "evtx"], Some("WS-042"));
        fx.task.collection.opsystem = Some(OperatingSystem::Windows);
        let analyzer = plasma(&["windows", "linux", "evtx"]);

        let applicability = analyzer.validate(&fx.task).unwrap();
        let Processing::Pipeline(steps) = analyzer.processing(&context(&fx, &applicability)) else {
            panic!("plasma runs a pipeline");
        };
        let step = &steps[0];

        assert_eq!(step.cwd.as_deref(), Some(fx.paths.input_dir.as_path()));
        // the log path reaches plasma only through the step's log channel
        assert_eq!(step.log, LogChannel::Env(LOGFILE_ENV.into()));
        assert!(step.env.is_empty());
        let expected: Vec<String> = [
            "dissect",
            "--file-format",
            "csv",
            "--prefix",
            "--hostname",
            "WS-042",
            "--filter",
            "tags:evtx,windows",
            "--parallel-surgeons",
            "4",
            "--parallel-dissectors",
            "1",
            ".",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([fx.paths.scratch_dir.display().to_string()])
        .collect();
        assert_eq!(step.args, expected);
    }

    #[test]
    fn requires_hostname_and_tags() {
        let analyzer = plasma(&["windows"]);

        let fx = Fixture::new(NAME, &["windows"], Some("  "));
        assert!(matches!(
            analyzer.validate(&fx.task),
            Err(AnalyzerError::Precondition(_))
        ));

        let fx = Fixture::new(NAME, &[], Some("WS-042"));
        assert!(matches!(
            analyzer.validate(&fx.task),
            Err(AnalyzerError::Precondition(_))
        ));
    }
}
