//! Super-timeline extraction with plaso's log2timeline.

use std::path::PathBuf;

use analyzer_core::model::{AnalyzerDescriptor, LogChannel, StepSpec};
use analyzer_core::{Analyzer, Processing, TaskContext};

use crate::config::PlasoConfig;

pub const NAME: &str = "plaso";

#[derive(Debug, Clone)]
pub struct Plaso {
    descriptor: AnalyzerDescriptor,
    program: PathBuf,
    workers: u32,
    worker_memory_limit: u64,
    process_memory_limit: u64,
}

impl Plaso {
    pub fn new(config: &PlasoConfig) -> Self {
        Self {
            descriptor: AnalyzerDescriptor::new(NAME, env!("CARGO_PKG_VERSION")),
            program: config.program.clone(),
            workers: config.workers.max(1),
            worker_memory_limit: config.worker_memory_limit,
            process_memory_limit: config.process_memory_limit,
        }
    }
}

impl Analyzer for Plaso {
    fn descriptor(&self) -> &AnalyzerDescriptor {
        &self.descriptor
    }

    fn processing(&self, ctx: &TaskContext<'_>) -> Processing {
        let paths = ctx.paths;
        let storage_file = paths.scratch_dir.join("output.plaso");
        // plaso owns its log file, named on the command line
        let step = StepSpec::new("log2timeline", self.program.as_path())
            .args(["-u", "--status-view", "none", "--workers"])
            .arg(self.workers.to_string())
            .arg("--worker-memory-limit")
            .arg(self.worker_memory_limit.to_string())
            .arg("--process-memory-limit")
            .arg(self.process_memory_limit.to_string())
            .arg("--log-file")
            .path_arg(&paths.log_path)
            .args(["--storage-format", "sqlite", "--storage-file"])
            .path_arg(&storage_file)
            .path_arg(&paths.input_dir)
            .output(storage_file)
            .log_channel(LogChannel::Argv);
        Processing::Pipeline(vec![step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PLASO_PROCESS_MEMORY_LIMIT, PLASO_WORKERS, PLASO_WORKER_MEMORY_LIMIT};
    use crate::testing::{context, Fixture};

    #[test]
    fn single_step_names_its_own_log_file() {
        let fx = Fixture::new(NAME, &[], None);
        let analyzer = Plaso::new(&PlasoConfig {
            program: "/usr/bin/log2timeline.py".into(),
            workers: PLASO_WORKERS,
            worker_memory_limit: PLASO_WORKER_MEMORY_LIMIT,
            process_memory_limit: PLASO_PROCESS_MEMORY_LIMIT,
        });
        let applicability = analyzer.validate(&fx.task).unwrap();
        assert!(applicability.matched.is_empty());

        let Processing::Pipeline(steps) = analyzer.processing(&context(&fx, &applicability)) else {
            panic!("plaso runs a pipeline");
        };
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(step.log, LogChannel::Argv);

        let log = fx.paths.log_path.display().to_string();
        let storage = fx.paths.scratch_dir.join("output.plaso").display().to_string();
        let input = fx.paths.input_dir.display().to_string();
        let expected: Vec<String> = [
            "/usr/bin/log2timeline.py",
            "-u",
            "--status-view",
            "none",
            "--workers",
            "2",
            "--worker-memory-limit",
            "2147483648",
            "--process-memory-limit",
            "4294967296",
            "--log-file",
            &log,
            "--storage-format",
            "sqlite",
            "--storage-file",
            &storage,
            &input,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(step.argv(), expected);
    }
}
