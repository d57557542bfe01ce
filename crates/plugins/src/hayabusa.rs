//! Windows event log triage with hayabusa: five metric reports and a timeline.

use std::path::{Path, PathBuf};

use analyzer_core::model::{AnalyzerDescriptor, StepSpec};
use analyzer_core::{Analyzer, Processing, TaskContext};

use crate::config::HayabusaConfig;

pub const NAME: &str = "hayabusa";

/// Metric subcommands, each producing `<subcommand>.csv`.
const METRICS: [&str; 5] = [
    "computer-metrics",
    "eid-metrics",
    "log-metrics",
    "logon-summary",
    "extract-base64",
];

#[derive(Debug, Clone)]
pub struct Hayabusa {
    descriptor: AnalyzerDescriptor,
    program: PathBuf,
    rules_dir: PathBuf,
}

impl Hayabusa {
    pub fn new(config: &HayabusaConfig) -> Self {
        Self {
            descriptor: AnalyzerDescriptor::new(NAME, env!("CARGO_PKG_VERSION"))
                .with_tags(["windows", "evtx"]),
            program: config.program.clone(),
            rules_dir: config.rules_dir.clone(),
        }
    }

    fn metric(&self, subcommand: &str, input: &Path, scratch: &Path) -> StepSpec {
        let output = scratch.join(format!("{subcommand}.csv"));
        let step = StepSpec::new(subcommand, &self.program).args([subcommand, "-C"]);
        // computer-metrics takes neither -O nor -U
        let step = if subcommand == "computer-metrics" {
            step
        } else {
            step.args(["-O", "-U"])
        };
        step.arg("-o")
            .path_arg(&output)
            .arg("-d")
            .path_arg(input)
            .output(output)
    }

    fn timeline(&self, input: &Path, scratch: &Path) -> StepSpec {
        let timeline = scratch.join("timeline.csv");
        let summary = scratch.join("summary.html");
        StepSpec::new("csv-timeline", &self.program)
            .args(["csv-timeline", "-C", "-O", "-U", "-w", "-o"])
            .path_arg(&timeline)
            .arg("-H")
            .path_arg(&summary)
            .arg("-d")
            .path_arg(input)
            .arg("-r")
            .path_arg(&self.rules_dir)
            .output(timeline)
            .output(summary)
    }
}

impl Analyzer for Hayabusa {
    fn descriptor(&self) -> &AnalyzerDescriptor {
        &self.descriptor
    }

    fn processing(&self, ctx: &TaskContext<'_>) -> Processing {
        let input = &ctx.paths.input_dir;
        let scratch = &ctx.paths.scratch_dir;
        let mut steps: Vec<StepSpec> = METRICS
            .iter()
            .map(|sub| self.metric(sub, input, scratch))
            .collect();
        steps.push(self.timeline(input, scratch));
        Processing::Pipeline(steps)
    }
}
