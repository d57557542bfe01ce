//! Packages the raw evidence unchanged.

use analyzer_core::model::AnalyzerDescriptor;
use analyzer_core::{Analyzer, Processing, TaskContext};

pub const NAME: &str = "extractor";

/// Applies to every collection and copies its data directory into the archive.
#[derive(Debug, Clone)]
pub struct Extractor {
    descriptor: AnalyzerDescriptor,
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            descriptor: AnalyzerDescriptor::new(NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for Extractor {
    fn descriptor(&self) -> &AnalyzerDescriptor {
        &self.descriptor
    }

    fn processing(&self, _ctx: &TaskContext<'_>) -> Processing {
        Processing::CopyEvidence
    }
}
