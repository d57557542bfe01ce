use std::collections::BTreeMap;
use std::sync::Arc;

use analyzer_core::model::AnalyzerDescriptor;
use analyzer_core::Analyzer;
use tracing::debug;

use crate::config::Config;
use crate::extractor::Extractor;
use crate::hayabusa::Hayabusa;
use crate::plaso::Plaso;
use crate::plasma::Plasma;

/// Analyzers available to this agent, keyed by name.
#[derive(Clone, Default)]
pub struct Registry {
    analyzers: BTreeMap<String, Arc<dyn Analyzer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The extractor is always available; external tools only when configured.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Extractor::new()));
        if let Some(cfg) = &config.analyzers.hayabusa {
            registry.register(Arc::new(Hayabusa::new(cfg)));
        }
        if let Some(cfg) = &config.analyzers.plaso {
            registry.register(Arc::new(Plaso::new(cfg)));
        }
        if let Some(cfg) = &config.analyzers.plasma {
            registry.register(Arc::new(Plasma::new(cfg)));
        }
        registry
    }

    /// Adds `analyzer`, replacing any analyzer registered under the same name.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        let name = analyzer.descriptor().name.clone();
        debug!(analyzer = %name, "registered analyzer");
        self.analyzers.insert(name, analyzer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.analyzers.keys().map(String::as_str)
    }

    /// Descriptors sorted by name.
    pub fn descriptors(&self) -> Vec<AnalyzerDescriptor> {
        self.analyzers
            .values()
            .map(|a| a.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
