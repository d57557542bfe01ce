use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use analyzer_core::model::OperatingSystem;

/// Worker processes plaso may spawn.
pub const PLASO_WORKERS: u32 = 2;
/// Per-worker memory ceiling handed to plaso, in bytes.
pub const PLASO_WORKER_MEMORY_LIMIT: u64 = 2_147_483_648;
/// Whole-process memory ceiling handed to plaso, in bytes.
pub const PLASO_PROCESS_MEMORY_LIMIT: u64 = 4_294_967_296;

/// Agent configuration, loaded from a single TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
}

/// One optional table per configurable analyzer. `extractor` needs no settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AnalyzersConfig {
    #[serde(default)]
    pub hayabusa: Option<HayabusaConfig>,
    #[serde(default)]
    pub plaso: Option<PlasoConfig>,
    #[serde(default)]
    pub plasma: Option<PlasmaConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HayabusaConfig {
    pub program: PathBuf,
    pub rules_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlasoConfig {
    pub program: PathBuf,
    #[serde(default = "default_plaso_workers")]
    pub workers: u32,
    #[serde(default = "default_plaso_worker_memory")]
    pub worker_memory_limit: u64,
    #[serde(default = "default_plaso_process_memory")]
    pub process_memory_limit: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlasmaConfig {
    pub program: PathBuf,
    #[serde(default = "default_parallelism")]
    pub parallel_surgeons: u32,
    #[serde(default = "default_parallelism")]
    pub parallel_dissectors: u32,
    /// Capability tags advertised by plasma; defaults to the supported systems.
    #[serde(default = "default_plasma_tags")]
    pub tags: Vec<String>,
}

fn default_plaso_workers() -> u32 {
    PLASO_WORKERS
}

fn default_plaso_worker_memory() -> u64 {
    PLASO_WORKER_MEMORY_LIMIT
}

fn default_plaso_process_memory() -> u64 {
    PLASO_PROCESS_MEMORY_LIMIT
}

fn default_parallelism() -> u32 {
    1
}

fn default_plasma_tags() -> Vec<String> {
    [
        OperatingSystem::Windows,
        OperatingSystem::Linux,
        OperatingSystem::Darwin,
    ]
    .iter()
    .map(|os| os.as_str().to_string())
    .collect()
}

impl Config {
    /// Config with only a storage root and no external analyzers.
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig { root: root.into() },
            analyzers: AnalyzersConfig::default(),
        }
    }

    /// Read, parse and validate the config at `path`. Relative paths inside the
    /// file are taken relative to the file's directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let mut cfg: Config =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.anchor(base)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Make every configured path absolute. Plasma runs with the evidence
    /// directory as its working directory, so relative paths would not resolve.
    fn anchor(&mut self, base: &Path) -> Result<()> {
        let base = std::path::absolute(base)
            .with_context(|| format!("resolve config directory {}", base.display()))?;
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.storage.root);
        if let Some(h) = self.analyzers.hayabusa.as_mut() {
            anchor(&mut h.program);
            anchor(&mut h.rules_dir);
        }
        if let Some(p) = self.analyzers.plaso.as_mut() {
            anchor(&mut p.program);
        }
        if let Some(p) = self.analyzers.plasma.as_mut() {
            anchor(&mut p.program);
        }
        Ok(())
    }

    /// Fail fast on missing programs and rules; clamp parallelism knobs to at least 1.
    pub fn validate(&mut self) -> Result<()> {
        if let Some(h) = &self.analyzers.hayabusa {
            require_file("analyzers.hayabusa.program", &h.program)?;
            if !h.rules_dir.is_dir() {
                bail!(
                    "analyzers.hayabusa.rules_dir {} is not a directory",
                    h.rules_dir.display()
                );
            }
        }
        if let Some(p) = self.analyzers.plaso.as_mut() {
            require_file("analyzers.plaso.program", &p.program)?;
            p.workers = p.workers.max(1);
        }
        if let Some(p) = self.analyzers.plasma.as_mut() {
            require_file("analyzers.plasma.program", &p.program)?;
            p.parallel_surgeons = p.parallel_surgeons.max(1);
            p.parallel_dissectors = p.parallel_dissectors.max(1);
            p.tags.retain(|t| !t.trim().is_empty());
            if p.tags.is_empty() {
                bail!("analyzers.plasma.tags must not be empty");
            }
        }
        Ok(())
    }
}

fn require_file(key: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("{key} {} does not exist", path.display());
    }
    Ok(())
}
