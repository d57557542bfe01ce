use std::path::{Path, PathBuf};

use crate::model::{Guid, StagedPaths};

const COLLECTIONS_DIR: &str = "collections";
const ANALYSES_DIR: &str = "analyses";
const DATA_DIR: &str = "data";
const LOG_FILE: &str = "analysis.log";
const ARCHIVE_FILE: &str = "analysis.zip";

/// Resolves where evidence lives and where an analyzer may write.
///
/// Layout under `root`:
/// `<case>/collections/<collection>/data/` holds collected evidence,
/// `<case>/collections/<collection>/analyses/<analyzer>/` holds one analyzer's
/// `data/` scratch directory, `analysis.log` and `analysis.zip`.
///
/// Pure path construction: nothing here touches the filesystem.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the collected evidence for a collection.
    pub fn collection_storage(&self, case_id: Guid, collection_id: Guid) -> PathBuf {
        self.collection_root(case_id, collection_id).join(DATA_DIR)
    }

    /// Directory owning everything one analyzer produces for a collection.
    pub fn analysis_storage(&self, case_id: Guid, collection_id: Guid, analyzer: &str) -> PathBuf {
        self.collection_root(case_id, collection_id)
            .join(ANALYSES_DIR)
            .join(sanitize_component(analyzer))
    }

    /// Resolve every location one execution needs. Unique per triple.
    pub fn resolve(&self, case_id: Guid, collection_id: Guid, analyzer: &str) -> StagedPaths {
        let analysis = self.analysis_storage(case_id, collection_id, analyzer);
        StagedPaths {
            input_dir: self.collection_storage(case_id, collection_id),
            scratch_dir: analysis.join(DATA_DIR),
            log_path: analysis.join(LOG_FILE),
            archive_path: analysis.join(ARCHIVE_FILE),
        }
    }

    fn collection_root(&self, case_id: Guid, collection_id: Guid) -> PathBuf {
        self.root
            .join(case_id.to_string())
            .join(COLLECTIONS_DIR)
            .join(collection_id.to_string())
    }
}

fn sanitize_component(s: &str) -> String {
    // Directory-safe component: no separators, no parent traversal.
    let cleaned = s.replace(['/', '\\', ':'], "_");
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}
