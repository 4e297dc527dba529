//! Tool Index: a vector index plus parallel metadata document describing
//! every enabled service and its tools, hot-reloaded on file-mtime change.

pub mod embedding;
pub mod finder;
pub mod index;
pub mod metadata;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::DiscoveryConfig;
use crate::error::Result;
use embedding::Embedder;
use finder::ToolMatch;
use index::VectorIndex;
use metadata::MetadataDocument;

struct Snapshot {
    index: VectorIndex,
    metadata: MetadataDocument,
}

/// Lazily-loaded, hot-reloadable Tool Index. Reload is guarded by a single
/// lock so a `find` call never observes an index vector count mismatched
/// with its metadata; readers otherwise proceed lock-free against the
/// current `Arc` snapshot.
pub struct ToolIndex {
    index_path: PathBuf,
    metadata_path: PathBuf,
    embedder: Embedder,
    snapshot: ArcSwap<Snapshot>,
    reload_lock: Mutex<ReloadState>,
}

#[derive(Default)]
struct ReloadState {
    index_mtime: Option<SystemTime>,
    metadata_mtime: Option<SystemTime>,
}

impl ToolIndex {
    /// Build an (initially empty) Tool Index over the files named by
    /// `config`. The embedding model is loaded once here and never reloaded.
    pub fn open(config: &DiscoveryConfig) -> Result<Self> {
        let embedder = Embedder::load()?;
        let index = ToolIndex {
            index_path: config.manifests_dir.join("service_index.bin"),
            metadata_path: config.manifests_dir.join("service_index_metadata.json"),
            embedder,
            snapshot: ArcSwap::from_pointee(Snapshot {
                index: VectorIndex::empty(),
                metadata: MetadataDocument::default(),
            }),
            reload_lock: Mutex::new(ReloadState::default()),
        };
        index.reload_if_stale();
        Ok(index)
    }

    /// Re-read the index and metadata files if either has a newer mtime
    /// than the last successful load. Failures are logged and leave the
    /// previous snapshot in place — a transient read error should not take
    /// discovery offline.
    pub fn reload_if_stale(&self) {
        let mut state = self.reload_lock.lock();

        let index_mtime = mtime(&self.index_path);
        let metadata_mtime = mtime(&self.metadata_path);

        let index_changed = index_mtime.is_some() && index_mtime != state.index_mtime;
        let metadata_changed = metadata_mtime.is_some() && (metadata_mtime != state.metadata_mtime || index_changed);

        if !index_changed && !metadata_changed {
            return;
        }

        let Some(new_index) = self.try_load_index() else {
            return;
        };
        let Some(new_metadata) = self.try_load_metadata() else {
            return;
        };

        info!(
            vectors = new_index.len(),
            services = new_metadata.metadata.len(),
            "reloaded tool index"
        );

        self.snapshot.store(Arc::new(Snapshot {
            index: new_index,
            metadata: new_metadata,
        }));
        state.index_mtime = index_mtime;
        state.metadata_mtime = metadata_mtime;
    }

    fn try_load_index(&self) -> Option<VectorIndex> {
        match VectorIndex::load(&self.index_path) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(path = %self.index_path.display(), error = %e, "failed to load tool index");
                None
            }
        }
    }

    fn try_load_metadata(&self) -> Option<MetadataDocument> {
        match std::fs::read(&self.metadata_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!(path = %self.metadata_path.display(), error = %e, "failed to parse tool index metadata");
                    None
                }
            },
            Err(e) => {
                warn!(path = %self.metadata_path.display(), error = %e, "failed to read tool index metadata");
                None
            }
        }
    }

    /// Run the two-stage tool search, reloading first if the backing files
    /// changed since the last call.
    pub fn find(&self, query: &str, top_k_services: usize, top_n_tools: usize) -> Result<Vec<ToolMatch>> {
        self.reload_if_stale();
        let snapshot = self.snapshot.load();
        finder::find(
            &snapshot.index,
            &snapshot.metadata,
            &self.embedder,
            query,
            top_k_services,
            top_n_tools,
        )
    }

    /// Number of vectors currently loaded, for health/diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_has_zero_vectors() {
        let index = VectorIndex::empty();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

}
