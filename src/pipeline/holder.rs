use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::index::VideoIndex;

/// Holds the single active index. Readers take an immutable `Arc` snapshot
/// and finish against it even if a rebuild publishes mid-query; writers swap
/// the handle atomically, so a half-replaced vectors/timestamps pair is never
/// observable.
pub trait IndexHolder: Send + Sync {
    fn current(&self) -> Option<Arc<VideoIndex>>;
    fn publish(&self, index: Arc<VideoIndex>) -> Result<()>;
}

/// In-memory slot. Used in tests and for ephemeral serving.
#[derive(Default)]
pub struct MemoryHolder {
    slot: RwLock<Option<Arc<VideoIndex>>>,
}

impl MemoryHolder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexHolder for MemoryHolder {
    fn current(&self) -> Option<Arc<VideoIndex>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    fn publish(&self, index: Arc<VideoIndex>) -> Result<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|e| Error::Internal(anyhow::anyhow!("{}", e)))?;
        *slot = Some(index);
        Ok(())
    }
}

/// Durable slot: publishing also persists the artifact pair under the prefix,
/// and `open` reloads whatever a previous process published.
#[derive(Debug)]
pub struct DurableHolder {
    prefix: PathBuf,
    slot: RwLock<Option<Arc<VideoIndex>>>,
}

impl DurableHolder {
    /// Open against an artifact prefix. A complete pair is loaded; no
    /// artifacts means an empty holder; a half-written pair or artifacts
    /// that fail validation are corruption, surfaced at startup rather than
    /// on the first query.
    pub fn open(prefix: PathBuf) -> Result<Self> {
        let (vectors_path, timestamps_path) = VideoIndex::artifact_paths(&prefix);
        let slot = if !vectors_path.exists() && !timestamps_path.exists() {
            None
        } else {
            let index = VideoIndex::load(&prefix)?;
            info!(
                prefix = %prefix.display(),
                chunks = index.len(),
                "loaded persisted index"
            );
            Some(Arc::new(index))
        };

        Ok(Self {
            prefix,
            slot: RwLock::new(slot),
        })
    }

    pub fn prefix(&self) -> &PathBuf {
        &self.prefix
    }
}

impl IndexHolder for DurableHolder {
    fn current(&self) -> Option<Arc<VideoIndex>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    fn publish(&self, index: Arc<VideoIndex>) -> Result<()> {
        // Persist first: the in-memory swap happens only once the on-disk
        // pair is complete.
        index.persist(&self.prefix)?;
        let mut slot = self
            .slot
            .write()
            .map_err(|e| Error::Internal(anyhow::anyhow!("{}", e)))?;
        *slot = Some(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::index::ChunkVector;

    fn make_index(start: f32) -> Arc<VideoIndex> {
        Arc::new(
            VideoIndex::build(vec![ChunkVector {
                start_time: start,
                vector: vec![1.0, 2.0],
            }])
            .unwrap(),
        )
    }

    #[test]
    fn test_memory_holder_starts_empty() {
        let holder = MemoryHolder::new();
        assert!(holder.current().is_none());
    }

    #[test]
    fn test_memory_holder_publish_replaces_wholesale() {
        let holder = MemoryHolder::new();
        holder.publish(make_index(0.0)).unwrap();
        holder.publish(make_index(9.0)).unwrap();

        let current = holder.current().unwrap();
        assert_eq!(current.timestamps(), &[9.0]);
    }

    #[test]
    fn test_inflight_snapshot_survives_republish() {
        let holder = MemoryHolder::new();
        holder.publish(make_index(0.0)).unwrap();

        let snapshot = holder.current().unwrap();
        holder.publish(make_index(9.0)).unwrap();

        // The reader that started before the swap still sees its version.
        assert_eq!(snapshot.timestamps(), &[0.0]);
        assert_eq!(holder.current().unwrap().timestamps(), &[9.0]);
    }

    #[test]
    fn test_durable_holder_empty_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let holder = DurableHolder::open(dir.path().join("active")).unwrap();
        assert!(holder.current().is_none());
    }

    #[test]
    fn test_durable_holder_reloads_published_index() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("active");

        let holder = DurableHolder::open(prefix.clone()).unwrap();
        holder.publish(make_index(3.0)).unwrap();
        drop(holder);

        let reopened = DurableHolder::open(prefix).unwrap();
        assert_eq!(reopened.current().unwrap().timestamps(), &[3.0]);
    }

    #[test]
    fn test_durable_holder_half_pair_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("active");

        let holder = DurableHolder::open(prefix.clone()).unwrap();
        holder.publish(make_index(3.0)).unwrap();
        drop(holder);

        let (vectors_path, _) = VideoIndex::artifact_paths(&prefix);
        std::fs::remove_file(vectors_path).unwrap();

        let err = DurableHolder::open(prefix).unwrap_err();
        assert_eq!(err.kind(), "index_corruption");
    }
}
