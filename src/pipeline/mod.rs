pub mod encoder;
pub mod extractor;
pub mod holder;
pub mod index;
pub mod resolver;

pub use encoder::{load_encoder, ClipEncoder, Encoder};
pub use extractor::{plan_windows, Chunk, Extractor, Frame};
pub use holder::{DurableHolder, IndexHolder, MemoryHolder};
pub use index::{ChunkVector, Neighbor, VideoIndex};
pub use resolver::{QueryResult, Resolver};

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;

/// Outcome of indexing one video.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub chunks_indexed: usize,
}

/// Ties the pipeline together: extract chunks, embed each one, build the
/// index, publish it through the holder. Rebuilding replaces the previous
/// index wholesale.
pub struct Indexer {
    extractor: Extractor,
    encoder: Arc<dyn Encoder>,
    holder: Arc<dyn IndexHolder>,
}

impl Indexer {
    pub fn new(extractor: Extractor, encoder: Arc<dyn Encoder>, holder: Arc<dyn IndexHolder>) -> Self {
        Self {
            extractor,
            encoder,
            holder,
        }
    }

    /// Blocking: decode and inference are CPU-bound. Callers on an async
    /// runtime wrap this in `spawn_blocking`.
    pub fn index_video(&self, path: &Path) -> Result<IndexReport> {
        let chunks = self.extractor.extract(path)?;
        info!(video = %path.display(), chunks = chunks.len(), "extracted chunks");

        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = self.encoder.encode_frames(&chunk.frames)?;
            vectors.push(ChunkVector {
                start_time: chunk.start_time,
                vector,
            });
        }

        let index = VideoIndex::build(vectors)?;
        let chunks_indexed = index.len();
        self.holder.publish(Arc::new(index))?;
        info!(video = %path.display(), chunks_indexed, "index published");

        Ok(IndexReport { chunks_indexed })
    }
}
