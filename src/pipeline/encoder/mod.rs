mod clip;

pub use clip::ClipEncoder;

use std::sync::Arc;

use crate::config::EncoderConfig;
use crate::error::Result;
use crate::pipeline::extractor::Frame;

/// Cross-modal embedding capability: visual chunks and text queries map into
/// one shared coordinate space of `dimensions()` floats, so distances between
/// them are directly comparable.
pub trait Encoder: Send + Sync {
    /// Embed a chunk's frames as one vector: each frame goes through the
    /// vision tower, then the per-frame vectors are mean-pooled. Temporal
    /// order within the chunk is intentionally discarded.
    fn encode_frames(&self, frames: &[Frame]) -> Result<Vec<f32>>;

    /// Embed a free-text query with the text tower.
    fn encode_text(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}

/// Load the process-wide encoder. Called once at startup; an unavailable
/// model is a fatal startup error, never a per-request one.
pub fn load_encoder(config: &EncoderConfig) -> Result<Arc<dyn Encoder>> {
    Ok(Arc::new(ClipEncoder::load(config)?))
}

/// Arithmetic mean across per-frame vectors. The pooled vector is the chunk's
/// final representation.
pub(crate) fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut pooled = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, v) in pooled.iter_mut().zip(vector) {
            *acc += v;
        }
    }
    let n = vectors.len() as f32;
    for acc in pooled.iter_mut() {
        *acc /= n;
    }
    Some(pooled)
}
