use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::pipeline::encoder::Encoder;
use crate::pipeline::holder::IndexHolder;

/// A resolved time range. Derived on the fly, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub start_time: f32,
    pub end_time: f32,
}

/// Maps a free-text query to the most relevant timestamp range of the active
/// index: embed the query, k-NN under exact L2, then pad the winning chunk
/// start with the pre/post-roll buffers.
pub struct Resolver {
    encoder: Arc<dyn Encoder>,
    holder: Arc<dyn IndexHolder>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        holder: Arc<dyn IndexHolder>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            encoder,
            holder,
            config,
        }
    }

    fn buffered(&self, best_start: f32) -> QueryResult {
        QueryResult {
            start_time: (best_start - self.config.pre_roll).max(0.0),
            end_time: best_start + self.config.post_roll,
        }
    }

    /// Top-1 resolution, the default contract.
    pub fn resolve(&self, query: &str) -> Result<QueryResult> {
        self.resolve_top_k(query, 1)?
            .into_iter()
            .next()
            .ok_or(Error::IndexNotReady)
    }

    /// Generalized top-k, ranked by ascending distance.
    pub fn resolve_top_k(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        let index = self.holder.current().ok_or(Error::IndexNotReady)?;
        if index.is_empty() {
            return Err(Error::IndexNotReady);
        }

        let text_vector = self.encoder.encode_text(query)?;
        let neighbors = index.search(&text_vector, k.max(1))?;
        debug!(
            query,
            best_start = neighbors.first().map(|n| n.start_time),
            "resolved query"
        );

        Ok(neighbors
            .into_iter()
            .map(|n| self.buffered(n.start_time))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extractor::Frame;
    use crate::pipeline::holder::MemoryHolder;
    use crate::pipeline::index::{ChunkVector, VideoIndex};

    /// Deterministic stand-in: text "at N" embeds near the chunk whose start
    /// time is N.
    struct StubEncoder;

    impl Encoder for StubEncoder {
        fn encode_frames(&self, frames: &[Frame]) -> crate::error::Result<Vec<f32>> {
            if frames.is_empty() {
                return Err(Error::encoding("empty frame sequence"));
            }
            Ok(vec![0.0, 0.0])
        }

        fn encode_text(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            let n: f32 = text.trim_start_matches("at ").parse().unwrap_or(0.0);
            Ok(vec![n, 0.1])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn make_resolver(holder: Arc<dyn IndexHolder>) -> Resolver {
        Resolver::new(Arc::new(StubEncoder), holder, ResolverConfig::default())
    }

    fn publish_index(holder: &dyn IndexHolder, starts: &[f32]) {
        let vectors = starts
            .iter()
            .map(|&s| ChunkVector {
                start_time: s,
                vector: vec![s, 0.0],
            })
            .collect();
        holder
            .publish(Arc::new(VideoIndex::build(vectors).unwrap()))
            .unwrap();
    }

    #[test]
    fn test_resolve_before_any_build_is_not_ready() {
        let resolver = make_resolver(Arc::new(MemoryHolder::new()));
        let err = resolver.resolve("anything").unwrap_err();
        assert_eq!(err.kind(), "index_not_ready");
    }

    #[test]
    fn test_resolve_applies_asymmetric_buffers() {
        let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
        publish_index(holder.as_ref(), &[0.0, 3.0, 6.0, 9.0, 12.0]);

        let result = make_resolver(holder).resolve("at 9").unwrap();
        assert_eq!(result.start_time, 7.0);
        assert_eq!(result.end_time, 12.0);
    }

    #[test]
    fn test_resolve_clamps_start_at_zero() {
        let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
        publish_index(holder.as_ref(), &[0.0, 3.0]);

        let result = make_resolver(holder).resolve("at 0").unwrap();
        assert_eq!(result.start_time, 0.0);
        assert_eq!(result.end_time, 3.0);
    }

    #[test]
    fn test_resolve_top_k_ranked() {
        let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
        publish_index(holder.as_ref(), &[0.0, 3.0, 6.0]);

        let results = make_resolver(holder).resolve_top_k("at 3", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].start_time, 1.0);
        assert_eq!(results[0].end_time, 6.0);
    }

    #[test]
    fn test_buffer_invariants_for_any_best_start() {
        let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
        let starts: Vec<f32> = (0..20).map(|i| i as f32 * 1.5).collect();
        publish_index(holder.as_ref(), &starts);
        let resolver = make_resolver(holder);

        for best in starts {
            let result = resolver.resolve(&format!("at {}", best)).unwrap();
            assert_eq!(result.start_time, (best - 2.0).max(0.0));
            assert_eq!(result.end_time, best + 3.0);
        }
    }
}
