//! End-to-end pipeline coverage against a deterministic fake encoder: the
//! extractor's window planning, index build/persist/load, and query
//! resolution compose without any model weights or media fixtures.

use std::sync::Arc;

use framefinder::config::ResolverConfig;
use framefinder::pipeline::{
    plan_windows, ChunkVector, DurableHolder, Encoder, Frame, IndexHolder, MemoryHolder,
    Resolver, VideoIndex,
};

/// Deterministic cross-modal stand-in. Visual chunks embed as a bump at the
/// mean pixel intensity; text queries of the form "moment N" embed as a bump
/// near the chunk whose start time is N. Same input, same vector, always.
struct FakeEncoder {
    dimensions: usize,
}

impl FakeEncoder {
    fn new() -> Self {
        Self { dimensions: 8 }
    }

    fn bump(&self, center: f32) -> Vec<f32> {
        (0..self.dimensions)
            .map(|i| {
                let d = i as f32 - center;
                (-d * d / 4.0).exp()
            })
            .collect()
    }
}

impl Encoder for FakeEncoder {
    fn encode_frames(&self, frames: &[Frame]) -> framefinder::Result<Vec<f32>> {
        if frames.is_empty() {
            return Err(framefinder::Error::Encoding("empty frame sequence".into()));
        }
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for frame in frames {
            sum += frame.rgb.iter().map(|&b| b as f64).sum::<f64>();
            count += frame.rgb.len();
        }
        let mean = (sum / count.max(1) as f64) as f32;
        Ok(self.bump(mean / 255.0 * (self.dimensions - 1) as f32))
    }

    fn encode_text(&self, text: &str) -> framefinder::Result<Vec<f32>> {
        let n: f32 = text
            .trim_start_matches("moment ")
            .parse()
            .map_err(|_| framefinder::Error::Encoding(format!("unparseable query: {text}")))?;
        Ok(self.bump(n / 24.0 * (self.dimensions - 1) as f32))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn solid_frame(value: u8) -> Frame {
    Frame {
        width: 4,
        height: 4,
        rgb: vec![value; 4 * 4 * 3],
    }
}

/// Chunk vectors for the reference scenario: a 30s video chunked 5s/2s-overlap,
/// each chunk embedded from a solid frame whose brightness encodes its start.
fn scenario_vectors(encoder: &FakeEncoder) -> Vec<ChunkVector> {
    plan_windows(30.0, 5.0, 2.0)
        .into_iter()
        .map(|(start, _end)| {
            let brightness = (start / 24.0 * 255.0) as u8;
            let vector = encoder.encode_frames(&[solid_frame(brightness)]).unwrap();
            ChunkVector {
                start_time: start,
                vector,
            }
        })
        .collect()
}

#[test]
fn thirty_second_scenario_resolves_buffered_range() {
    let encoder = FakeEncoder::new();
    let vectors = scenario_vectors(&encoder);

    let starts: Vec<f32> = vectors.iter().map(|v| v.start_time).collect();
    assert_eq!(starts, vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0]);

    let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
    holder
        .publish(Arc::new(VideoIndex::build(vectors).unwrap()))
        .unwrap();

    let resolver = Resolver::new(Arc::new(FakeEncoder::new()), holder, ResolverConfig::default());
    let result = resolver.resolve("moment 9").unwrap();
    assert_eq!(result.start_time, 7.0);
    assert_eq!(result.end_time, 12.0);
}

#[test]
fn resolve_before_any_build_is_the_not_ready_error() {
    let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());
    let resolver = Resolver::new(Arc::new(FakeEncoder::new()), holder, ResolverConfig::default());

    let err = resolver.resolve("moment 9").unwrap_err();
    assert!(matches!(err, framefinder::Error::IndexNotReady));
    assert!(err.to_string().contains("process a video first"));
}

#[test]
fn fake_encoder_is_deterministic() {
    let encoder = FakeEncoder::new();
    let frame = solid_frame(120);

    let a = encoder.encode_frames(&[frame.clone()]).unwrap();
    let b = encoder.encode_frames(&[frame]).unwrap();
    assert_eq!(a, b);

    let t1 = encoder.encode_text("moment 12").unwrap();
    let t2 = encoder.encode_text("moment 12").unwrap();
    assert_eq!(t1, t2);
}

#[test]
fn index_round_trip_preserves_pairs_through_durable_holder() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("active");

    let encoder = FakeEncoder::new();
    let vectors = scenario_vectors(&encoder);
    let built = VideoIndex::build(vectors).unwrap();

    let holder = DurableHolder::open(prefix.clone()).unwrap();
    holder.publish(Arc::new(built.clone())).unwrap();

    // A fresh process sees the identical (vector, timestamp) pairs.
    let reopened = DurableHolder::open(prefix).unwrap();
    let loaded = reopened.current().unwrap();
    assert_eq!(loaded.timestamps(), built.timestamps());
    for i in 0..built.len() {
        let (a, b) = (built.vector(i).unwrap(), loaded.vector(i).unwrap());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    // And resolution against the reloaded index behaves identically.
    let resolver = Resolver::new(
        Arc::new(FakeEncoder::new()),
        Arc::new(reopened),
        ResolverConfig::default(),
    );
    let result = resolver.resolve("moment 0").unwrap();
    assert_eq!(result.start_time, 0.0);
    assert_eq!(result.end_time, 3.0);
}

#[test]
fn rebuild_replaces_index_wholesale_while_snapshot_survives() {
    let encoder = FakeEncoder::new();
    let holder: Arc<dyn IndexHolder> = Arc::new(MemoryHolder::new());

    holder
        .publish(Arc::new(
            VideoIndex::build(scenario_vectors(&encoder)).unwrap(),
        ))
        .unwrap();
    let snapshot = holder.current().unwrap();

    // Second video: a single chunk at t=0.
    let replacement = VideoIndex::build(vec![ChunkVector {
        start_time: 0.0,
        vector: encoder.encode_frames(&[solid_frame(255)]).unwrap(),
    }])
    .unwrap();
    holder.publish(Arc::new(replacement)).unwrap();

    assert_eq!(snapshot.len(), 9);
    assert_eq!(holder.current().unwrap().len(), 1);
}
