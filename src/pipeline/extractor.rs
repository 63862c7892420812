use std::path::Path;

use tracing::{debug, warn};

use crate::config::{ChunkingConfig, FramePolicy};
use crate::error::{Error, Result};

/// A decoded frame in RGB24, row-major, the channel order the encoder expects.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A fixed-duration time window of the video, represented by its sampled
/// frames. Consumed once by the encoder, never retained after embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub start_time: f32,
    pub end_time: f32,
    pub frames: Vec<Frame>,
}

/// Timeline walk: windows of `chunk_duration` every `chunk_duration - overlap`
/// seconds starting at 0. A window that does not fit strictly before the end
/// of the video is dropped, not padded.
pub fn plan_windows(duration: f32, chunk_duration: f32, overlap: f32) -> Vec<(f32, f32)> {
    if duration <= 0.0 || chunk_duration <= 0.0 || overlap < 0.0 || overlap >= chunk_duration {
        return Vec::new();
    }
    let step = chunk_duration - overlap;
    (0..)
        .map(|i| i as f32 * step)
        .take_while(|start| start + chunk_duration < duration)
        .map(|start| (start, start + chunk_duration))
        .collect()
}

/// Splits a video's timeline into overlapping chunks and decodes the frames
/// that represent each one. Extraction is best-effort over the timeline: a
/// window that fails to seek or decode is skipped with a warning, it never
/// aborts the rest of the video.
pub struct Extractor {
    config: ChunkingConfig,
}

impl Extractor {
    pub fn new(config: ChunkingConfig) -> Self {
        // Safe to call repeatedly.
        ffmpeg_next::init().ok();
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Sample instants (seconds) for one window under the configured policy.
    fn sample_instants(&self, start: f64, end: f64) -> Vec<f64> {
        let span = end - start;
        match self.config.frame_policy {
            FramePolicy::MiddleFrame => vec![start + span / 2.0],
            FramePolicy::Dense { sample_fps } => {
                let count = ((span * sample_fps as f64).floor() as usize).max(1);
                (0..count)
                    .map(|k| start + k as f64 / sample_fps.max(f32::MIN_POSITIVE) as f64)
                    .take_while(|t| *t < end)
                    .collect()
            }
        }
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<Chunk>> {
        let mut ictx = ffmpeg_next::format::input(&path)
            .map_err(|e| Error::media_open(format!("{}: {}", path.display(), e)))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| Error::media_open(format!("{}: no video stream", path.display())))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let frame_rate = f64::from(stream.avg_frame_rate());
        let total_frames = stream.frames();

        // Duration from frame count / frame rate, falling back to stream and
        // container durations when the count is unknown.
        let duration = if total_frames > 0 && frame_rate > 0.0 {
            total_frames as f64 / frame_rate
        } else if stream.duration() > 0 {
            stream.duration() as f64 * time_base
        } else {
            ictx.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        };
        if duration <= 0.0 {
            return Err(Error::media_open(format!(
                "{}: cannot determine duration",
                path.display()
            )));
        }

        let mut decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| Error::media_open(format!("{}: {}", path.display(), e)))?;

        let windows = plan_windows(
            duration as f32,
            self.config.chunk_duration,
            self.config.overlap,
        );
        debug!(
            video = %path.display(),
            duration_secs = duration,
            windows = windows.len(),
            "planned chunk windows"
        );

        let mut scaler: Option<ffmpeg_next::software::scaling::Context> = None;
        let mut chunks = Vec::with_capacity(windows.len());

        for (start, end) in windows {
            let targets = self.sample_instants(start as f64, end as f64);
            match decode_window(
                &mut ictx,
                &mut decoder,
                &mut scaler,
                stream_index,
                time_base,
                &targets,
                end as f64,
            ) {
                Ok(frames) if !frames.is_empty() => chunks.push(Chunk {
                    start_time: start,
                    end_time: end,
                    frames,
                }),
                Ok(_) => {
                    warn!(start, end, "no frames decoded for window, skipping chunk");
                }
                Err(e) => {
                    warn!(start, end, error = %e, "window decode failed, skipping chunk");
                }
            }
        }

        Ok(chunks)
    }
}

/// Seek to the first target instant and decode one frame per target. Returns
/// the frames collected before the window's end.
fn decode_window(
    ictx: &mut ffmpeg_next::format::context::Input,
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut Option<ffmpeg_next::software::scaling::Context>,
    stream_index: usize,
    time_base: f64,
    targets: &[f64],
    window_end: f64,
) -> Result<Vec<Frame>> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let seek_ts = (targets[0] * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
    ictx.seek(seek_ts, ..seek_ts)
        .map_err(|e| Error::media_open(format!("seek to {:.2}s failed: {}", targets[0], e)))?;
    decoder.flush();

    let mut frames = Vec::with_capacity(targets.len());
    let mut next_target = 0;
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();

    'packets: for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .map_err(|e| Error::media_open(format!("decode error: {}", e)))?;

        while decoder.receive_frame(&mut decoded).is_ok() {
            let pts = decoded.pts().unwrap_or(0);
            let t = pts as f64 * time_base;
            if t > window_end {
                break 'packets;
            }
            while next_target < targets.len() && t + 1e-6 >= targets[next_target] {
                frames.push(to_rgb_frame(&decoded, scaler)?);
                next_target += 1;
            }
            if next_target >= targets.len() {
                break 'packets;
            }
        }
    }

    Ok(frames)
}

/// Convert a decoded frame to packed RGB24, creating the scaler lazily once
/// the source pixel format is known.
fn to_rgb_frame(
    decoded: &ffmpeg_next::util::frame::video::Video,
    scaler: &mut Option<ffmpeg_next::software::scaling::Context>,
) -> Result<Frame> {
    let (width, height) = (decoded.width(), decoded.height());

    if scaler.is_none() {
        *scaler = Some(
            ffmpeg_next::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| Error::media_open(format!("cannot create scaler: {}", e)))?,
        );
    }

    let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
    scaler
        .as_mut()
        .expect("scaler initialized above")
        .run(decoded, &mut rgb)
        .map_err(|e| Error::media_open(format!("pixel conversion failed: {}", e)))?;

    // The scaler output rows are padded to the stride; copy the visible pixels.
    let data = rgb.data(0);
    let stride = rgb.stride(0);
    let row_bytes = width as usize * 3;
    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        packed.extend_from_slice(&data[start..start + row_bytes]);
    }

    Ok(Frame {
        width,
        height,
        rgb: packed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_windows_thirty_second_timeline() {
        // 30s video, 5s chunks, 2s overlap: starts 0, 3, ..., 24.
        let windows = plan_windows(30.0, 5.0, 2.0);
        let starts: Vec<f32> = windows.iter().map(|w| w.0).collect();
        assert_eq!(starts, vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0]);
        assert!(windows.iter().all(|w| w.1 <= 30.0));
    }

    #[test]
    fn test_plan_windows_strictly_increasing_fixed_stride() {
        let windows = plan_windows(61.7, 4.0, 1.5);
        assert!(!windows.is_empty());
        for pair in windows.windows(2) {
            assert!(pair[1].0 > pair[0].0);
            assert!((pair[1].0 - pair[0].0 - 2.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_plan_windows_no_trailing_partial() {
        for duration in [10.0f32, 12.3, 29.9, 30.0, 31.0] {
            for (chunk, overlap) in [(5.0f32, 2.0f32), (5.0, 0.0), (3.0, 1.0)] {
                for (start, end) in plan_windows(duration, chunk, overlap) {
                    assert!(end <= duration, "window ({start}, {end}) exceeds {duration}");
                    assert!((end - start - chunk).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_plan_windows_window_ending_exactly_at_eof_dropped() {
        // 10s video, 5s chunks, no overlap: the window at 5s would end exactly
        // at the end of the video and is dropped.
        let windows = plan_windows(10.0, 5.0, 0.0);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0], (0.0, 5.0));
    }

    #[test]
    fn test_plan_windows_degenerate_inputs() {
        assert!(plan_windows(0.0, 5.0, 2.0).is_empty());
        assert!(plan_windows(30.0, 0.0, 0.0).is_empty());
        assert!(plan_windows(30.0, 5.0, 5.0).is_empty());
        assert!(plan_windows(30.0, 5.0, -1.0).is_empty());
        assert!(plan_windows(4.0, 5.0, 2.0).is_empty());
    }

    #[test]
    fn test_sample_instants_dense() {
        let extractor = Extractor::new(ChunkingConfig {
            chunk_duration: 5.0,
            overlap: 2.0,
            frame_policy: FramePolicy::Dense { sample_fps: 1.0 },
        });
        let instants = extractor.sample_instants(3.0, 8.0);
        assert_eq!(instants.len(), 5);
        assert!((instants[0] - 3.0).abs() < 1e-6);
        assert!((instants[4] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_instants_middle() {
        let extractor = Extractor::new(ChunkingConfig {
            chunk_duration: 5.0,
            overlap: 2.0,
            frame_policy: FramePolicy::MiddleFrame,
        });
        let instants = extractor.sample_instants(6.0, 11.0);
        assert_eq!(instants.len(), 1);
        assert!((instants[0] - 8.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_instants_low_fps_still_samples_once() {
        let extractor = Extractor::new(ChunkingConfig {
            chunk_duration: 5.0,
            overlap: 2.0,
            frame_policy: FramePolicy::Dense { sample_fps: 0.0 },
        });
        let instants = extractor.sample_instants(0.0, 5.0);
        assert_eq!(instants.len(), 1);
        assert!((instants[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_extract_missing_file_is_media_open() {
        let extractor = Extractor::new(ChunkingConfig::default());
        let err = extractor
            .extract(Path::new("/nonexistent/video.mp4"))
            .unwrap_err();
        assert_eq!(err.kind(), "media_open");
    }

    // Integration coverage with a real container is gated on a fixture, the
    // same arrangement the decode stack's own tests use.
    #[test]
    fn test_extract_real_video_when_fixture_present() {
        let fixture = Path::new("tests/fixtures/sample.mp4");
        if !fixture.exists() {
            eprintln!("skipping: tests/fixtures/sample.mp4 not present");
            return;
        }

        let extractor = Extractor::new(ChunkingConfig::default());
        let chunks = extractor.extract(fixture).expect("extraction");
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_time > pair[0].start_time);
        }
        for chunk in &chunks {
            assert!(chunk.end_time > chunk.start_time);
            assert!(!chunk.frames.is_empty());
            for frame in &chunk.frames {
                assert_eq!(frame.rgb.len(), (frame.width * frame.height * 3) as usize);
            }
        }
    }
}
