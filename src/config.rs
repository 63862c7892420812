use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which frames represent a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FramePolicy {
    /// Sample frames at `sample_fps` across the whole window.
    Dense { sample_fps: f32 },
    /// Decode exactly one frame at the temporal midpoint of the window.
    MiddleFrame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in seconds.
    pub chunk_duration: f32,
    /// Overlap between consecutive windows in seconds. Must be < chunk_duration.
    pub overlap: f32,
    pub frame_policy: FramePolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_duration: 5.0,
            overlap: 2.0,
            frame_policy: FramePolicy::Dense { sample_fps: 1.0 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub model_id: String,
    pub revision: String,
    /// Embedding dimensionality shared by both towers.
    pub dimensions: usize,
    /// Cache directory for downloaded weights. Defaults to the hf-hub cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_id: "openai/clip-vit-base-patch32".to_string(),
            revision: "main".to_string(),
            dimensions: 512,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Seconds of look-back before the matched chunk start.
    pub pre_roll: f32,
    /// Seconds of look-ahead past the matched chunk start. Larger than
    /// pre_roll so the matched moment is not clipped at its start.
    pub post_roll: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pre_roll: 2.0,
            post_roll: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO etc). None = AWS.
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    /// Lifetime of presigned URLs in seconds.
    pub url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "framefinder-videos".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: String::new(),
            secret_key: String::new(),
            url_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Frontend origin allowed by CORS.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bound on a single video download.
    pub download_timeout_secs: u64,
    /// Bound on extract + encode + index for one video.
    pub process_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 120,
            process_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chunking: ChunkingConfig,
    pub encoder: EncoderConfig,
    pub resolver: ResolverConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    /// Working directory: downloaded videos, index artifacts, metadata db.
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chunking: ChunkingConfig::default(),
            encoder: EncoderConfig::default(),
            resolver: ResolverConfig::default(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            data_dir: PathBuf::from("data"),
            database_url: None,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    Error::Internal(anyhow::anyhow!("cannot read config {}: {}", p.display(), e))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Internal(anyhow::anyhow!("invalid config: {}", e)))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_duration <= 0.0 {
            return Err(Error::Internal(anyhow::anyhow!(
                "chunk_duration must be > 0, got {}",
                c.chunk_duration
            )));
        }
        if c.overlap < 0.0 || c.overlap >= c.chunk_duration {
            return Err(Error::Internal(anyhow::anyhow!(
                "overlap must be in [0, chunk_duration), got {}",
                c.overlap
            )));
        }
        if let FramePolicy::Dense { sample_fps } = c.frame_policy {
            if sample_fps < 0.0 {
                return Err(Error::Internal(anyhow::anyhow!(
                    "sample_fps must be >= 0, got {}",
                    sample_fps
                )));
            }
        }
        Ok(())
    }

    /// Prefix under which the index artifact pair is written.
    pub fn index_prefix(&self) -> PathBuf {
        self.data_dir.join("active")
    }

    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", self.data_dir.join("framefinder.db").display())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.chunk_duration, 5.0);
        assert_eq!(config.chunking.overlap, 2.0);
        assert_eq!(config.resolver.pre_roll, 2.0);
        assert_eq!(config.resolver.post_roll, 3.0);
        assert_eq!(config.encoder.dimensions, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_post_roll_exceeds_pre_roll() {
        // The asymmetry is deliberate and load-bearing for compatibility.
        let config = ResolverConfig::default();
        assert!(config.post_roll > config.pre_roll);
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut config = AppConfig::default();
        config.chunking.overlap = 5.0;
        assert!(config.validate().is_err());

        config.chunking.overlap = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = AppConfig::default();
        config.chunking.chunk_duration = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let back: AppConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.chunking.chunk_duration, config.chunking.chunk_duration);
        assert_eq!(back.server.bind, config.server.bind);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let back: AppConfig = toml::from_str("[chunking]\nchunk_duration = 10.0\n").unwrap();
        assert_eq!(back.chunking.chunk_duration, 10.0);
        assert_eq!(back.chunking.overlap, 2.0);
        assert_eq!(back.resolver.post_roll, 3.0);
    }
}
