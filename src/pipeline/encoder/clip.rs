use std::sync::RwLock;

use anyhow::Context as _;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip;
use tokenizers::Tokenizer;
use tracing::info;

use super::{mean_pool, Encoder};
use crate::config::EncoderConfig;
use crate::error::{Error, Result};
use crate::pipeline::extractor::Frame;

const CONTEXT_LENGTH: usize = 77;
const EOT_TOKEN: u32 = 49407;

const CLIP_IMAGE_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// CLIP ViT-B/32 behind the [`Encoder`] trait: one model backing both the
/// vision and text towers, so both modalities land in the same 512-d space.
///
/// The forward pass holds a read lock, matching how the model is shared
/// process-wide: loaded once at startup, never reloaded per request.
pub struct ClipEncoder {
    model: RwLock<clip::ClipModel>,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl ClipEncoder {
    pub fn load(config: &EncoderConfig) -> Result<Self> {
        let device = Device::Cpu;
        info!(model = %config.model_id, "loading CLIP encoder");

        let mut builder = hf_hub::api::sync::ApiBuilder::new();
        if let Some(dir) = &config.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let repo = builder
            .build()
            .context("cannot build model hub client")?
            .repo(hf_hub::Repo::with_revision(
                config.model_id.clone(),
                hf_hub::RepoType::Model,
                config.revision.clone(),
            ));

        let weights = repo
            .get("model.safetensors")
            .context("cannot fetch model weights")?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .context("cannot fetch tokenizer")?;

        let clip_config = clip::ClipConfig::vit_base_patch32();
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .context("cannot load safetensors")?
        };
        let model = clip::ClipModel::new(vb, &clip_config)
            .map_err(|e| Error::Internal(anyhow::anyhow!("cannot build CLIP model: {}", e)))?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| Error::Internal(anyhow::anyhow!("cannot load tokenizer: {}", e)))?;

        Ok(Self {
            model: RwLock::new(model),
            tokenizer,
            device,
            dimensions: config.dimensions,
        })
    }

    /// Normalized NCHW tensor for one frame: resize to 224x224, scale to
    /// [0, 1], then apply the CLIP channel mean/std.
    fn frame_tensor(&self, frame: &Frame) -> Result<Tensor> {
        let img = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
            .ok_or_else(|| Error::encoding("frame byte length does not match dimensions"))?;
        let img = image::DynamicImage::ImageRgb8(img);
        let img = if frame.width == CLIP_IMAGE_SIZE && frame.height == CLIP_IMAGE_SIZE {
            img
        } else {
            img.resize_exact(
                CLIP_IMAGE_SIZE,
                CLIP_IMAGE_SIZE,
                image::imageops::FilterType::Triangle,
            )
        };

        let data: Vec<f32> = img
            .to_rgb8()
            .pixels()
            .flat_map(|p| {
                [
                    (p[0] as f32) / 255.0,
                    (p[1] as f32) / 255.0,
                    (p[2] as f32) / 255.0,
                ]
            })
            .collect();

        let tensor = Tensor::from_vec(
            data,
            (CLIP_IMAGE_SIZE as usize, CLIP_IMAGE_SIZE as usize, 3),
            &self.device,
        )
        .and_then(|t| t.permute((2, 0, 1)))
        .map_err(|e| Error::encoding(e))?;

        let mean = Tensor::new(&CLIP_MEAN, &self.device)
            .and_then(|t| t.reshape((3, 1, 1)))
            .map_err(|e| Error::encoding(e))?;
        let std = Tensor::new(&CLIP_STD, &self.device)
            .and_then(|t| t.reshape((3, 1, 1)))
            .map_err(|e| Error::encoding(e))?;

        tensor
            .broadcast_sub(&mean)
            .and_then(|t| t.broadcast_div(&std))
            .map_err(|e| Error::encoding(e))
    }
}

impl Encoder for ClipEncoder {
    fn encode_frames(&self, frames: &[Frame]) -> Result<Vec<f32>> {
        if frames.is_empty() {
            return Err(Error::encoding("empty frame sequence"));
        }

        let tensors = frames
            .iter()
            .map(|f| self.frame_tensor(f))
            .collect::<Result<Vec<_>>>()?;
        let batch = Tensor::stack(&tensors, 0).map_err(|e| Error::encoding(e))?;

        let features = {
            let model = self
                .model
                .read()
                .map_err(|e| Error::Internal(anyhow::anyhow!("model lock poisoned: {}", e)))?;
            model
                .get_image_features(&batch)
                .map_err(|e| Error::encoding(e))?
        };

        let per_frame: Vec<Vec<f32>> = features.to_vec2().map_err(|e| Error::encoding(e))?;
        mean_pool(&per_frame).ok_or_else(|| Error::encoding("empty feature batch"))
    }

    fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::encoding(e))?
            .get_ids()
            .to_vec();
        if tokens.len() < CONTEXT_LENGTH {
            tokens.resize(CONTEXT_LENGTH, EOT_TOKEN);
        } else {
            tokens.truncate(CONTEXT_LENGTH);
        }

        let token_ids = Tensor::new(&tokens[..], &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| Error::encoding(e))?;

        let features = {
            let model = self
                .model
                .read()
                .map_err(|e| Error::Internal(anyhow::anyhow!("model lock poisoned: {}", e)))?;
            model
                .get_text_features(&token_ids)
                .map_err(|e| Error::encoding(e))?
        };

        let rows: Vec<Vec<f32>> = features.to_vec2().map_err(|e| Error::encoding(e))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::encoding("text tower returned no rows"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
