use std::path::Path;

use base64::{prelude::BASE64_STANDARD, Engine};
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::EditError;

/// Sentinel seed value meaning "draw a fresh random seed for this request".
pub const RANDOM_SEED: i64 = -1;

// Defaults matching the original editing UI.
const DEFAULT_STEPS: f64 = 20.0;
const DEFAULT_GUIDANCE_SCALE: f64 = 4.5;
const DEFAULT_IMAGE_GUIDANCE_SCALE: f64 = 1.2;

const STEPS_RANGE: (f64, f64) = (1.0, 100.0);
const SCALE_RANGE: (f64, f64) = (0.1, 30.0);

/// An edit request as it arrives over the wire, before normalization.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RawEditRequest {
    /// Base64-encoded source image in any format the `image` crate can read.
    pub image: Option<String>,
    pub instruction: String,
    pub steps: Option<f64>,
    pub guidance_scale: Option<f64>,
    pub image_guidance_scale: Option<f64>,
    /// `-1` (or absent) requests a random seed.
    pub seed: Option<i64>,
}

/// A fully normalized edit request. The seed may still be the random
/// sentinel; it is resolved by [`resolve_seed`] right before invocation.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: RgbImage,
    pub instruction: String,
    pub steps: u32,
    pub guidance_scale: f32,
    pub image_guidance_scale: f32,
    pub seed: i64,
}

impl RawEditRequest {
    /// Validates and coerces the raw fields into an [`EditRequest`].
    ///
    /// Numeric fields are defaulted and clamped to the ranges the original
    /// sliders enforced; the upload is decoded and coerced to 3-channel RGB.
    /// Pure: no entropy is consumed and nothing is written.
    pub fn normalize(&self) -> Result<EditRequest, EditError> {
        let encoded = match self.image.as_deref() {
            Some(data) if !data.trim().is_empty() => data,
            _ => return Err(EditError::MissingInput),
        };
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| EditError::InvalidInput(e.to_string()))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| EditError::InvalidInput(e.to_string()))?
            .to_rgb8();

        Ok(EditRequest {
            image,
            instruction: self.instruction.clone(),
            steps: clamp_steps(self.steps),
            guidance_scale: clamp_scale(self.guidance_scale, DEFAULT_GUIDANCE_SCALE),
            image_guidance_scale: clamp_scale(
                self.image_guidance_scale,
                DEFAULT_IMAGE_GUIDANCE_SCALE,
            ),
            seed: self
                .seed
                .unwrap_or(RANDOM_SEED)
                .clamp(RANDOM_SEED, i32::MAX as i64),
        })
    }
}

fn clamp_steps(raw: Option<f64>) -> u32 {
    let value = raw.filter(|v| v.is_finite()).unwrap_or(DEFAULT_STEPS);
    value.round().clamp(STEPS_RANGE.0, STEPS_RANGE.1) as u32
}

fn clamp_scale(raw: Option<f64>, default: f64) -> f32 {
    let value = raw.filter(|v| v.is_finite()).unwrap_or(default);
    value.clamp(SCALE_RANGE.0, SCALE_RANGE.1) as f32
}

/// Turns the requested seed into the concrete value used for generation.
///
/// The sentinel draws uniformly from `[0, 2^31 - 1]` on every call; the draw
/// is logged so the exact run can be replayed with a fixed seed later.
pub fn resolve_seed(seed: i64) -> u32 {
    if seed == RANDOM_SEED {
        let drawn = rand::thread_rng().gen_range(0..=i32::MAX as u32);
        info!(seed = drawn, "drew random seed");
        drawn
    } else {
        seed as u32
    }
}

/// What the presentation layer renders: the edited image on success, and a
/// status line either way.
#[derive(Debug)]
pub struct EditResult {
    pub image: Option<RgbImage>,
    pub status: String,
}

impl EditResult {
    pub fn success(image: RgbImage, path: &Path) -> Self {
        Self {
            image: Some(image),
            status: format!("Saved to: {}", path.display()),
        }
    }

    pub fn failure(error: &EditError) -> Self {
        Self {
            image: None,
            status: error.to_string(),
        }
    }
}
