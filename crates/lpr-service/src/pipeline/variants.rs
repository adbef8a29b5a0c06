//! Preprocessing variants of a plate crop.
//!
//! Each transform is evaluated independently (in parallel through rayon) and
//! the output keeps the declaration order of the active profile, so the same
//! crop always yields the same variants in the same order.

use crate::error::LprError;
use image::{
    imageops, imageops::FilterType, DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, Pixel,
    RgbImage,
};
use imageproc::{
    contrast::otsu_level,
    filter::{box_filter, filter3x3, gaussian_blur_f32},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Crops whose shorter side is below this are upscaled first.
pub const MIN_CROP_SIDE: u32 = 50;

const SHARPEN_KERNEL: [i32; 9] = [0, -1, 0, -1, 5, -1, 0, -1, 0];

const ADAPTIVE_BLOCK_SIZE: u32 = 11;
const ADAPTIVE_OFFSET: i32 = 2;
const DENOISE_SIGMA: f32 = 1.0;
const BRIGHTEN_OFFSET: i32 = 40;
const CONTRAST_GAIN: f32 = 1.5;

/// Contrast-limited adaptive histogram equalization parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Clip limit relative to a uniform histogram (OpenCV semantics).
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub tiles: u32,
}

const CLAHE_MILD: ClaheParams = ClaheParams {
    clip_limit: 2.0,
    tiles: 8,
};

const CLAHE_STRONG: ClaheParams = ClaheParams {
    clip_limit: 4.0,
    tiles: 4,
};

/// One deterministic image transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Original,
    Grayscale,
    Clahe(ClaheParams),
    GaussianBlur,
    Sharpen,
    AdaptiveGaussian,
    AdaptiveMean,
    Otsu,
    Brighten,
    HighContrast,
    ClaheOtsu,
    BlurOtsu,
    ClaheSharpen,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Original => "original",
            Transform::Grayscale => "grayscale",
            Transform::Clahe(p) if *p == CLAHE_MILD => "clahe_clip2_tile8",
            Transform::Clahe(_) => "clahe_clip4_tile4",
            Transform::GaussianBlur => "gaussian_blur",
            Transform::Sharpen => "sharpen",
            Transform::AdaptiveGaussian => "adaptive_gaussian",
            Transform::AdaptiveMean => "adaptive_mean",
            Transform::Otsu => "otsu",
            Transform::Brighten => "brighter",
            Transform::HighContrast => "high_contrast",
            Transform::ClaheOtsu => "clahe_otsu",
            Transform::BlurOtsu => "blur_otsu",
            Transform::ClaheSharpen => "clahe_sharpen",
        }
    }

    fn apply(&self, rgb: &RgbImage, gray: &GrayImage) -> Result<DynamicImage, LprError> {
        let name = self.name();
        let image = match self {
            Transform::Original => DynamicImage::ImageRgb8(rgb.clone()),
            Transform::Grayscale => DynamicImage::ImageLuma8(gray.clone()),
            Transform::Clahe(params) => DynamicImage::ImageLuma8(clahe(gray, *params, name)?),
            Transform::GaussianBlur => DynamicImage::ImageRgb8(imageops::blur(rgb, DENOISE_SIGMA)),
            Transform::Sharpen => DynamicImage::ImageRgb8(filter3x3::<_, i32, u8>(rgb, &SHARPEN_KERNEL)),
            Transform::AdaptiveGaussian => {
                let sigma = gaussian_sigma_for_block(ADAPTIVE_BLOCK_SIZE);
                let local = gaussian_blur_f32(gray, sigma);
                DynamicImage::ImageLuma8(threshold_against(gray, &local, ADAPTIVE_OFFSET))
            }
            Transform::AdaptiveMean => {
                let radius = ADAPTIVE_BLOCK_SIZE / 2;
                let local = box_filter(gray, radius, radius);
                DynamicImage::ImageLuma8(threshold_against(gray, &local, ADAPTIVE_OFFSET))
            }
            Transform::Otsu => DynamicImage::ImageLuma8(otsu_binarize(gray)),
            Transform::Brighten => DynamicImage::ImageRgb8(imageops::brighten(rgb, BRIGHTEN_OFFSET)),
            Transform::HighContrast => DynamicImage::ImageRgb8(scale_intensity(rgb, CONTRAST_GAIN)),
            Transform::ClaheOtsu => DynamicImage::ImageLuma8(otsu_binarize(&clahe(gray, CLAHE_MILD, name)?)),
            Transform::BlurOtsu => {
                DynamicImage::ImageLuma8(otsu_binarize(&gaussian_blur_f32(gray, DENOISE_SIGMA)))
            }
            Transform::ClaheSharpen => {
                DynamicImage::ImageLuma8(filter3x3::<_, i32, u8>(&clahe(gray, CLAHE_MILD, name)?, &SHARPEN_KERNEL))
            }
        };
        Ok(image)
    }
}

/// Named set of transforms; larger profiles trade latency for recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantProfile {
    Compact,
    #[default]
    Standard,
    Extended,
}

const COMPACT: &[Transform] = &[
    Transform::Original,
    Transform::Grayscale,
    Transform::Clahe(CLAHE_MILD),
    Transform::GaussianBlur,
    Transform::Sharpen,
    Transform::AdaptiveGaussian,
    Transform::Otsu,
    Transform::HighContrast,
];

const STANDARD: &[Transform] = &[
    Transform::Original,
    Transform::Grayscale,
    Transform::Clahe(CLAHE_MILD),
    Transform::Clahe(CLAHE_STRONG),
    Transform::GaussianBlur,
    Transform::Sharpen,
    Transform::AdaptiveGaussian,
    Transform::AdaptiveMean,
    Transform::Otsu,
    Transform::Brighten,
    Transform::HighContrast,
];

const EXTENDED: &[Transform] = &[
    Transform::Original,
    Transform::Grayscale,
    Transform::Clahe(CLAHE_MILD),
    Transform::Clahe(CLAHE_STRONG),
    Transform::GaussianBlur,
    Transform::Sharpen,
    Transform::AdaptiveGaussian,
    Transform::AdaptiveMean,
    Transform::Otsu,
    Transform::Brighten,
    Transform::HighContrast,
    Transform::ClaheOtsu,
    Transform::BlurOtsu,
    Transform::ClaheSharpen,
];

impl VariantProfile {
    pub fn transforms(&self) -> &'static [Transform] {
        match self {
            VariantProfile::Compact => COMPACT,
            VariantProfile::Standard => STANDARD,
            VariantProfile::Extended => EXTENDED,
        }
    }
}

/// One preprocessed rendition of a crop.
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: &'static str,
    pub image: DynamicImage,
}

/// Produces the ordered variant set for a crop.
#[derive(Debug, Clone)]
pub struct VariantGenerator {
    profile: VariantProfile,
    min_side: u32,
}

impl Default for VariantGenerator {
    fn default() -> Self {
        Self::new(VariantProfile::default())
    }
}

impl VariantGenerator {
    pub fn new(profile: VariantProfile) -> Self {
        Self {
            profile,
            min_side: MIN_CROP_SIDE,
        }
    }

    pub fn with_min_side(mut self, min_side: u32) -> Self {
        self.min_side = min_side.max(1);
        self
    }

    pub fn profile(&self) -> VariantProfile {
        self.profile
    }

    /// Generate variants, `original` first.
    ///
    /// A transform that fails is skipped. Only an unusable crop (zero width
    /// or height) fails the whole call.
    pub fn generate(&self, crop: &DynamicImage) -> Result<Vec<Variant>, LprError> {
        let (width, height) = crop.dimensions();
        if width == 0 || height == 0 {
            return Err(LprError::invalid_input(format!(
                "crop has zero size ({}x{})",
                width, height
            )));
        }

        let rgb = upscale_to_min_side(crop.to_rgb8(), self.min_side);
        let gray = DynamicImage::ImageRgb8(rgb.clone()).to_luma8();

        let variants: Vec<Variant> = self
            .profile
            .transforms()
            .par_iter()
            .map(|transform| match transform.apply(&rgb, &gray) {
                Ok(image) => Some(Variant {
                    name: transform.name(),
                    image,
                }),
                Err(e) => {
                    debug!(variant = transform.name(), error = %e, "skipping variant");
                    None
                }
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        match variants.first() {
            Some(first) if first.name == Transform::Original.name() => Ok(variants),
            _ => Err(LprError::invalid_input("identity variant could not be produced")),
        }
    }
}

/// Upscale with cubic interpolation until the shorter side reaches `min_side`.
pub fn upscale_to_min_side(image: RgbImage, min_side: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let shorter = width.min(height);
    if shorter == 0 || shorter >= min_side {
        return image;
    }

    // ceil(side * min_side / shorter) keeps the aspect ratio and lands the
    // shorter side exactly on min_side.
    let scale = |side: u32| -> u32 {
        let scaled = (side as u64 * min_side as u64).div_ceil(shorter as u64);
        scaled.min(u32::MAX as u64) as u32
    };

    imageops::resize(&image, scale(width), scale(height), FilterType::CatmullRom)
}

/// Per-channel `gain * v`, rounded and saturated. Unlike
/// `imageops::contrast` this does not pivot around mid-gray.
pub fn scale_intensity(image: &RgbImage, gain: f32) -> RgbImage {
    let mut out = image.clone();
    for value in out.iter_mut() {
        *value = (*value as f32 * gain).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Contrast-limited adaptive histogram equalization with bilinear blending
/// between tile mappings.
pub fn clahe(gray: &GrayImage, params: ClaheParams, variant: &'static str) -> Result<GrayImage, LprError> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(LprError::transform(variant, "empty image"));
    }
    if params.tiles == 0 || params.clip_limit <= 0.0 {
        return Err(LprError::transform(variant, "invalid CLAHE parameters"));
    }

    let tiles_x = params.tiles.min(width);
    let tiles_y = params.tiles.min(height);
    let bounds = |tile: u32, tiles: u32, size: u32| (tile * size / tiles, (tile + 1) * size / tiles);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = bounds(ty, tiles_y, height);
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, width);
            luts.push(tile_lut(gray, x0, x1, y0, y1, params.clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;
    let locate = |pos: u32, tile_size: f32, tiles: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile_size - 0.5;
        let lower = f.floor().clamp(0.0, (tiles - 1) as f32);
        let upper = (lower + 1.0).min((tiles - 1) as f32);
        let weight = (f - lower).clamp(0.0, 1.0);
        (lower as usize, upper as usize, weight)
    };

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, wx) = locate(x, tile_w, tiles_x);
        let (ty0, ty1, wy) = locate(y, tile_h, tiles_y);
        let v = gray.get_pixel(x, y)[0] as usize;
        let at = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][v] as f32;

        let top = at(tx0, ty0) * (1.0 - wx) + at(tx1, ty0) * wx;
        let bottom = at(tx0, ty1) * (1.0 - wx) + at(tx1, ty1) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    }))
}

fn tile_lut(gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = ((x1 - x0) * (y1 - y0)).max(1);
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += per_bin + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = ((cdf as f32 * 255.0 / area as f32).round()).clamp(0.0, 255.0) as u8;
    }
    lut
}

/// 3x3 high-pass sharpening with replicated borders, any 8-bit pixel layout.
pub fn sharpen<P>(image: &ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let channels = P::CHANNEL_COUNT as usize;

    ImageBuffer::from_fn(width, height, |x, y| {
        let mut acc = [0i32; 4];
        for (ky, row) in SHARPEN_KERNEL.chunks_exact(3).enumerate() {
            for (kx, &weight) in row.iter().enumerate() {
                if weight == 0 {
                    continue;
                }
                let sx = (x as i64 + kx as i64 - 1).clamp(0, width as i64 - 1) as u32;
                let sy = (y as i64 + ky as i64 - 1).clamp(0, height as i64 - 1) as u32;
                let source = image.get_pixel(sx, sy).channels();
                for (c, value) in source.iter().take(channels).enumerate() {
                    acc[c] += weight * *value as i32;
                }
            }
        }

        let mut out = [0u8; 4];
        for c in 0..channels {
            out[c] = acc[c].clamp(0, 255) as u8;
        }
        *P::from_slice(&out[..channels])
    })
}

/// Binarize against a per-pixel local reference: white where
/// `pixel > local - offset`.
fn threshold_against(gray: &GrayImage, local: &GrayImage, offset: i32) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0] as i32;
        let reference = local.get_pixel(x, y)[0] as i32 - offset;
        Luma([if v > reference { 255 } else { 0 }])
    })
}

fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    let mut out = gray.clone();
    for value in out.iter_mut() {
        *value = if *value > level { 255 } else { 0 };
    }
    out
}

/// Sigma OpenCV derives for a Gaussian kernel of the given size.
fn gaussian_sigma_for_block(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}
