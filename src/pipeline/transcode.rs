//! Image re-encoding: raw bytes → normalized, size-bounded PNG bytes.
//!
//! PNG is lossless, so re-hosting never degrades the source beyond the
//! optional downscale. The encoder runs with fixed settings (best
//! compression, adaptive filtering): the same decoded image always produces
//! the same bytes.

use crate::error::ItemError;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Decode a fetched body, guessing the format from its content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ItemError> {
    image::load_from_memory(bytes).map_err(|e| ItemError::Decode {
        detail: e.to_string(),
    })
}

/// Flatten alpha and exotic sample layouts to plain RGB.
///
/// Grey and RGB images at 8 or 16 bits are left as they are.
pub fn normalize(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgb16(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Shrink `img` so neither edge exceeds `max`, preserving aspect ratio.
///
/// Images already within bounds are returned untouched; this never upscales.
pub fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img;
    }
    let resized = img.resize(max, max, FilterType::Lanczos3);
    debug!(
        "Resized {}x{} → {}x{}",
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );
    resized
}

/// Serialize `img` as PNG into memory.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ItemError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut buf),
        CompressionType::Best,
        PngFilter::Adaptive,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| ItemError::Encode {
            detail: e.to_string(),
        })?;
    Ok(buf)
}

/// Decode → normalize → optional resize → PNG.
///
/// CPU-bound; callers on an async runtime should run it in `spawn_blocking`.
pub fn transcode(bytes: &[u8], max_dimension: Option<u32>) -> Result<Vec<u8>, ItemError> {
    let img = normalize(decode(bytes)?);
    let img = match max_dimension {
        Some(max) => fit_within(img, max),
        None => img,
    };
    let png = encode_png(&img)?;
    debug!("Encoded {}x{} PNG → {} bytes", img.width(), img.height(), png.len());
    Ok(png)
}
