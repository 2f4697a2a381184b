//! Square thumbnail normalization.
//!
//! The canvas side is the image's longest side, capped at `canvas_max`. The
//! image is shrunk to fit (never enlarged), pasted centered on a fully
//! transparent canvas, and encoded as PNG.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// Canvas fill: white at zero alpha.
const TRANSPARENT: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Resampling filter for the shrink step (bicubic).
const SHRINK_FILTER: FilterType = FilterType::CatmullRom;

/// Why an image could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The bytes are not a decodable image.
    #[error("corrupt image: {reason}")]
    CorruptImage {
        /// Decoder message.
        reason: String,
    },
    /// The normalized canvas could not be encoded.
    #[error("encode failed: {reason}")]
    Encode {
        /// Encoder message.
        reason: String,
    },
}

/// Decode `bytes`, normalize, and encode as PNG.
///
/// # Errors
///
/// `CorruptImage` if the bytes cannot be decoded, `Encode` if PNG encoding fails.
pub fn normalize(bytes: &[u8], canvas_max: u32) -> Result<Vec<u8>, NormalizeError> {
    let source = image::load_from_memory(bytes).map_err(|e| return NormalizeError::CorruptImage { reason: e.to_string() })?;
    let canvas = normalize_image(&source, canvas_max);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| return NormalizeError::Encode { reason: e.to_string() })?;
    return Ok(out.into_inner());
}

/// Place `source` centered on a transparent square canvas.
pub fn normalize_image(source: &DynamicImage, canvas_max: u32) -> RgbaImage {
    let (width, height) = (source.width(), source.height());
    let side = width.max(height).min(canvas_max).max(1);
    let (fit_w, fit_h) = fit_within(width, height, side);

    let rgba = source.to_rgba8();
    let shrunk = if (fit_w, fit_h) == (width, height) {
        rgba
    } else {
        imageops::resize(&rgba, fit_w, fit_h, SHRINK_FILTER)
    };

    let mut canvas = RgbaImage::from_pixel(side, side, TRANSPARENT);
    let x = side.saturating_sub(fit_w) / 2;
    let y = side.saturating_sub(fit_h) / 2;
    imageops::replace(&mut canvas, &shrunk, i64::from(x), i64::from(y));
    return canvas;
}

/// Size of `width`×`height` shrunk to fit a `side`×`side` box, aspect preserved.
///
/// The shrunk dimension takes whichever of floor or ceil keeps the aspect
/// ratio closest, floor on a tie, and never drops below 1.
pub fn fit_within(width: u32, height: u32, side: u32) -> (u32, u32) {
    if width <= side && height <= side {
        return (width, height);
    }
    let aspect = f64::from(width) / f64::from(height);
    let box_side = f64::from(side);

    if aspect <= 1.0 {
        let w = round_aspect(box_side * aspect, |n| return (aspect - n / box_side).abs());
        return (w, side);
    }
    let h = round_aspect(box_side / aspect, |n| {
        if n == 0.0 {
            return 0.0;
        }
        return (aspect - box_side / n).abs();
    });
    return (side, h);
}

/// Choose floor or ceil of `value` by `error`, preferring floor on a tie.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is a whole number in 0..=side"
)]
fn round_aspect(value: f64, error: impl Fn(f64) -> f64) -> u32 {
    let (lo, hi) = (value.floor(), value.ceil());
    let chosen = if error(hi) < error(lo) { hi } else { lo };
    return (chosen as u32).max(1);
}
