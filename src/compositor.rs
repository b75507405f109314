//! Backdrop compositing
//!
//! Flattens a transparent foreground over a solid color or a backdrop
//! image. Backdrop images are cover-resized and center-cropped to the
//! foreground's exact dimensions before alpha-compositing, analogous to
//! CSS `background-size: cover`.
//!
//! All functions here operate on in-memory images; persistence is the
//! caller's concern.

use crate::error::{CutoutError, Result};
use image::{imageops, DynamicImage, ImageBuffer, Rgba, RgbaImage};

/// What to place behind the foreground
#[derive(Debug, Clone)]
pub enum Backdrop {
    /// No compositing; the foreground is returned unchanged
    None,
    /// An opaque solid color (RGB)
    Color([u8; 3]),
    /// A backdrop image, cover-fitted to the foreground
    Image(DynamicImage),
}

/// Parse a `#RRGGBB` hex color (the leading `#` is optional)
pub fn parse_hex_color(input: &str) -> Result<[u8; 3]> {
    let hex = input.strip_prefix('#').unwrap_or(input);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CutoutError::validation(format!(
            "Invalid hex color '{input}', expected #RRGGBB"
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(hex.get(range).unwrap_or_default(), 16)
            .map_err(|e| CutoutError::validation(format!("Invalid hex color '{input}': {e}")))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Composite a transparent foreground over the given backdrop
///
/// The output always has the foreground's pixel dimensions. With
/// [`Backdrop::None`] the foreground is returned as-is (converted to RGBA).
///
/// # Errors
/// - [`Backdrop::Image`] with a zero-width or zero-height backdrop
pub fn composite_backdrop(foreground: &DynamicImage, backdrop: &Backdrop) -> Result<RgbaImage> {
    let fg = foreground.to_rgba8();
    let (fg_width, fg_height) = fg.dimensions();

    let mut canvas: RgbaImage = match backdrop {
        Backdrop::None => return Ok(fg),
        Backdrop::Color([r, g, b]) => {
            ImageBuffer::from_pixel(fg_width, fg_height, Rgba([*r, *g, *b, 255]))
        },
        Backdrop::Image(image) => cover_fit(image, fg_width, fg_height)?,
    };

    imageops::overlay(&mut canvas, &fg, 0, 0);
    Ok(canvas)
}

/// Scale a backdrop so it fully covers `width`x`height`, then center-crop
/// the overflow away.
///
/// If the backdrop is proportionally wider than the target, it is scaled to
/// the target height (width overflows); otherwise to the target width
/// (height overflows). Crop offsets are half the overflow, floored.
fn cover_fit(backdrop: &DynamicImage, width: u32, height: u32) -> Result<RgbaImage> {
    let bg = backdrop.to_rgba8();
    let (bg_width, bg_height) = bg.dimensions();
    if bg_width == 0 || bg_height == 0 {
        return Err(CutoutError::validation(
            "Background image has zero width or height",
        ));
    }

    let bg_ratio = f64::from(bg_width) / f64::from(bg_height);
    let fg_ratio = f64::from(width) / f64::from(height);

    let (scaled_width, scaled_height) = if bg_ratio > fg_ratio {
        (((f64::from(height)) * bg_ratio) as u32, height)
    } else {
        (width, ((f64::from(width)) / bg_ratio) as u32)
    };

    let scaled = imageops::resize(
        &bg,
        scaled_width,
        scaled_height,
        imageops::FilterType::Lanczos3,
    );

    let left = (scaled_width - width) / 2;
    let top = (scaled_height - height) / 2;
    Ok(imageops::crop_imm(&scaled, left, top, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transparent_foreground(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])))
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF8001").unwrap(), [255, 128, 1]);
        assert_eq!(parse_hex_color("00ff00").unwrap(), [0, 255, 0]);

        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gghhii").is_err());
        assert!(parse_hex_color("").is_err());
    }

    #[test]
    fn test_color_backdrop_fills_transparent_pixels() {
        let fg = transparent_foreground(10, 8);
        let out = composite_backdrop(&fg, &Backdrop::Color([12, 34, 56])).unwrap();

        assert_eq!(out.dimensions(), (10, 8));
        for pixel in out.pixels() {
            assert_eq!(*pixel, Rgba([12, 34, 56, 255]));
        }
    }

    #[test]
    fn test_opaque_foreground_hides_backdrop() {
        let fg = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255])));
        let out = composite_backdrop(&fg, &Backdrop::Color([0, 0, 0])).unwrap();

        for pixel in out.pixels() {
            assert_eq!(*pixel, Rgba([200, 10, 10, 255]));
        }
    }

    #[test]
    fn test_no_backdrop_returns_foreground() {
        let fg = transparent_foreground(7, 3);
        let out = composite_backdrop(&fg, &Backdrop::None).unwrap();
        assert_eq!(out.dimensions(), (7, 3));
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_image_backdrop_matches_foreground_dimensions() {
        // Wider, taller, narrower, and same-aspect backdrops all cover-fit
        // to the foreground's exact size.
        let fg = transparent_foreground(64, 48);
        for (bg_width, bg_height) in [(200, 50), (30, 300), (64, 48), (1, 1), (13, 17)] {
            let backdrop = Backdrop::Image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                bg_width,
                bg_height,
                Rgba([1, 2, 3, 255]),
            )));
            let out = composite_backdrop(&fg, &backdrop).unwrap();
            assert_eq!(
                out.dimensions(),
                (64, 48),
                "backdrop {bg_width}x{bg_height} did not cover-fit"
            );
        }
    }

    #[test]
    fn test_image_backdrop_shows_through_transparency() {
        let fg = transparent_foreground(16, 16);
        let backdrop = Backdrop::Image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            32,
            32,
            Rgba([9, 99, 199, 255]),
        )));
        let out = composite_backdrop(&fg, &backdrop).unwrap();
        assert_eq!(*out.get_pixel(8, 8), Rgba([9, 99, 199, 255]));
    }

    #[test]
    fn test_zero_dimension_backdrop_rejected() {
        let fg = transparent_foreground(8, 8);
        let empty = Backdrop::Image(DynamicImage::ImageRgba8(RgbaImage::new(10, 0)));
        let err = composite_backdrop(&fg, &empty).unwrap_err();
        assert!(matches!(err, CutoutError::Validation(_)));
    }
}
