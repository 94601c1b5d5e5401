//! Bounding-box trimming and segmentation-driven cropping.
//!
//! Both operations are pure and best-effort: on any failure the caller keeps
//! the artifact it already had.

use crate::error::StageError;
use crate::raster::{AlphaMatte, Channels, RasterImage, Rectangle};
use crate::segment::segment_mask;

/// Padding kept around the opaque bounding box when trimming.
pub const TRIM_PADDING: u32 = 2;

/// Seed-rectangle inset for the secondary crop segmentation.
pub const AUTO_CROP_MARGIN: f32 = 0.05;

/// Crops smaller than this fraction of the image area are rejected as
/// degenerate segmentations.
pub const MIN_AREA_FRACTION: f64 = 0.05;

/// Crop away fully transparent margins, keeping `padding` pixels around the
/// opaque bounding box (clamped to the image edges).
///
/// Requires a 4-channel image. Idempotent once no transparent margin remains.
pub fn trim_transparent_margins(
    image: &RasterImage,
    padding: u32,
) -> Result<RasterImage, StageError> {
    if image.channels() != Channels::Rgba {
        return Err(StageError::NoAlpha);
    }

    let bbox = alpha_bounding_box(image).ok_or(StageError::FullyTransparent)?;
    let rect = bbox.inflate(padding, image.dimensions());
    // rect lies within bounds by construction
    image.crop(rect).map_err(|_| StageError::FullyTransparent)
}

/// Re-segment with a tighter prior purely to obtain a mask, then crop to its
/// bounding box. The matte itself is not kept.
///
/// Rejects the crop when the box covers less than `min_area_fraction` of the
/// image, guarding against a segmentation collapsed to a sliver.
pub fn auto_crop(
    image: &RasterImage,
    margin_ratio: f32,
    min_area_fraction: f64,
) -> Result<RasterImage, StageError> {
    let mask = segment_mask(image, margin_ratio)?;
    let bbox = mask.bounding_box().ok_or(StageError::EmptyForeground)?;

    let full_area = u64::from(image.width()) * u64::from(image.height());
    if (bbox.area() as f64) < min_area_fraction * full_area as f64 {
        return Err(StageError::CropTooSmall);
    }

    image.crop(bbox).map_err(|_| StageError::CropTooSmall)
}

fn alpha_bounding_box(image: &RasterImage) -> Option<Rectangle> {
    let (w, h) = image.dimensions();
    let mut data = Vec::with_capacity((w as usize) * (h as usize));
    for y in 0..h {
        for x in 0..w {
            data.push(image.alpha(x, y));
        }
    }
    AlphaMatte::new(w, h, data).ok()?.bounding_box()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RGBA canvas fully transparent except an opaque block.
    fn sprite(width: u32, height: u32, block: (u32, u32, u32, u32)) -> RasterImage {
        let (bx, by, bw, bh) = block;
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let inside = x >= bx && x < bx + bw && y >= by && y < by + bh;
                data.extend_from_slice(if inside {
                    &[200, 30, 30, 255]
                } else {
                    &[0, 0, 0, 0]
                });
            }
        }
        RasterImage::new(width, height, Channels::Rgba, data).unwrap()
    }

    #[test]
    fn trim_crops_to_opaque_box_plus_padding() {
        let img = sprite(50, 40, (10, 8, 20, 16));
        let out = trim_transparent_margins(&img, TRIM_PADDING).unwrap();
        assert_eq!(out.dimensions(), (24, 20));
        // padding ring is transparent, interior opaque
        assert_eq!(out.alpha(0, 0), 0);
        assert_eq!(out.alpha(2, 2), 255);
    }

    #[test]
    fn trim_is_idempotent_on_tight_images() {
        let img = sprite(50, 40, (10, 8, 20, 16));
        let once = trim_transparent_margins(&img, TRIM_PADDING).unwrap();
        let twice = trim_transparent_margins(&once, TRIM_PADDING).unwrap();
        assert_eq!(twice.dimensions(), once.dimensions());
    }

    #[test]
    fn trim_clamps_padding_at_image_edges() {
        // block touching the top-left corner; padding cannot grow past it
        let img = sprite(30, 30, (0, 0, 10, 10));
        let out = trim_transparent_margins(&img, TRIM_PADDING).unwrap();
        assert_eq!(out.dimensions(), (12, 12));
    }

    #[test]
    fn trim_requires_alpha_channel() {
        let img = RasterImage::new(4, 4, Channels::Rgb, vec![0; 48]).unwrap();
        assert_eq!(
            trim_transparent_margins(&img, TRIM_PADDING).unwrap_err(),
            StageError::NoAlpha
        );
    }

    #[test]
    fn trim_rejects_fully_transparent_images() {
        let img = sprite(20, 20, (0, 0, 0, 0));
        assert_eq!(
            trim_transparent_margins(&img, TRIM_PADDING).unwrap_err(),
            StageError::FullyTransparent
        );
    }

    fn two_tone(
        width: u32,
        height: u32,
        bg: [u8; 3],
        fg: [u8; 3],
        block: (u32, u32, u32, u32),
    ) -> RasterImage {
        let (bx, by, bw, bh) = block;
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let inside = x >= bx && x < bx + bw && y >= by && y < by + bh;
                data.extend_from_slice(if inside { &fg } else { &bg });
            }
        }
        RasterImage::new(width, height, Channels::Rgb, data).unwrap()
    }

    #[test]
    fn auto_crop_tightens_to_the_garment() {
        let img = two_tone(100, 100, [255, 255, 255], [255, 0, 0], (20, 20, 60, 60));
        let out = auto_crop(&img, AUTO_CROP_MARGIN, MIN_AREA_FRACTION).unwrap();
        assert_eq!(out.dimensions(), (60, 60));
        assert_eq!(out.rgb(30, 30), [255, 0, 0]);
    }

    #[test]
    fn auto_crop_rejects_sliver_segmentations() {
        // a 4x4 dot is 0.16% of the frame, far below the 5% floor
        let img = two_tone(100, 100, [255, 255, 255], [255, 0, 0], (48, 48, 4, 4));
        assert_eq!(
            auto_crop(&img, AUTO_CROP_MARGIN, MIN_AREA_FRACTION).unwrap_err(),
            StageError::CropTooSmall
        );
    }

    #[test]
    fn auto_crop_propagates_tiny_image_rejection() {
        let img = two_tone(8, 8, [255, 255, 255], [255, 0, 0], (2, 2, 4, 4));
        assert_eq!(
            auto_crop(&img, AUTO_CROP_MARGIN, MIN_AREA_FRACTION).unwrap_err(),
            StageError::TooSmall
        );
    }
}
