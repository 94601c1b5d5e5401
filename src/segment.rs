//! Foreground/background segmentation of a garment image.
//!
//! Graph-cut-style energy minimization: the inset seed rectangle is the only
//! foreground prior, pixels outside it are fixed background. Each refinement
//! iteration refits per-label diagonal Gaussian color models and runs one ICM
//! sweep with a contrast-weighted Potts smoothness term. Foreground pixels
//! become matte value 255, everything else 0; [`remove_background`] feathers
//! the matte before attaching it as alpha so later composites avoid hard
//! edges.

use crate::error::StageError;
use crate::raster::{AlphaMatte, RasterImage};

/// Seed-rectangle inset used when removing a garment background.
pub const REMOVE_BG_MARGIN: f32 = 0.03;

/// Images narrower or shorter than this are not worth segmenting.
const MIN_DIMENSION: u32 = 10;

const REFINEMENT_ITERATIONS: usize = 5;
const VARIANCE_FLOOR: f64 = 25.0;
const SMOOTHNESS_WEIGHT: f64 = 1.5;

const FEATHER_RADIUS: u32 = 2;
const FEATHER_SIGMA: f64 = 1.1;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Label {
    /// Outside the seed rectangle; never reclassified.
    FixedBackground,
    Background,
    Foreground,
}

impl Label {
    fn is_foreground(self) -> bool {
        self == Label::Foreground
    }
}

/// Binary foreground mask from energy-minimization segmentation.
///
/// `margin_ratio` insets the seed rectangle by that fraction of each
/// dimension from every edge. The matte has the input's dimensions, with 255
/// for foreground and 0 for background.
pub fn segment_mask(image: &RasterImage, margin_ratio: f32) -> Result<AlphaMatte, StageError> {
    let (w, h) = image.dimensions();
    if w < MIN_DIMENSION || h < MIN_DIMENSION {
        return Err(StageError::TooSmall);
    }

    let margin = margin_ratio.clamp(0.0, 0.49);
    let x0 = (w as f32 * margin) as u32;
    let y0 = (h as f32 * margin) as u32;
    let x1 = w - x0;
    let y1 = h - y0;

    let px = (w as usize) * (h as usize);
    let mut colors = Vec::with_capacity(px);
    for y in 0..h {
        for x in 0..w {
            let [r, g, b] = image.rgb(x, y);
            colors.push([f64::from(r), f64::from(g), f64::from(b)]);
        }
    }

    let mut labels = Vec::with_capacity(px);
    for y in 0..h {
        for x in 0..w {
            let inside = x >= x0 && x < x1 && y >= y0 && y < y1;
            labels.push(if inside {
                Label::Foreground
            } else {
                Label::FixedBackground
            });
        }
    }

    // The seed rectangle can cover the whole image for very small inputs;
    // with no background prior the whole frame counts as foreground.
    let has_fixed_bg = labels.iter().any(|&l| l == Label::FixedBackground);
    if has_fixed_bg {
        let beta = contrast_beta(&colors, w, h);
        for _ in 0..REFINEMENT_ITERATIONS {
            let fg = GaussianModel::fit(&colors, &labels, true);
            let bg = GaussianModel::fit(&colors, &labels, false);
            let (Some(fg), Some(bg)) = (fg, bg) else {
                break;
            };
            if icm_sweep(&colors, &mut labels, w, h, x0, y0, x1, y1, &fg, &bg, beta) == 0 {
                break;
            }
        }
    }

    if !labels.iter().any(|l| l.is_foreground()) {
        return Err(StageError::EmptyForeground);
    }

    let data = labels
        .iter()
        .map(|l| if l.is_foreground() { 255 } else { 0 })
        .collect();
    AlphaMatte::new(w, h, data).map_err(|_| StageError::EmptyForeground)
}

/// Segment the garment and attach the feathered matte as alpha.
///
/// Always a new 4-channel image; the input is never mutated. Failures leave
/// the caller holding the original.
pub fn remove_background(
    image: &RasterImage,
    margin_ratio: f32,
) -> Result<RasterImage, StageError> {
    let matte = segment_mask(image, margin_ratio)?;
    let feathered = feather(&matte);
    // matte dimensions equal the input's, so attaching cannot fail
    image
        .with_alpha(&feathered)
        .map_err(|_| StageError::EmptyForeground)
}

/// Diagonal Gaussian color model with floored per-channel variance.
struct GaussianModel {
    mean: [f64; 3],
    var: [f64; 3],
}

impl GaussianModel {
    fn fit(colors: &[[f64; 3]], labels: &[Label], foreground: bool) -> Option<Self> {
        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];
        let mut n = 0usize;
        for (color, label) in colors.iter().zip(labels) {
            if label.is_foreground() != foreground {
                continue;
            }
            for c in 0..3 {
                sum[c] += color[c];
                sum_sq[c] += color[c] * color[c];
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }

        let nf = n as f64;
        let mut mean = [0.0f64; 3];
        let mut var = [0.0f64; 3];
        for c in 0..3 {
            mean[c] = sum[c] / nf;
            var[c] = (sum_sq[c] / nf - mean[c] * mean[c]).max(VARIANCE_FLOOR);
        }
        Some(Self { mean, var })
    }

    /// Negative log-likelihood up to a shared constant.
    fn cost(&self, color: [f64; 3]) -> f64 {
        let mut acc = 0.0;
        for c in 0..3 {
            let d = color[c] - self.mean[c];
            acc += 0.5 * self.var[c].ln() + d * d / (2.0 * self.var[c]);
        }
        acc
    }
}

/// GrabCut-style contrast scale: `1 / (2 * mean squared neighbor distance)`.
fn contrast_beta(colors: &[[f64; 3]], w: u32, h: u32) -> f64 {
    let w = w as usize;
    let h = h as usize;
    let mut acc = 0.0f64;
    let mut n = 0usize;
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if x + 1 < w {
                acc += color_dist_sq(colors[i], colors[i + 1]);
                n += 1;
            }
            if y + 1 < h {
                acc += color_dist_sq(colors[i], colors[i + w]);
                n += 1;
            }
        }
    }
    if n == 0 || acc <= 0.0 {
        return 0.0;
    }
    1.0 / (2.0 * acc / n as f64)
}

fn color_dist_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    let mut acc = 0.0;
    for c in 0..3 {
        let d = a[c] - b[c];
        acc += d * d;
    }
    acc
}

/// One iterated-conditional-modes sweep in raster order over the mutable
/// pixels. Returns the number of label changes.
#[allow(clippy::too_many_arguments)]
fn icm_sweep(
    colors: &[[f64; 3]],
    labels: &mut [Label],
    w: u32,
    h: u32,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    fg: &GaussianModel,
    bg: &GaussianModel,
    beta: f64,
) -> usize {
    let stride = w as usize;
    let mut changed = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            let i = (y as usize) * stride + (x as usize);
            let color = colors[i];

            let mut fg_cost = fg.cost(color);
            let mut bg_cost = bg.cost(color);

            let mut neighbor = |ni: usize| {
                let coupling = SMOOTHNESS_WEIGHT * (-beta * color_dist_sq(color, colors[ni])).exp();
                if labels[ni].is_foreground() {
                    bg_cost += coupling;
                } else {
                    fg_cost += coupling;
                }
            };
            if x > 0 {
                neighbor(i - 1);
            }
            if x + 1 < w {
                neighbor(i + 1);
            }
            if y > 0 {
                neighbor(i - stride);
            }
            if y + 1 < h {
                neighbor(i + stride);
            }

            let next = if bg_cost < fg_cost {
                Label::Background
            } else {
                Label::Foreground
            };
            if next != labels[i] {
                labels[i] = next;
                changed += 1;
            }
        }
    }
    changed
}

/// Small separable Gaussian blur over the matte (radius 2), so downstream
/// alpha blending gets soft edges instead of a hard cutout.
fn feather(matte: &AlphaMatte) -> AlphaMatte {
    let w = matte.width() as usize;
    let h = matte.height() as usize;
    let kernel = gaussian_kernel_q16(FEATHER_RADIUS, FEATHER_SIGMA);
    let radius = (kernel.len() / 2) as i64;

    let src = matte.data();
    let mut tmp = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sx = (x as i64 + ki as i64 - radius).clamp(0, w as i64 - 1) as usize;
                acc += u64::from(kw) * u64::from(src[y * w + sx]);
            }
            tmp[y * w + x] = q16_to_u8(acc);
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in kernel.iter().enumerate() {
                let sy = (y as i64 + ki as i64 - radius).clamp(0, h as i64 - 1) as usize;
                acc += u64::from(kw) * u64::from(tmp[sy * w + x]);
            }
            out[y * w + x] = q16_to_u8(acc);
        }
    }

    // same dimensions as the source matte
    AlphaMatte::new(matte.width(), matte.height(), out)
        .unwrap_or_else(|_| matte.clone())
}

/// Fixed-point (16.16) normalized Gaussian weights summing to exactly 1.
fn gaussian_kernel_q16(radius: u32, sigma: f64) -> Vec<u32> {
    let r = radius as i64;
    let denom = 2.0 * sigma * sigma;
    let mut weights_f = Vec::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = i as f64;
        let wgt = (-x * x / denom).exp();
        weights_f.push(wgt);
        sum += wgt;
    }

    let mut weights = Vec::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    weights
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + (1 << 15)) >> 16).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Channels;

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
    fn tiny_images_are_rejected() {
        let img = two_tone(9, 40, [255, 255, 255], [255, 0, 0], (2, 10, 4, 20));
        assert_eq!(segment_mask(&img, 0.03).unwrap_err(), StageError::TooSmall);
        let img = two_tone(40, 9, [255, 255, 255], [255, 0, 0], (10, 2, 20, 4));
        assert_eq!(remove_background(&img, 0.03).unwrap_err(), StageError::TooSmall);
    }

    #[test]
    fn mask_separates_a_colored_block_from_its_background() {
        let img = two_tone(40, 40, [255, 255, 255], [255, 0, 0], (10, 10, 20, 20));
        let mask = segment_mask(&img, 0.1).unwrap();
        assert_eq!((mask.width(), mask.height()), (40, 40));

        // block interior is foreground, white regions are background
        assert_eq!(mask.value(20, 20), 255);
        assert_eq!(mask.value(11, 11), 255);
        assert_eq!(mask.value(2, 2), 0);
        assert_eq!(mask.value(6, 6), 0);

        for &v in mask.data() {
            assert!(v == 0 || v == 255);
        }
    }

    #[test]
    fn mask_bounding_box_tracks_the_block() {
        let img = two_tone(60, 50, [0, 0, 255], [255, 255, 0], (15, 10, 24, 22));
        let mask = segment_mask(&img, 0.05).unwrap();
        let bbox = mask.bounding_box().unwrap();
        assert_eq!((bbox.x, bbox.y), (15, 10));
        assert_eq!((bbox.width, bbox.height), (24, 22));
    }

    #[test]
    fn remove_background_produces_feathered_rgba() {
        let img = two_tone(40, 40, [255, 255, 255], [255, 0, 0], (10, 10, 20, 20));
        let out = remove_background(&img, 0.03).unwrap();
        assert_eq!(out.channels(), Channels::Rgba);
        assert_eq!(out.dimensions(), img.dimensions());

        // block center is fully opaque, far background fully transparent
        assert_eq!(out.alpha(20, 20), 255);
        assert_eq!(out.alpha(2, 2), 0);
        // colors survive untouched
        assert_eq!(out.rgb(20, 20), [255, 0, 0]);
        // the input stays 3-channel
        assert_eq!(img.channels(), Channels::Rgb);
    }

    #[test]
    fn feather_keeps_values_in_range_and_softens_edges() {
        let mut data = vec![0u8; 20 * 20];
        for y in 5..15 {
            for x in 5..15 {
                data[y * 20 + x] = 255;
            }
        }
        let matte = AlphaMatte::new(20, 20, data).unwrap();
        let soft = feather(&matte);
        assert_eq!(soft.value(10, 10), 255);
        assert_eq!(soft.value(0, 0), 0);
        // edge picks up intermediate values
        let edge = soft.value(5, 10);
        assert!(edge > 0 && edge < 255);
    }

    #[test]
    fn kernel_weights_sum_to_one_in_q16() {
        let k = gaussian_kernel_q16(FEATHER_RADIUS, FEATHER_SIGMA);
        assert_eq!(k.len(), 5);
        assert_eq!(k.iter().map(|&w| u64::from(w)).sum::<u64>(), 65536);
    }

    #[test]
    fn uniform_image_keeps_the_seed_rectangle() {
        let img = two_tone(40, 40, [128, 128, 128], [128, 128, 128], (0, 0, 0, 0));
        let mask = segment_mask(&img, 0.1).unwrap();
        // no contrast to carve with; the prior survives
        assert_eq!(mask.value(20, 20), 255);
        assert_eq!(mask.value(1, 1), 0);
    }
}
