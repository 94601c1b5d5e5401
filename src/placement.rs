//! Scale and anchor resolution for overlaying a garment on a person canvas.
//!
//! Face anchoring takes precedence over the fractional anchor; both end in
//! the same per-axis clamp that keeps the garment's bounding box inside the
//! canvas whenever it fits.

use crate::config::PipelineConfig;
use crate::face::FaceBox;

/// Detected faces never widen the garment beyond this fraction of the person.
const FACE_WIDTH_CAP: f64 = 0.9;

/// Final, clamped placement of the garment on the person canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementResult {
    /// Garment dimensions after the resize decision.
    pub width: u32,
    pub height: u32,
    /// Top-left corner on the canvas. Negative only when the garment is
    /// larger than the canvas on that axis.
    pub offset_x: i64,
    pub offset_y: i64,
}

/// Resolve target garment size and position.
///
/// Expects a sanitized config (see [`PipelineConfig::resolved`]); the face
/// box, when present, was detected on the person image.
pub fn resolve_placement(
    person: (u32, u32),
    garment: (u32, u32),
    face: Option<FaceBox>,
    cfg: &PipelineConfig,
) -> PlacementResult {
    let (person_w, person_h) = person;
    let (garment_w, garment_h) = garment;

    let mut target_w = ((f64::from(person_w) * f64::from(cfg.cloth_scale)) as u32).max(1);

    let face = if cfg.face_anchor { face } else { None };
    if let Some(face) = face {
        let fw_target = (f64::from(face.width) * f64::from(cfg.face_width_mult)) as u32;
        let fw_target = fw_target.min((f64::from(person_w) * FACE_WIDTH_CAP) as u32);
        // override only when it shrinks the garment, unless upscaling is on
        if fw_target > 0 && (fw_target < garment_w || cfg.allow_upscale) {
            target_w = fw_target;
        }
    }

    let (width, height) = if garment_w != target_w && (garment_w > target_w || cfg.allow_upscale) {
        let ratio = f64::from(garment_h) / f64::from(garment_w.max(1));
        (target_w, ((f64::from(target_w) * ratio) as u32).max(1))
    } else {
        (garment_w, garment_h)
    };

    let (mut offset_x, mut offset_y) = match face {
        Some(face) => {
            let (cx, cy) = face.center();
            let top = i64::from(cy) + i64::from(face.height / 2) + i64::from(cfg.face_offset_y);
            // truncate after the subtraction, like the fractional branch
            ((f64::from(cx) - f64::from(width) * 0.5) as i64, top)
        }
        None => (
            (f64::from(person_w) * f64::from(cfg.pos_x) - f64::from(width) * 0.5) as i64,
            (f64::from(person_h) * f64::from(cfg.pos_y) - f64::from(height) * 0.5) as i64,
        ),
    };

    offset_x += i64::from(cfg.offset_x);
    offset_y += i64::from(cfg.offset_y);

    PlacementResult {
        width,
        height,
        offset_x: clamp_offset(offset_x, person_w, width),
        offset_y: clamp_offset(offset_y, person_h, height),
    }
}

/// Clamp one axis offset so the placed span stays inside the canvas.
///
/// When the placed span exceeds the canvas the clamp degenerates to `0` or
/// `canvas - placed`, whichever is closer to the unclamped offset.
fn clamp_offset(offset: i64, canvas: u32, placed: u32) -> i64 {
    let slack = i64::from(canvas) - i64::from(placed);
    if slack >= 0 {
        offset.clamp(0, slack)
    } else if (offset - slack).abs() < offset.abs() {
        slack
    } else {
        0
    }
}
