//! Alpha-aware overlay of a placed garment onto the person canvas.

use crate::error::{DraperyError, DraperyResult};
use crate::placement::PlacementResult;
use crate::raster::{Channels, RasterImage};

/// Straight-alpha src-over blend of one pixel pair.
///
/// Garment alpha 0 leaves the person pixel untouched, 255 replaces it, and
/// intermediate values blend linearly.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u16::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let da = u16::from(dst[3]);
    let inv = 255 - sa;
    let out_a = sa + mul_div255(da, inv);
    if out_a == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    out[3] = out_a as u8;
    for i in 0..3 {
        let sc = u32::from(src[i]) * u32::from(sa);
        let dc = u32::from(dst[i]) * u32::from(mul_div255(da, inv));
        out[i] = ((sc + dc + u32::from(out_a) / 2) / u32::from(out_a)) as u8;
    }
    out
}

/// Blend `garment` over `person` at the placement offsets.
///
/// `person` must be RGBA and `garment` must already be at the placement's
/// dimensions. Garment pixels falling outside the canvas are clipped.
pub fn overlay(
    person: &mut RasterImage,
    garment: &RasterImage,
    placement: &PlacementResult,
) -> DraperyResult<()> {
    if person.channels() != Channels::Rgba {
        return Err(DraperyError::validation("overlay canvas must be rgba"));
    }
    if garment.dimensions() != (placement.width, placement.height) {
        return Err(DraperyError::validation(
            "garment dimensions do not match placement",
        ));
    }

    let (pw, ph) = person.dimensions();
    for gy in 0..garment.height() {
        let y = placement.offset_y + i64::from(gy);
        if y < 0 || y >= i64::from(ph) {
            continue;
        }
        for gx in 0..garment.width() {
            let x = placement.offset_x + i64::from(gx);
            if x < 0 || x >= i64::from(pw) {
                continue;
            }

            let [r, g, b] = garment.rgb(gx, gy);
            let src = [r, g, b, garment.alpha(gx, gy)];
            let (x, y) = (x as u32, y as u32);
            let [dr, dg, db] = person.rgb(x, y);
            let dst = [dr, dg, db, person.alpha(x, y)];

            let out = over(dst, src);
            let idx = ((y as usize) * (pw as usize) + (x as usize)) * 4;
            person.data_mut()[idx..idx + 4].copy_from_slice(&out);
        }
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}
