use std::path::Path;

use anyhow::Context as _;

use crate::error::{DraperyError, DraperyResult};

/// Pixel layout of a [`RasterImage`] buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    Rgb,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// In-memory image with interleaved 8-bit channels.
///
/// Invariant: `data.len() == width * height * channels.count()`. Every
/// processing stage produces a new image rather than mutating its input; the
/// only in-place mutation is the final composite over a copy of the person
/// image.
#[derive(Clone, Debug)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> DraperyResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(channels.count()))
            .ok_or_else(|| DraperyError::validation("image buffer size overflow"))?;
        if data.len() != expected {
            return Err(DraperyError::validation(format!(
                "image buffer length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                channels.count()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Decode an image file. Alpha is preserved when the source carries it.
    pub fn open(path: &Path) -> DraperyResult<Self> {
        let dyn_img =
            image::open(path).with_context(|| format!("decode image '{}'", path.display()))?;
        Ok(if dyn_img.color().has_alpha() {
            let rgba = dyn_img.to_rgba8();
            let (width, height) = rgba.dimensions();
            Self {
                width,
                height,
                channels: Channels::Rgba,
                data: rgba.into_raw(),
            }
        } else {
            let rgb = dyn_img.to_rgb8();
            let (width, height) = rgb.dimensions();
            Self {
                width,
                height,
                channels: Channels::Rgb,
                data: rgb.into_raw(),
            }
        })
    }

    /// Encode as PNG (the only format we write; it preserves transparency).
    pub fn save_png(&self, path: &Path) -> DraperyResult<()> {
        let dyn_img = self.to_dynamic()?;
        dyn_img
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }

    fn to_dynamic(&self) -> DraperyResult<image::DynamicImage> {
        Ok(match self.channels {
            Channels::Rgb => image::DynamicImage::ImageRgb8(
                image::RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| DraperyError::validation("rgb buffer shape mismatch"))?,
            ),
            Channels::Rgba => image::DynamicImage::ImageRgba8(
                image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| DraperyError::validation("rgba buffer shape mismatch"))?,
            ),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * self.channels.count()
    }

    /// RGB components at `(x, y)`. Caller guarantees in-bounds coordinates.
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Alpha at `(x, y)`; opaque images report 255.
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        match self.channels {
            Channels::Rgb => 255,
            Channels::Rgba => self.data[self.offset(x, y) + 3],
        }
    }

    /// New RGBA image combining this image's color with `matte` as alpha.
    pub fn with_alpha(&self, matte: &AlphaMatte) -> DraperyResult<Self> {
        if (matte.width, matte.height) != (self.width, self.height) {
            return Err(DraperyError::validation(format!(
                "matte {}x{} does not match image {}x{}",
                matte.width, matte.height, self.width, self.height
            )));
        }
        let px = (self.width as usize) * (self.height as usize);
        let mut data = Vec::with_capacity(px * 4);
        for i in 0..px {
            let src = i * self.channels.count();
            data.extend_from_slice(&self.data[src..src + 3]);
            data.push(matte.data[i]);
        }
        Self::new(self.width, self.height, Channels::Rgba, data)
    }

    /// Copy out a sub-rectangle. The rectangle must lie within bounds.
    pub fn crop(&self, rect: Rectangle) -> DraperyResult<Self> {
        let right = rect
            .x
            .checked_add(rect.width)
            .filter(|&r| r <= self.width);
        let bottom = rect
            .y
            .checked_add(rect.height)
            .filter(|&b| b <= self.height);
        if rect.width == 0 || rect.height == 0 || right.is_none() || bottom.is_none() {
            return Err(DraperyError::validation(format!(
                "crop {:?} outside {}x{} image",
                rect, self.width, self.height
            )));
        }

        let ch = self.channels.count();
        let row_len = (rect.width as usize) * ch;
        let mut data = Vec::with_capacity((rect.height as usize) * row_len);
        for y in rect.y..rect.y + rect.height {
            let start = self.offset(rect.x, y);
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Self::new(rect.width, rect.height, self.channels, data)
    }

    /// Resample to an exact size with a Lanczos3 filter. Aspect ratio is the
    /// caller's concern.
    pub fn resize(&self, width: u32, height: u32) -> DraperyResult<Self> {
        if width == 0 || height == 0 {
            return Err(DraperyError::validation("resize target must be non-zero"));
        }
        let resized = self
            .to_dynamic()?
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        Ok(match self.channels {
            Channels::Rgb => Self {
                width,
                height,
                channels: Channels::Rgb,
                data: resized.to_rgb8().into_raw(),
            },
            Channels::Rgba => Self {
                width,
                height,
                channels: Channels::Rgba,
                data: resized.to_rgba8().into_raw(),
            },
        })
    }

    /// RGBA copy of this image; opaque images gain a fully-opaque alpha.
    pub fn to_rgba(&self) -> Self {
        match self.channels {
            Channels::Rgba => self.clone(),
            Channels::Rgb => {
                let px = (self.width as usize) * (self.height as usize);
                let mut data = Vec::with_capacity(px * 4);
                for chunk in self.data.chunks_exact(3) {
                    data.extend_from_slice(chunk);
                    data.push(255);
                }
                Self {
                    width: self.width,
                    height: self.height,
                    channels: Channels::Rgba,
                    data,
                }
            }
        }
    }
}

/// Single-channel foreground confidence map, same dimensions as its source.
#[derive(Clone, Debug)]
pub struct AlphaMatte {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMatte {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> DraperyResult<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(DraperyError::validation(format!(
                "matte buffer length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Tight bounding box of non-zero entries, or `None` when the matte is
    /// entirely zero.
    pub fn bounding_box(&self) -> Option<Rectangle> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;
        for y in 0..self.height {
            let row = (y as usize) * (self.width as usize);
            for x in 0..self.width {
                if self.data[row + x as usize] > 0 {
                    any = true;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        any.then(|| Rectangle {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }
}

/// Axis-aligned pixel rectangle, always within the bounds of the image it was
/// computed from. `width >= 1` and `height >= 1` whenever returned as a valid
/// crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Grow by `padding` on every side, clamped to a `bounds` canvas.
    pub fn inflate(&self, padding: u32, bounds: (u32, u32)) -> Rectangle {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let right = (self.x + self.width).saturating_add(padding).min(bounds.0);
        let bottom = (self.y + self.height).saturating_add(padding).min(bounds.1);
        Rectangle {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RasterImage {
        let mut data = Vec::new();
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgb);
        }
        RasterImage::new(width, height, Channels::Rgb, data).unwrap()
    }

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(RasterImage::new(2, 2, Channels::Rgb, vec![0; 11]).is_err());
        assert!(RasterImage::new(2, 2, Channels::Rgba, vec![0; 16]).is_ok());
    }

    #[test]
    fn with_alpha_combines_color_and_matte() {
        let img = solid(2, 1, [10, 20, 30]);
        let matte = AlphaMatte::new(2, 1, vec![0, 200]).unwrap();
        let out = img.with_alpha(&matte).unwrap();
        assert_eq!(out.channels(), Channels::Rgba);
        assert_eq!(out.alpha(0, 0), 0);
        assert_eq!(out.alpha(1, 0), 200);
        assert_eq!(out.rgb(1, 0), [10, 20, 30]);
    }

    #[test]
    fn with_alpha_rejects_dimension_mismatch() {
        let img = solid(2, 2, [0, 0, 0]);
        let matte = AlphaMatte::new(1, 1, vec![255]).unwrap();
        assert!(img.with_alpha(&matte).is_err());
    }

    #[test]
    fn crop_extracts_expected_pixels() {
        let mut data = Vec::new();
        for y in 0..3u8 {
            for x in 0..3u8 {
                data.extend_from_slice(&[x * 10, y * 10, 0]);
            }
        }
        let img = RasterImage::new(3, 3, Channels::Rgb, data).unwrap();
        let out = img
            .crop(Rectangle {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            })
            .unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.rgb(0, 0), [10, 10, 0]);
        assert_eq!(out.rgb(1, 1), [20, 20, 0]);
    }

    #[test]
    fn crop_rejects_out_of_bounds() {
        let img = solid(3, 3, [0, 0, 0]);
        assert!(
            img.crop(Rectangle {
                x: 2,
                y: 2,
                width: 2,
                height: 2,
            })
            .is_err()
        );
    }

    #[test]
    fn matte_bounding_box_tight_and_empty() {
        let matte = AlphaMatte::new(4, 3, vec![0; 12]).unwrap();
        assert!(matte.bounding_box().is_none());

        let mut data = vec![0u8; 12];
        data[5] = 128; // (1, 1)
        data[10] = 255; // (2, 2)
        let matte = AlphaMatte::new(4, 3, data).unwrap();
        assert_eq!(
            matte.bounding_box(),
            Some(Rectangle {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            })
        );
    }

    #[test]
    fn inflate_clamps_to_bounds() {
        let rect = Rectangle {
            x: 1,
            y: 1,
            width: 3,
            height: 3,
        };
        assert_eq!(
            rect.inflate(2, (5, 5)),
            Rectangle {
                x: 0,
                y: 0,
                width: 5,
                height: 5,
            }
        );
    }

    #[test]
    fn to_rgba_fills_opaque_alpha() {
        let img = solid(2, 1, [9, 8, 7]);
        let rgba = img.to_rgba();
        assert_eq!(rgba.channels(), Channels::Rgba);
        assert_eq!(rgba.alpha(0, 0), 255);
        assert_eq!(rgba.rgb(1, 0), [9, 8, 7]);
    }
}
