use crate::raster::RasterImage;

/// Bounding box of a detected face on the person image, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Center of the box, `(x, y)`.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Pluggable face-detection capability.
///
/// Detection is strictly optional: an empty result, a misbehaving detector,
/// or no detector at all silently falls back to fractional anchoring.
/// Implementations wrap whatever classical or learned detector is available
/// to the host application.
pub trait FaceDetector {
    /// All face bounding boxes found in `image`. Order is not significant;
    /// the pipeline picks the largest.
    fn detect(&self, image: &RasterImage) -> Vec<FaceBox>;
}

/// Largest detection by box area, the one the compositor anchors to.
pub fn largest_face(faces: &[FaceBox]) -> Option<FaceBox> {
    faces.iter().copied().max_by_key(FaceBox::area)
}
