//! # Raster
//!
//! Pixel storage for layers, and the bounded patches that are the unit of raster change.

use bitvec::vec::BitVec;

use crate::{
    blend::{self, PatchMode},
    color::Rgba8,
    util::Rect,
};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterError {
    #[error("pixel data of length {len} does not match {width}x{height}")]
    SizeMismatch { width: u32, height: u32, len: usize },
}

/// A dense, row-major buffer of pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}
impl Raster {
    /// A raster filled with transparency.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba8::TRANSPARENT)
    }
    #[must_use]
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self, RasterError> {
        if pixels.len() == width as usize * height as usize {
            Ok(Self {
                width,
                height,
                pixels,
            })
        } else {
            Err(RasterError::SizeMismatch {
                width,
                height,
                len: pixels.len(),
            })
        }
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }
    #[must_use]
    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }
    /// View the raster as tightly packed RGBA8 bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
    fn index_of(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        // In range, checked above.
        Some(y as usize * self.width as usize + x as usize)
    }
    /// Fetch a pixel, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Option<Rgba8> {
        self.index_of(x, y).map(|idx| self.pixels[idx])
    }
    pub fn get_mut(&mut self, x: i64, y: i64) -> Option<&mut Rgba8> {
        let idx = self.index_of(x, y)?;
        self.pixels.get_mut(idx)
    }
    /// Composite `above` onto self pixel-for-pixel. Rasters must be the same size; any excess is ignored.
    pub fn composite(&mut self, above: &Raster, opacity: blend::Opacity) {
        for (below, &above) in self.pixels.iter_mut().zip(&above.pixels) {
            *below = blend::over(*below, above, opacity);
        }
    }
    /// Apply a patch, clipped to the bounds of this raster.
    ///
    /// Returns the area that was touched, or `None` if the patch lies entirely outside.
    pub fn apply_patch(&mut self, patch: &Patch) -> Option<Rect> {
        let clipped = patch.rect.clip_to(self.width, self.height)?;
        match &patch.data {
            PatchData::Mask { mask, color } => {
                for (x, y) in clipped.iter_pixels() {
                    if mask.get(x - patch.rect.x, y - patch.rect.y) {
                        if let Some(px) = self.get_mut(x.into(), y.into()) {
                            *px = blend::apply(patch.mode, *px, *color);
                        }
                    }
                }
            }
            PatchData::Image(image) => {
                for (x, y) in clipped.iter_pixels() {
                    let Some(src) =
                        image.get((x - patch.rect.x).into(), (y - patch.rect.y).into())
                    else {
                        continue;
                    };
                    if let Some(px) = self.get_mut(x.into(), y.into()) {
                        *px = blend::apply(patch.mode, *px, src);
                    }
                }
            }
        }
        Some(clipped)
    }
}
impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel dumps are never useful in logs.
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// A 1-bit-per-pixel coverage mask.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: BitVec,
}
impl Mask {
    /// An all-clear mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: BitVec::repeat(false, width as usize * height as usize),
        }
    }
    pub fn from_bits(width: u32, height: u32, bits: BitVec) -> Result<Self, RasterError> {
        if bits.len() == width as usize * height as usize {
            Ok(Self {
                width,
                height,
                bits,
            })
        } else {
            Err(RasterError::SizeMismatch {
                width,
                height,
                len: bits.len(),
            })
        }
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn bits(&self) -> &BitVec {
        &self.bits
    }
    /// Number of covered pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }
    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }
    /// Coverage at mask-local coordinates. Out of bounds is uncovered.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.index_of(x, y)
            .and_then(|idx| self.bits.get(idx).map(|bit| *bit))
            .unwrap_or(false)
    }
    /// Set coverage at mask-local coordinates. Out of bounds is ignored.
    pub fn set(&mut self, x: i32, y: i32, value: bool) {
        if let Some(idx) = self.index_of(x, y) {
            self.bits.set(idx, value);
        }
    }
}

/// Pixel content of a [`Patch`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PatchData {
    /// A single color under a coverage mask, as produced by flood fills and brush dabs.
    Mask { mask: Mask, color: Rgba8 },
    /// Arbitrary pixels, e.g. an initial canvas image.
    Image(Raster),
}

/// A bounded raster change, applied atomically to one layer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Patch {
    /// Canvas-space area. Content size always equals the rect size.
    pub rect: Rect,
    pub data: PatchData,
    pub mode: PatchMode,
}
impl Patch {
    /// A masked single-color patch whose rect is placed at `(x, y)` and sized from the mask.
    #[must_use]
    pub fn masked(x: i32, y: i32, mask: Mask, color: Rgba8, mode: PatchMode) -> Self {
        Self {
            rect: Rect::new(x, y, mask.width(), mask.height()),
            data: PatchData::Mask { mask, color },
            mode,
        }
    }
    /// An image patch whose rect is placed at `(x, y)` and sized from the image.
    #[must_use]
    pub fn image(x: i32, y: i32, image: Raster, mode: PatchMode) -> Self {
        Self {
            rect: Rect::new(x, y, image.width(), image.height()),
            data: PatchData::Image(image),
            mode,
        }
    }
    /// Check that the content matches the declared rect.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let (w, h) = match &self.data {
            PatchData::Mask { mask, .. } => (mask.width(), mask.height()),
            PatchData::Image(image) => (image.width(), image.height()),
        };
        w == self.rect.width && h == self.rect.height
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mask_bounds() {
        let mut mask = Mask::new(3, 2);
        mask.set(2, 1, true);
        mask.set(3, 0, true);
        mask.set(-1, 0, true);
        assert!(mask.get(2, 1));
        assert!(!mask.get(3, 0));
        assert_eq!(mask.count(), 1);
    }
    #[test]
    fn patch_clipped() {
        let mut raster = Raster::new(4, 4);
        let mut mask = Mask::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                mask.set(x, y, true);
            }
        }
        let patch = Patch::masked(-1, 2, mask, Rgba8::BLACK, PatchMode::Replace);
        let touched = raster.apply_patch(&patch);
        assert_eq!(touched, Some(Rect::new(0, 2, 2, 2)));
        assert_eq!(raster.get(0, 2), Some(Rgba8::BLACK));
        assert_eq!(raster.get(1, 3), Some(Rgba8::BLACK));
        assert_eq!(raster.get(2, 2), Some(Rgba8::TRANSPARENT));
        assert_eq!(raster.get(0, 1), Some(Rgba8::TRANSPARENT));
    }
    #[test]
    fn patch_outside() {
        let mut raster = Raster::new(4, 4);
        let patch = Patch::masked(10, 10, Mask::new(2, 2), Rgba8::BLACK, PatchMode::Blend);
        assert_eq!(raster.apply_patch(&patch), None);
        assert_eq!(raster, Raster::new(4, 4));
    }
    #[test]
    fn image_patch() {
        let mut raster = Raster::filled(3, 3, Rgba8::WHITE);
        let image = Raster::filled(2, 1, Rgba8::opaque(9, 9, 9));
        raster.apply_patch(&Patch::image(1, 1, image, PatchMode::Replace));
        assert_eq!(raster.get(1, 1), Some(Rgba8::opaque(9, 9, 9)));
        assert_eq!(raster.get(2, 1), Some(Rgba8::opaque(9, 9, 9)));
        assert_eq!(raster.get(0, 1), Some(Rgba8::WHITE));
    }
    #[test]
    fn size_checks() {
        assert!(Raster::from_pixels(2, 2, vec![Rgba8::BLACK; 3]).is_err());
        assert!(Mask::from_bits(2, 2, BitVec::repeat(true, 4)).is_ok());
        let mut patch = Patch::masked(0, 0, Mask::new(2, 2), Rgba8::BLACK, PatchMode::Blend);
        assert!(patch.is_well_formed());
        patch.rect.width = 3;
        assert!(!patch.is_well_formed());
    }
}
