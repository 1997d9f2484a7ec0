//! Utility types, used throughout the crate.

/// A float which is non-NaN and non-infinite.
#[derive(Copy, Clone, PartialEq, PartialOrd, bytemuck::NoUninit, bytemuck::Zeroable, Debug)]
#[repr(transparent)]
pub struct FiniteF32(f32);
impl FiniteF32 {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);
    pub fn new(val: f32) -> Result<Self, FiniteF32Error> {
        if val.is_finite() {
            Ok(Self(val))
        } else {
            Err(FiniteF32Error::NotFinite)
        }
    }
    /// Create a value clamped into `[0, 1]`, as used for pressure.
    pub fn new_unit(val: f32) -> Result<Self, FiniteF32Error> {
        Self::new(val).map(|v| Self(v.0.clamp(0.0, 1.0)))
    }
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }
}
impl Default for FiniteF32 {
    fn default() -> Self {
        Self::ZERO
    }
}
impl TryFrom<f32> for FiniteF32 {
    type Error = FiniteF32Error;
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
impl From<FiniteF32> for f32 {
    fn from(value: FiniteF32) -> Self {
        value.get()
    }
}
// Never NaN, so equality is total.
impl Eq for FiniteF32 {}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiniteF32Error {
    #[error("not finite")]
    NotFinite,
}

/// An axis-aligned pixel rectangle. `x, y` may be negative before clipping against a canvas.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}
impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    /// A rectangle covering a whole canvas of the given size.
    #[must_use]
    pub const fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }
    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
    #[must_use]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= i64::from(self.x) && y >= i64::from(self.y) && x < self.right() && y < self.bottom()
    }
    /// The overlapping area of two rects, or `None` if they do not overlap.
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= i64::from(left) || bottom <= i64::from(top) {
            return None;
        }
        Some(Rect {
            x: left,
            y: top,
            // Bounded by the widths of the inputs.
            width: u32::try_from(right - i64::from(left)).ok()?,
            height: u32::try_from(bottom - i64::from(top)).ok()?,
        })
    }
    /// The smallest rect containing both. Empty rects do not contribute.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x: left,
            y: top,
            width: u32::try_from(right - i64::from(left)).unwrap_or(u32::MAX),
            height: u32::try_from(bottom - i64::from(top)).unwrap_or(u32::MAX),
        }
    }
    /// Clip against a canvas of the given size.
    #[must_use]
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersection(&Rect::of_size(width, height))
    }
    /// Iterate all `(x, y)` coordinates, row-major.
    pub fn iter_pixels(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let (x0, y0) = (self.x, self.y);
        (0..self.height).flat_map(move |dy| {
            (0..self.width).map(move |dx| (x0.saturating_add_unsigned(dx), y0.saturating_add_unsigned(dy)))
        })
    }
}
