//! # Strokes
//!
//! Brush strokes travel as points, and every participant rasterizes them with the functions here.
//! The rasterizer only uses correctly rounded IEEE operations (no trigonometry, no fused ops), so
//! all participants stamp identical pixels.

use crate::{
    blend::PatchMode,
    color::Rgba8,
    raster::{Mask, Patch},
    util::{FiniteF32, FiniteF32Error, Rect},
};

/// Hard upper limit on dabs along a single segment, to bound work on absurd inputs.
const MAX_DABS_PER_SEGMENT: u32 = 4096;

/// A canvas position with pen pressure.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Point {
    x: FiniteF32,
    y: FiniteF32,
    /// Advisory, in `[0, 1]`. Scales brush radius, never used by flood fill.
    pressure: FiniteF32,
}
impl Point {
    /// Create a point. Pressure is clamped into `[0, 1]`.
    pub fn new(x: f32, y: f32, pressure: f32) -> Result<Self, FiniteF32Error> {
        Ok(Self {
            x: FiniteF32::new(x)?,
            y: FiniteF32::new(y)?,
            pressure: FiniteF32::new_unit(pressure)?,
        })
    }
    #[must_use]
    pub fn x(&self) -> f32 {
        self.x.get()
    }
    #[must_use]
    pub fn y(&self) -> f32 {
        self.y.get()
    }
    #[must_use]
    pub fn pressure(&self) -> f32 {
        self.pressure.get()
    }
    /// The integer pixel containing this point.
    #[must_use]
    pub fn pixel(&self) -> (i64, i64) {
        (
            az::saturating_cast(self.x().floor()),
            az::saturating_cast(self.y().floor()),
        )
    }
}

/// Brush settings carried by every stroke point.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Brush {
    pub color: Rgba8,
    /// Radius at full pressure, in pixels.
    pub radius: FiniteF32,
    pub mode: PatchMode,
}
impl Brush {
    /// An eraser: replaces covered pixels with transparency.
    #[must_use]
    pub fn eraser(radius: FiniteF32) -> Self {
        Self {
            color: Rgba8::TRANSPARENT,
            radius,
            mode: PatchMode::Replace,
        }
    }
    /// Radius of a dab at the given pressure. Never smaller than half a pixel, so
    /// a feather-light touch still marks the pixel under the pen.
    #[must_use]
    pub fn radius_at(&self, pressure: f32) -> f32 {
        (self.radius.get().abs() * pressure).max(0.5)
    }
}
impl Default for Brush {
    fn default() -> Self {
        Self {
            color: Rgba8::BLACK,
            radius: FiniteF32::new(4.0).unwrap_or(FiniteF32::ONE),
            mode: PatchMode::Blend,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Dab {
    x: f32,
    y: f32,
    radius: f32,
}
impl Dab {
    /// Pixel bounds as `[left, top, right, bottom)`.
    fn bounds(&self) -> [i64; 4] {
        [
            az::saturating_cast((self.x - self.radius).floor()),
            az::saturating_cast((self.y - self.radius).floor()),
            az::saturating_cast((self.x + self.radius).ceil()),
            az::saturating_cast((self.y + self.radius).ceil()),
        ]
    }
    fn covers(&self, px: i64, py: i64) -> bool {
        // Pixel centers.
        #[allow(clippy::cast_precision_loss)]
        let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
        let (dx, dy) = (cx - self.x, cy - self.y);
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Dabs stamped for a stroke moving from `from` (already stamped) to `to`.
fn dabs(brush: &Brush, from: Option<&Point>, to: &Point) -> smallvec::SmallVec<[Dab; 8]> {
    let end = Dab {
        x: to.x(),
        y: to.y(),
        radius: brush.radius_at(to.pressure()),
    };
    let Some(from) = from else {
        return smallvec::smallvec![end];
    };
    let start_radius = brush.radius_at(from.pressure());
    let spacing = (start_radius.min(end.radius) * 0.5).max(1.0);
    let (dx, dy) = (to.x() - from.x(), to.y() - from.y());
    let distance = (dx * dx + dy * dy).sqrt();
    let steps: u32 = az::saturating_cast((distance / spacing).ceil());
    let steps = steps.clamp(1, MAX_DABS_PER_SEGMENT);

    (1..=steps)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / steps as f32;
            let pressure = from.pressure() + (to.pressure() - from.pressure()) * t;
            Dab {
                x: from.x() + dx * t,
                y: from.y() + dy * t,
                radius: brush.radius_at(pressure),
            }
        })
        .collect()
}

/// Rasterize one stroke step into a single patch, clipped to `clip`.
///
/// All dabs of the step are unioned into one mask, so a translucent brush does not darken
/// where its own dabs overlap. Returns `None` if nothing lands inside `clip`.
#[must_use]
pub fn rasterize(brush: &Brush, from: Option<&Point>, to: &Point, clip: Rect) -> Option<Patch> {
    let dabs = dabs(brush, from, to);
    let [mut left, mut top, mut right, mut bottom] = dabs.first()?.bounds();
    for dab in dabs.iter().skip(1) {
        let [l, t, r, b] = dab.bounds();
        left = left.min(l);
        top = top.min(t);
        right = right.max(r);
        bottom = bottom.max(b);
    }
    let bounds = Rect::new(
        az::saturating_cast(left),
        az::saturating_cast(top),
        az::saturating_cast(right.saturating_sub(left)),
        az::saturating_cast(bottom.saturating_sub(top)),
    );
    let area = bounds.intersection(&clip)?;

    let mut mask = Mask::new(area.width, area.height);
    for dab in &dabs {
        let [l, t, r, b] = dab.bounds();
        let dab_rect = Rect::new(
            az::saturating_cast(l),
            az::saturating_cast(t),
            az::saturating_cast(r.saturating_sub(l)),
            az::saturating_cast(b.saturating_sub(t)),
        );
        let Some(dab_area) = dab_rect.intersection(&area) else {
            continue;
        };
        for (x, y) in dab_area.iter_pixels() {
            if dab.covers(x.into(), y.into()) {
                mask.set(x - area.x, y - area.y, true);
            }
        }
    }
    if mask.count() == 0 {
        return None;
    }
    Some(Patch::masked(area.x, area.y, mask, brush.color, brush.mode))
}
