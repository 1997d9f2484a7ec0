//! # Flood fill
//!
//! Fills are computed locally and shared as pixels: the result is a masked [`Patch`] which
//! travels through the ordinary authoritative path as a `PutImage`. Peers never rerun the fill.

use bitvec::vec::BitVec;

use crate::{
    blend::PatchMode,
    color::Rgba8,
    commands::Command,
    id::LayerID,
    raster::{Mask, Patch},
    state::{LayerSource, StackError},
    util::Rect,
};

/// Where the fill reads colors from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Sample {
    /// Raw pixels of a single layer, regardless of its visibility or opacity.
    Layer(LayerID),
    /// All visible layers composited bottom to top.
    Merged,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FillParams {
    /// Canvas pixel to grow from.
    pub seed: (i64, i64),
    pub color: Rgba8,
    /// Largest accepted [`Rgba8::distance`] from the seed's sampled color.
    pub tolerance: u8,
    pub sample: Sample,
    /// Layer the resulting patch is destined for.
    pub target: LayerID,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FillResult {
    /// Nothing to fill: the seed was off-canvas or isolated from every neighbor.
    Empty,
    /// Tight bounding box and coverage of the filled region.
    Patch { layer: LayerID, patch: Patch },
}
impl FillResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
    /// The command that shares this fill, if there is anything to share.
    #[must_use]
    pub fn into_command(self) -> Option<Command> {
        match self {
            Self::Empty => None,
            Self::Patch { layer, patch } => Some(Command::PutImage { layer, patch }),
        }
    }
}

/// Compute a flood fill. Pure: reads `source`, touches nothing.
///
/// Grows a 4-connected region from the seed over pixels within `tolerance` of the seed color.
/// A region of only the seed pixel is reported as [`FillResult::Empty`].
pub fn flood_fill(source: &impl LayerSource, params: &FillParams) -> Result<FillResult, StackError> {
    if source.layer(params.target).is_none() {
        return Err(StackError::NotFound(params.target));
    }
    let sampled = match params.sample {
        Sample::Layer(id) => std::borrow::Cow::Borrowed(
            source
                .layer(id)
                .ok_or(StackError::NotFound(id))?
                .raster(),
        ),
        Sample::Merged => std::borrow::Cow::Owned(crate::render::merge_visible(source)),
    };
    let (width, height) = (sampled.width(), sampled.height());
    let (sx, sy) = params.seed;
    let Some(reference) = sampled.get(sx, sy) else {
        log::trace!("Fill seed {:?} off canvas", params.seed);
        return Ok(FillResult::Empty);
    };
    let matches = |x: i64, y: i64| {
        sampled
            .get(x, y)
            .is_some_and(|px| px.distance(reference) <= params.tolerance)
    };

    let stride = width as usize;
    let mut visited: BitVec = BitVec::repeat(false, stride * height as usize);
    let index = |x: i64, y: i64| y as usize * stride + x as usize;

    let (mut left, mut top, mut right, mut bottom) = (sx, sy, sx, sy);
    let mut filled = 0usize;
    let mut pending = vec![(sx, sy)];
    visited.set(index(sx, sy), true);

    while let Some((x, y)) = pending.pop() {
        filled += 1;
        left = left.min(x);
        right = right.max(x);
        top = top.min(y);
        bottom = bottom.max(y);
        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                continue;
            }
            let idx = index(nx, ny);
            if !visited[idx] && matches(nx, ny) {
                visited.set(idx, true);
                pending.push((nx, ny));
            }
        }
    }

    if filled <= 1 {
        return Ok(FillResult::Empty);
    }

    // Canvas dimensions are u32, so all of these are in range.
    let rect = Rect::new(
        az::saturating_cast(left),
        az::saturating_cast(top),
        az::saturating_cast(right - left + 1),
        az::saturating_cast(bottom - top + 1),
    );
    let mut mask = Mask::new(rect.width, rect.height);
    for (x, y) in rect.iter_pixels() {
        if visited[index(x.into(), y.into())] {
            mask.set(x - rect.x, y - rect.y, true);
        }
    }
    log::trace!("Filled {filled} pixels in {rect:?}");
    Ok(FillResult::Patch {
        layer: params.target,
        patch: Patch::masked(rect.x, rect.y, mask, params.color, PatchMode::Blend),
    })
}
