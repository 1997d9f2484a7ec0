//! Flattening layers into a single image, for display, export, and merged sampling.

use crate::{
    blend,
    color::Rgba8,
    preview::PreviewLayer,
    raster::Raster,
    state::LayerSource,
};

/// Composite every visible layer, bottom to top, over transparency.
#[must_use]
pub fn merge_visible(source: &impl LayerSource) -> Raster {
    let (width, height) = source.size();
    let mut out = Raster::new(width, height);
    for layer in source.layers().iter().filter(|layer| layer.visible) {
        out.composite(layer.raster(), layer.opacity);
    }
    out
}

/// [`merge_visible`] for a single pixel. `None` if off-canvas.
#[must_use]
pub fn sample_merged(source: &impl LayerSource, x: i64, y: i64) -> Option<Rgba8> {
    let mut out = None;
    for layer in source.layers() {
        let px = layer.raster().get(x, y)?;
        let below = out.unwrap_or(Rgba8::TRANSPARENT);
        out = Some(if layer.visible {
            blend::over(below, px, layer.opacity)
        } else {
            below
        });
    }
    out
}

/// The image as the local user should see it: the authoritative layers with pending local
/// previews drawn onto their target layers.
#[must_use]
pub fn flatten(source: &impl LayerSource, preview: &PreviewLayer) -> Raster {
    let (width, height) = source.size();
    let mut out = Raster::new(width, height);
    for layer in source.layers().iter().filter(|layer| layer.visible) {
        let mut patches = preview.patches_for(layer.id()).peekable();
        if patches.peek().is_none() {
            out.composite(layer.raster(), layer.opacity);
            continue;
        }
        let mut speculative = layer.raster().clone();
        for patch in patches {
            speculative.apply_patch(patch);
        }
        out.composite(&speculative, layer.opacity);
    }
    out
}
