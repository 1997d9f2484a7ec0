//! # Preview
//!
//! Speculative local edits, drawn over the authoritative stack until the authority echoes them back.
//!
//! Every local command pushes exactly one entry onto its token's queue (commands without visible effect
//! push a placeholder). Echoes arrive in the same order the commands were sent, so each echo pops the
//! front of its queue. The stroke is gone once its queue drains.

use std::collections::VecDeque;

use crate::{
    id::{LayerID, PreviewToken},
    raster::Patch,
    util::Rect,
};

/// Regions needing a repaint, keyed by layer.
pub type DirtyList = smallvec::SmallVec<[(LayerID, Rect); 4]>;

/// One locally applied command, awaiting its echo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewEdit {
    Pixels { layer: LayerID, patch: Patch },
    /// Keeps the queue in step with commands that have nothing to show.
    Placeholder,
}
impl PreviewEdit {
    fn dirty(&self) -> Option<(LayerID, Rect)> {
        match self {
            Self::Pixels { layer, patch } if !patch.rect.is_empty() => Some((*layer, patch.rect)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PreviewStroke {
    token: PreviewToken,
    pending: VecDeque<PreviewEdit>,
    /// Still receiving edits from an active pointer session.
    open: bool,
}
impl PreviewStroke {
    #[must_use]
    pub fn token(&self) -> PreviewToken {
        self.token
    }
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
    pub fn edits(&self) -> impl Iterator<Item = &PreviewEdit> + '_ {
        self.pending.iter()
    }
    fn dirty(&self) -> DirtyList {
        let mut dirty = DirtyList::new();
        for (layer, rect) in self.pending.iter().filter_map(PreviewEdit::dirty) {
            match dirty.iter_mut().find(|(l, _)| *l == layer) {
                Some((_, existing)) => *existing = existing.union(&rect),
                None => dirty.push((layer, rect)),
            }
        }
        dirty
    }
}

/// Strokes in creation order, so later strokes draw above earlier ones.
#[derive(Default, Debug)]
pub struct PreviewLayer {
    strokes: Vec<PreviewStroke>,
}
impl PreviewLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
    #[must_use]
    pub fn contains(&self, token: PreviewToken) -> bool {
        self.position(token).is_some()
    }
    /// Number of edits still awaiting their echo.
    #[must_use]
    pub fn pending(&self, token: PreviewToken) -> usize {
        self.position(token)
            .map_or(0, |idx| self.strokes[idx].pending.len())
    }
    pub fn strokes(&self) -> impl Iterator<Item = &PreviewStroke> + '_ {
        self.strokes.iter()
    }
    /// All preview patches targeting `layer`, oldest first.
    pub fn patches_for(&self, layer: LayerID) -> impl Iterator<Item = &Patch> + '_ {
        self.strokes
            .iter()
            .flat_map(|stroke| stroke.pending.iter())
            .filter_map(move |edit| match edit {
                PreviewEdit::Pixels { layer: l, patch } if *l == layer => Some(patch),
                _ => None,
            })
    }
    fn position(&self, token: PreviewToken) -> Option<usize> {
        self.strokes.iter().position(|stroke| stroke.token == token)
    }
    /// Record a local edit under `token`, opening a stroke if there isn't one.
    /// Returns the area to repaint, if any.
    pub fn push(&mut self, token: PreviewToken, edit: PreviewEdit) -> Option<(LayerID, Rect)> {
        let dirty = edit.dirty();
        match self.position(token) {
            Some(idx) => self.strokes[idx].pending.push_back(edit),
            None => self.strokes.push(PreviewStroke {
                token,
                pending: VecDeque::from([edit]),
                open: true,
            }),
        }
        dirty
    }
    /// Stop accepting edits for `token`. Its pending edits remain until echoed or retired.
    pub fn close(&mut self, token: PreviewToken) {
        if let Some(idx) = self.position(token) {
            self.strokes[idx].open = false;
        }
    }
    /// The authority echoed the oldest edit of `token`. Drops that edit, and the stroke too if
    /// nothing else is pending. Returns the area to repaint.
    pub fn acknowledge(&mut self, token: PreviewToken) -> Option<(LayerID, Rect)> {
        let idx = self.position(token)?;
        let stroke = &mut self.strokes[idx];
        let edit = stroke.pending.pop_front();
        if stroke.pending.is_empty() {
            self.strokes.remove(idx);
        }
        edit.and_then(|edit| edit.dirty())
    }
    /// Discard a whole stroke. Unknown or already retired tokens are a no-op.
    pub fn retire(&mut self, token: PreviewToken) -> DirtyList {
        match self.position(token) {
            Some(idx) => self.strokes.remove(idx).dirty(),
            None => DirtyList::new(),
        }
    }
    /// Discard everything, returning the union of what needs repainting.
    pub fn clear(&mut self) -> DirtyList {
        let mut dirty = DirtyList::new();
        for stroke in self.strokes.drain(..) {
            dirty.extend(stroke.dirty());
        }
        dirty
    }
}
